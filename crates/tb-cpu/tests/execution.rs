use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use tb_cpu::{CpuBackend, CpuConfig, CpuPlatform};
use tb_graph::{
    Backend, BinaryOp, Capabilities, CoreBuilder, Graph, GraphError, MathBuilder, NumBuilder,
    OutputNode, Runner, Subgraph, UnaryOp,
};
use tb_tensor::{
    Allocator, ArrayElement, BFloat16, DataType, Device, DeviceHandle, Handle, HostAllocator,
    HostBuffer, Platform, Shape, Storage, TensorError,
};

fn backend() -> Arc<CpuBackend> {
    Arc::new(CpuBackend::default())
}

fn device(backend: &CpuBackend) -> Arc<dyn Device> {
    backend.platform().device(0).unwrap()
}

fn shape(dtype: DataType, axes: &[usize]) -> Shape {
    Shape::new(dtype, axes.to_vec())
}

fn input<T: ArrayElement>(axes: &[usize], values: Vec<T>) -> Arc<dyn Handle> {
    Arc::new(HostBuffer::from_vec(axes.to_vec(), values).unwrap())
}

fn fetch(handle: &Arc<dyn DeviceHandle>) -> Storage {
    let buffer = HostAllocator.allocate(handle.shape()).unwrap();
    handle.to_host(&buffer).unwrap();
    buffer.read_storage().unwrap()
}

#[test]
fn test_matmul() {
    let backend = backend();
    let mut g = Graph::new("matmul", backend.clone());
    let (xs, ys) = (shape(DataType::Float32, &[2, 3]), shape(DataType::Float32, &[3, 4]));
    let x = g.argument("x", &xs, 0).unwrap();
    let y = g.argument("y", &ys, 1).unwrap();
    let z = g.dot_general(x, y, [&[], &[]], [&[1], &[0]]).unwrap();
    let out = OutputNode::new(z, shape(DataType::Float32, &[2, 4]));
    let runner = g
        .compile(device(&backend), &[out], &[], &[xs, ys])
        .unwrap();

    let x = input(&[2, 3], (1..=6).map(|v| v as f32).collect());
    let y = input(&[3, 4], (1..=12).map(|v| v as f32).collect());
    let (outputs, traced) = runner.run(&[x, y]).unwrap();
    assert!(traced.is_empty());
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].shape(), &shape(DataType::Float32, &[2, 4]));
    assert_eq!(
        fetch(&outputs[0]),
        Storage::Float32(vec![38.0, 44.0, 50.0, 56.0, 83.0, 98.0, 113.0, 128.0])
    );
}

/// `while (i < limit) { i += 1; acc *= 2 }` over an `(int32, [2]float32)` state.
fn doubling_loop(g: &mut Graph, limit: i32) -> (Subgraph, Subgraph) {
    let i32s = shape(DataType::Int32, &[]);
    let acc_shape = shape(DataType::Float32, &[2]);

    let mut cond = g.subgraph("cond").unwrap();
    let i = cond.argument("i", &i32s, 0).unwrap();
    cond.argument("acc", &acc_shape, 1).unwrap();
    let limit = cond.constant(&HostBuffer::scalar(limit)).unwrap();
    let lt = cond.binary(BinaryOp::Less, i, limit).unwrap();
    let cond =
        Subgraph::with_output(cond, &OutputNode::new(lt, shape(DataType::Bool, &[]))).unwrap();

    let mut body = g.subgraph("body").unwrap();
    let i = body.argument("i", &i32s, 0).unwrap();
    let acc = body.argument("acc", &acc_shape, 1).unwrap();
    let one = body.constant(&HostBuffer::scalar(1i32)).unwrap();
    let two = body
        .constant(&HostBuffer::from_vec(vec![2], vec![2.0f32, 2.0]).unwrap())
        .unwrap();
    let i = body.binary(BinaryOp::Add, i, one).unwrap();
    let acc = body.binary(BinaryOp::Mul, acc, two).unwrap();
    let state = body.tuple(&[i, acc]).unwrap();
    let body = Subgraph::new(body, state.node()).unwrap();
    (cond, body)
}

fn run_doubling(start: i32, limit: i32) -> (Storage, Storage) {
    let backend = backend();
    let mut g = Graph::new("doubling", backend.clone());
    let (cond, body) = doubling_loop(&mut g, limit);
    let i32s = shape(DataType::Int32, &[]);
    let acc_shape = shape(DataType::Float32, &[2]);
    let i = g.argument("i", &i32s, 0).unwrap();
    let acc = g.argument("acc", &acc_shape, 1).unwrap();
    let state = g.tuple(&[i, acc]).unwrap();
    let result = g.while_loop(&cond, &body, state.node()).unwrap();
    let result = g.tuple_of(result).unwrap();
    let outputs = [
        OutputNode::new(result.element(0).unwrap(), i32s.clone()),
        OutputNode::new(result.element(1).unwrap(), acc_shape.clone()),
    ];
    let runner = g
        .compile(device(&backend), &outputs, &[], &[i32s, acc_shape])
        .unwrap();
    let (out, _) = runner
        .run(&[input(&[], vec![start]), input(&[2], vec![1.0f32, -0.5])])
        .unwrap();
    (fetch(&out[0]), fetch(&out[1]))
}

#[test]
fn test_while_counts() {
    let (i, acc) = run_doubling(0, 5);
    assert_eq!(i, Storage::Int32(vec![5]));
    assert_eq!(acc, Storage::Float32(vec![32.0, -16.0]));
}

#[test]
fn test_while_zero_iterations_returns_initial_state() {
    let (i, acc) = run_doubling(7, 5);
    assert_eq!(i, Storage::Int32(vec![7]));
    assert_eq!(acc, Storage::Float32(vec![1.0, -0.5]));
}

#[test]
fn test_while_over_array_state() {
    let backend = backend();
    let mut g = Graph::new("halve", backend.clone());
    let s = shape(DataType::Int64, &[]);

    let mut cond = g.subgraph("positive").unwrap();
    let x = cond.argument("x", &s, 0).unwrap();
    let zero = cond.constant(&HostBuffer::scalar(0i64)).unwrap();
    let gt = cond.binary(BinaryOp::Greater, x, zero).unwrap();
    let cond = Subgraph::new(cond, gt).unwrap();

    let mut body = g.subgraph("halve").unwrap();
    let x = body.argument("x", &s, 0).unwrap();
    let two = body.constant(&HostBuffer::scalar(2i64)).unwrap();
    let half = body.binary(BinaryOp::Div, x, two).unwrap();
    let body = Subgraph::new(body, half).unwrap();

    let x = g.argument("x", &s, 0).unwrap();
    let out = g.while_loop(&cond, &body, x).unwrap();
    let runner = g
        .compile(device(&backend), &[OutputNode::new(out, s.clone())], &[], &[s])
        .unwrap();
    let (out, _) = runner.run(&[input(&[], vec![1000i64])]).unwrap();
    assert_eq!(fetch(&out[0]), Storage::Int64(vec![0]));
}

#[test]
fn test_call_subgraph() {
    let backend = backend();
    let mut g = Graph::new("main", backend.clone());
    let v = shape(DataType::Float64, &[3]);

    let mut sub = g.subgraph("axpy").unwrap();
    let a = sub.argument("a", &v, 0).unwrap();
    let x = sub.argument("x", &v, 1).unwrap();
    let y = sub.argument("y", &v, 2).unwrap();
    let ax = sub.binary(BinaryOp::Mul, a, x).unwrap();
    let out = sub.binary(BinaryOp::Add, ax, y).unwrap();
    let axpy = Subgraph::new(sub, out).unwrap();

    let a = g.argument("a", &v, 0).unwrap();
    let x = g.argument("x", &v, 1).unwrap();
    let once = g.call(&axpy, &[a, x, x]).unwrap();
    let twice = g.call(&axpy, &[a, once, x]).unwrap();
    let runner = g
        .compile(
            device(&backend),
            &[OutputNode::new(twice, v.clone())],
            &[OutputNode::new(once, v.clone())],
            &[v.clone(), v],
        )
        .unwrap();
    let (out, traced) = runner
        .run(&[
            input(&[3], vec![2.0f64, 0.0, -1.0]),
            input(&[3], vec![1.0f64, 5.0, 3.0]),
        ])
        .unwrap();
    // once = a*x + x; twice = a*once + x
    assert_eq!(fetch(&traced[0]), Storage::Float64(vec![3.0, 5.0, 0.0]));
    assert_eq!(fetch(&out[0]), Storage::Float64(vec![7.0, 5.0, 3.0]));
}

#[test]
fn test_reshape_preserves_order() {
    let backend = backend();
    let mut g = Graph::new("reshape", backend.clone());
    let s = shape(DataType::Uint32, &[2, 3]);
    let x = g.argument("x", &s, 0).unwrap();
    assert!(matches!(
        g.reshape(x, &[4, 2]).unwrap_err(),
        GraphError::ShapeMismatch { .. }
    ));
    let y = g.reshape(x, &[3, 2]).unwrap();
    let row = g.slice(y, 1).unwrap();
    let runner = g
        .compile(
            device(&backend),
            &[
                OutputNode::new(y, shape(DataType::Uint32, &[3, 2])),
                OutputNode::new(row, shape(DataType::Uint32, &[2])),
            ],
            &[],
            &[s],
        )
        .unwrap();
    let (out, _) = runner.run(&[input(&[2, 3], vec![0u32, 1, 2, 3, 4, 5])]).unwrap();
    assert_eq!(fetch(&out[0]), Storage::Uint32(vec![0, 1, 2, 3, 4, 5]));
    assert_eq!(fetch(&out[1]), Storage::Uint32(vec![2, 3]));
}

#[test]
fn test_concat_and_set() {
    let backend = backend();
    let mut g = Graph::new("concat", backend.clone());
    let a_shape = shape(DataType::Int32, &[1, 2]);
    let b_shape = shape(DataType::Int32, &[2, 2]);
    let a = g.argument("a", &a_shape, 0).unwrap();
    let b = g.argument("b", &b_shape, 1).unwrap();
    let c = g.concat(0, &[a, b]).unwrap();
    assert_eq!(g.shape_of(c).unwrap(), &shape(DataType::Int32, &[3, 2]));

    let row = g
        .constant(&HostBuffer::from_vec(vec![2], vec![-1i32, -2]).unwrap())
        .unwrap();
    let index = g.constant(&HostBuffer::scalar(2u64)).unwrap();
    let updated = g.set(c, row, index).unwrap();
    let runner = g
        .compile(
            device(&backend),
            &[
                OutputNode::new(c, shape(DataType::Int32, &[3, 2])),
                OutputNode::new(updated, shape(DataType::Int32, &[3, 2])),
            ],
            &[],
            &[a_shape, b_shape],
        )
        .unwrap();
    let (out, _) = runner
        .run(&[input(&[1, 2], vec![1i32, 2]), input(&[2, 2], vec![3i32, 4, 5, 6])])
        .unwrap();
    assert_eq!(fetch(&out[0]), Storage::Int32(vec![1, 2, 3, 4, 5, 6]));
    assert_eq!(fetch(&out[1]), Storage::Int32(vec![1, 2, 3, 4, -1, -2]));
}

#[test]
fn test_broadcast_then_add() {
    let backend = backend();
    let mut g = Graph::new("bias", backend.clone());
    let xs = shape(DataType::Float32, &[2, 3]);
    let bs = shape(DataType::Float32, &[3]);
    let x = g.argument("x", &xs, 0).unwrap();
    let b = g.argument("b", &bs, 1).unwrap();
    assert!(g.binary(BinaryOp::Add, x, b).is_err());
    let wide = g.broadcast_in_dim(b, &xs, &[1]).unwrap();
    let y = g.binary(BinaryOp::Add, x, wide).unwrap();
    let y = g.unary(UnaryOp::Neg, y).unwrap();
    let runner = g
        .compile(device(&backend), &[OutputNode::new(y, xs.clone())], &[], &[xs, bs])
        .unwrap();
    let (out, _) = runner
        .run(&[
            input(&[2, 3], vec![0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0]),
            input(&[3], vec![10.0f32, 20.0, 30.0]),
        ])
        .unwrap();
    assert_eq!(
        fetch(&out[0]),
        Storage::Float32(vec![-10.0, -21.0, -32.0, -13.0, -24.0, -35.0])
    );
}

#[test]
fn test_iota_and_math() {
    let backend = backend();
    let mut g = Graph::new("trig", backend.clone());
    let s = shape(DataType::Float64, &[4]);
    let steps = g.num().unwrap().iota(&s, 0).unwrap();
    let scale = g
        .constant(&HostBuffer::from_vec(vec![4], vec![0.5f64; 4]).unwrap())
        .unwrap();
    let x = g.binary(BinaryOp::Mul, steps, scale).unwrap();
    let math = g.math().unwrap();
    let sin = math.sin(x).unwrap();
    let cos = math.cos(x).unwrap();
    let tanh = math.tanh(x).unwrap();
    let outputs: Vec<OutputNode> = [sin, cos, tanh]
        .iter()
        .map(|&n| OutputNode::new(n, s.clone()))
        .collect();
    let runner = g.compile(device(&backend), &outputs, &[], &[]).unwrap();
    let (out, _) = runner.run(&[]).unwrap();

    let fns: [fn(f64) -> f64; 3] = [f64::sin, f64::cos, f64::tanh];
    for (handle, f) in out.iter().zip(fns) {
        let values = fetch(handle);
        for (i, got) in values.as_slice::<f64>().unwrap().iter().enumerate() {
            assert_relative_eq!(*got, f(i as f64 * 0.5), epsilon = 1e-12);
        }
    }
}

#[test]
fn test_core_only_backend() {
    let backend = Arc::new(CpuBackend::default().with_capabilities(Capabilities::CORE_ONLY));
    let mut g = Graph::new("core", backend.clone());
    assert!(g.num().is_none());
    assert!(g.math().is_none());

    // Calling the library traits on the graph directly is refused as well.
    let err = NumBuilder::iota(&mut g, &shape(DataType::Int32, &[3]), 0).unwrap_err();
    assert!(matches!(err, GraphError::Unsupported(_)));
    let x = g.core().argument("x", &shape(DataType::Float32, &[3]), 0).unwrap();
    let err = MathBuilder::cos(&mut g, x).unwrap_err();
    assert!(matches!(err, GraphError::Unsupported(_)));

    let y = g.core().unary(UnaryOp::Neg, x).unwrap();
    let runner = g
        .compile(
            device(&backend),
            &[OutputNode::new(y, shape(DataType::Float32, &[3]))],
            &[],
            &[shape(DataType::Float32, &[3])],
        )
        .unwrap();
    let (outputs, _) = runner.run(&[input(&[3], vec![1.0f32, -2.0, 0.5])]).unwrap();
    assert_eq!(fetch(&outputs[0]).as_slice::<f32>().unwrap(), &[-1.0, 2.0, -0.5]);
}

#[test]
fn test_cast_to_bfloat16() {
    let backend = backend();
    let mut g = Graph::new("cast", backend.clone());
    let s = shape(DataType::Float32, &[3]);
    let x = g.argument("x", &s, 0).unwrap();
    let narrow = g.cast(x, DataType::BFloat16).unwrap();
    let back = g.cast(narrow, DataType::Float32).unwrap();
    let flags = g.cast(x, DataType::Int32).unwrap();
    assert!(g.cast(x, DataType::Bool).is_err());
    let runner = g
        .compile(
            device(&backend),
            &[
                OutputNode::new(narrow, shape(DataType::BFloat16, &[3])),
                OutputNode::new(back, s.clone()),
                OutputNode::new(flags, shape(DataType::Int32, &[3])),
            ],
            &[],
            &[s],
        )
        .unwrap();
    let (out, _) = runner
        .run(&[input(&[3], vec![1.0f32, std::f32::consts::PI, -2.75])])
        .unwrap();
    assert_eq!(
        fetch(&out[0]),
        Storage::BFloat16(vec![
            BFloat16::ONE,
            BFloat16::from_f32(3.140625),
            BFloat16::from_f32(-2.75)
        ])
    );
    assert_eq!(fetch(&out[1]), Storage::Float32(vec![1.0, 3.140625, -2.75]));
    assert_eq!(fetch(&out[2]), Storage::Int32(vec![1, 3, -2]));
}

#[test]
fn test_run_validates_inputs() {
    let backend = backend();
    let mut g = Graph::new("validate", backend.clone());
    let s = shape(DataType::Float32, &[2]);
    let x = g.argument("x", &s, 0).unwrap();
    let runner = g
        .compile(device(&backend), &[OutputNode::new(x, s.clone())], &[], &[s])
        .unwrap();

    assert!(matches!(
        runner.run(&[]).unwrap_err(),
        GraphError::ArgumentCountMismatch { expected: 1, got: 0, .. }
    ));
    assert!(matches!(
        runner.run(&[input(&[3], vec![0.0f32; 3])]).unwrap_err(),
        GraphError::ShapeMismatch { .. }
    ));
    assert!(matches!(
        runner.run(&[input(&[2], vec![0i32; 2])]).unwrap_err(),
        GraphError::ShapeMismatch { .. }
    ));

    let freed = HostBuffer::from_vec(vec![2], vec![1.0f32, 2.0]).unwrap();
    freed.free();
    let freed: Arc<dyn Handle> = Arc::new(freed);
    assert!(matches!(
        runner.run(&[freed]).unwrap_err(),
        GraphError::Tensor(TensorError::BufferFreed)
    ));
}

#[test]
fn test_runner_outlives_graph() {
    let backend = backend();
    let s = shape(DataType::Int32, &[2]);
    let runner = {
        let mut g = Graph::new("short-lived", backend.clone());
        let x = g.argument("x", &s, 0).unwrap();
        let y = g.binary(BinaryOp::Add, x, x).unwrap();
        g.compile(device(&backend), &[OutputNode::new(y, s.clone())], &[], &[s.clone()])
            .unwrap()
    };
    for round in 0..3 {
        let (out, _) = runner.run(&[input(&[2], vec![round, -round])]).unwrap();
        assert_eq!(fetch(&out[0]), Storage::Int32(vec![2 * round, -2 * round]));
    }
}

#[test]
fn test_concurrent_runs_on_multiple_devices() {
    let platform = CpuPlatform::new(CpuConfig::default().with_devices(4));
    let backend = Arc::new(CpuBackend::new(platform.clone()));
    let s = shape(DataType::Int64, &[3]);

    let runners: Vec<_> = (0..platform.device_count())
        .map(|ordinal| {
            let mut g = Graph::new("square", backend.clone());
            let x = g.argument("x", &s, 0).unwrap();
            let y = g.binary(BinaryOp::Mul, x, x).unwrap();
            let device = platform.device(ordinal).unwrap();
            Arc::new(
                g.compile(device, &[OutputNode::new(y, s.clone())], &[], &[s.clone()])
                    .unwrap(),
            )
        })
        .collect();

    let handles: Vec<_> = runners
        .iter()
        .enumerate()
        .flat_map(|(ordinal, runner)| {
            (0..4).map(move |k| {
                let runner = Arc::clone(runner);
                thread::spawn(move || {
                    let base = (ordinal * 10 + k) as i64;
                    let (out, _) = runner
                        .run(&[input(&[3], vec![base, base + 1, -base])])
                        .unwrap();
                    assert_eq!(out[0].device().ordinal(), ordinal);
                    assert_eq!(
                        fetch(&out[0]),
                        Storage::Int64(vec![base * base, (base + 1) * (base + 1), base * base])
                    );
                })
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_compile_rejects_foreign_device() {
    let backend = backend();
    let other = CpuPlatform::new(CpuConfig {
        name: "other".to_string(),
        num_devices: 1,
    });
    let mut g = Graph::new("foreign", backend);
    let s = shape(DataType::Int32, &[]);
    let x = g.argument("x", &s, 0).unwrap();
    let err = g
        .compile(other.device(0).unwrap(), &[OutputNode::new(x, s.clone())], &[], &[s.clone()])
        .unwrap_err();
    assert!(matches!(err, GraphError::Unsupported(_)));
    assert!(!g.is_frozen());

    // Same name, different platform instance.
    let twin = CpuPlatform::default();
    let err = g
        .compile(twin.device(0).unwrap(), &[OutputNode::new(x, s.clone())], &[], &[s.clone()])
        .unwrap_err();
    assert!(matches!(err, GraphError::Unsupported(_)));
    assert!(!g.is_frozen());
}
