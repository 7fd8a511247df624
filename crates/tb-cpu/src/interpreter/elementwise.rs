//! Elementwise kernels: unary and binary operators, casts, transcendental
//! functions.

use tb_graph::{BinaryOp, GraphError, MathFunction, Result, UnaryOp};
use tb_tensor::{ArrayElement, BFloat16, DataType, Storage};

/// Element types with arithmetic.
///
/// Integer arithmetic wraps. `BFloat16` computes in `f32` and truncates the
/// result.
pub(crate) trait Numeric: ArrayElement + PartialOrd {
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    /// `None` on integer division by zero.
    fn div(self, rhs: Self) -> Option<Self>;
    fn rem(self, rhs: Self) -> Option<Self>;
    fn neg(self) -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(x: f64) -> Self;
    fn to_i128(self) -> i128;
    fn from_i128(x: i128) -> Self;
    fn from_usize(x: usize) -> Self;
}

macro_rules! impl_numeric_int {
    ($($ty:ty),*) => {$(
        impl Numeric for $ty {
            fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
            fn div(self, rhs: Self) -> Option<Self> {
                (rhs != 0).then(|| self.wrapping_div(rhs))
            }
            fn rem(self, rhs: Self) -> Option<Self> {
                (rhs != 0).then(|| self.wrapping_rem(rhs))
            }
            fn neg(self) -> Self { self.wrapping_neg() }
            fn to_f64(self) -> f64 { self as f64 }
            fn from_f64(x: f64) -> Self { x as $ty }
            fn to_i128(self) -> i128 { self as i128 }
            fn from_i128(x: i128) -> Self { x as $ty }
            fn from_usize(x: usize) -> Self { x as $ty }
        }
    )*};
}

macro_rules! impl_numeric_float {
    ($($ty:ty),*) => {$(
        impl Numeric for $ty {
            fn add(self, rhs: Self) -> Self { self + rhs }
            fn sub(self, rhs: Self) -> Self { self - rhs }
            fn mul(self, rhs: Self) -> Self { self * rhs }
            fn div(self, rhs: Self) -> Option<Self> { Some(self / rhs) }
            fn rem(self, rhs: Self) -> Option<Self> { Some(self % rhs) }
            fn neg(self) -> Self { -self }
            fn to_f64(self) -> f64 { self as f64 }
            fn from_f64(x: f64) -> Self { x as $ty }
            fn to_i128(self) -> i128 { self as i128 }
            fn from_i128(x: i128) -> Self { x as $ty }
            fn from_usize(x: usize) -> Self { x as $ty }
        }
    )*};
}

impl_numeric_int!(i32, i64, u32, u64);
impl_numeric_float!(f32, f64);

fn bf16_op(a: BFloat16, b: BFloat16, f: impl Fn(f32, f32) -> f32) -> BFloat16 {
    BFloat16::from_f32(f(a.to_f32(), b.to_f32()))
}

impl Numeric for BFloat16 {
    fn add(self, rhs: Self) -> Self {
        bf16_op(self, rhs, |a, b| a + b)
    }
    fn sub(self, rhs: Self) -> Self {
        bf16_op(self, rhs, |a, b| a - b)
    }
    fn mul(self, rhs: Self) -> Self {
        bf16_op(self, rhs, |a, b| a * b)
    }
    fn div(self, rhs: Self) -> Option<Self> {
        Some(bf16_op(self, rhs, |a, b| a / b))
    }
    fn rem(self, rhs: Self) -> Option<Self> {
        Some(bf16_op(self, rhs, |a, b| a % b))
    }
    fn neg(self) -> Self {
        BFloat16::from_f32(-self.to_f32())
    }
    fn to_f64(self) -> f64 {
        BFloat16::to_f64(self)
    }
    fn from_f64(x: f64) -> Self {
        BFloat16::from_f64(x)
    }
    fn to_i128(self) -> i128 {
        self.to_f32() as i128
    }
    fn from_i128(x: i128) -> Self {
        BFloat16::from_f32(x as f32)
    }
    fn from_usize(x: usize) -> Self {
        BFloat16::from_f32(x as f32)
    }
}

/// Bitwise operators on integers and booleans.
pub(crate) trait Bits: ArrayElement {
    fn and(self, rhs: Self) -> Self;
    fn or(self, rhs: Self) -> Self;
    fn xor(self, rhs: Self) -> Self;
    fn not(self) -> Self;
}

macro_rules! impl_bits {
    ($($ty:ty),*) => {$(
        impl Bits for $ty {
            fn and(self, rhs: Self) -> Self { self & rhs }
            fn or(self, rhs: Self) -> Self { self | rhs }
            fn xor(self, rhs: Self) -> Self { self ^ rhs }
            fn not(self) -> Self { !self }
        }
    )*};
}

impl_bits!(bool, i32, i64, u32, u64);

/// Runs `$body` with `$v` bound to the inner vector of a numeric variant, or
/// `$fallback` with the whole storage bound to `$other`.
macro_rules! with_numeric {
    ($storage:expr, $v:ident => $body:expr, $other:ident => $fallback:expr) => {
        match $storage {
            Storage::Int32($v) => $body,
            Storage::Int64($v) => $body,
            Storage::Uint32($v) => $body,
            Storage::Uint64($v) => $body,
            Storage::Float32($v) => $body,
            Storage::Float64($v) => $body,
            Storage::BFloat16($v) => $body,
            $other => $fallback,
        }
    };
}

macro_rules! with_bits {
    ($storage:expr, $v:ident => $body:expr, $other:ident => $fallback:expr) => {
        match $storage {
            Storage::Bool($v) => $body,
            Storage::Int32($v) => $body,
            Storage::Int64($v) => $body,
            Storage::Uint32($v) => $body,
            Storage::Uint64($v) => $body,
            $other => $fallback,
        }
    };
}

fn unsupported(op: &'static str, dtype: DataType) -> GraphError {
    GraphError::UnsupportedDType { op, dtype }
}

pub(crate) fn unary(op: UnaryOp, x: &Storage) -> Result<Storage> {
    match op {
        UnaryOp::Neg => with_numeric!(
            x,
            v => Ok(Storage::from_vec(v.iter().map(|&a| a.neg()).collect())),
            other => Err(unsupported(op.as_str(), other.dtype()))
        ),
        UnaryOp::LogicalNot => match x {
            Storage::Bool(v) => Ok(Storage::Bool(v.iter().map(|&a| !a).collect())),
            other => Err(unsupported(op.as_str(), other.dtype())),
        },
        UnaryOp::BitNot => with_bits!(
            x,
            v => Ok(Storage::from_vec(v.iter().map(|&a| a.not()).collect())),
            other => Err(unsupported(op.as_str(), other.dtype()))
        ),
    }
}

fn zip<T: Copy, U>(x: &[T], y: &[T], f: impl Fn(T, T) -> U) -> Vec<U> {
    x.iter().zip(y).map(|(&a, &b)| f(a, b)).collect()
}

fn arithmetic<T: Numeric>(op: BinaryOp, x: &[T], y: &Storage) -> Result<Storage> {
    let y = y.as_slice::<T>()?;
    let values: Vec<T> = match op {
        BinaryOp::Add => zip(x, y, T::add),
        BinaryOp::Sub => zip(x, y, T::sub),
        BinaryOp::Mul => zip(x, y, T::mul),
        BinaryOp::Minimum => zip(x, y, |a, b| if b < a { b } else { a }),
        BinaryOp::Maximum => zip(x, y, |a, b| if b > a { b } else { a }),
        BinaryOp::Div | BinaryOp::Rem => {
            let f = if op == BinaryOp::Div { T::div } else { T::rem };
            x.iter()
                .zip(y)
                .map(|(&a, &b)| {
                    f(a, b).ok_or_else(|| {
                        GraphError::Execution(format!("{}: integer division by zero", op))
                    })
                })
                .collect::<Result<_>>()?
        }
        BinaryOp::Less => return Ok(Storage::Bool(zip(x, y, |a, b| a < b))),
        BinaryOp::LessEqual => return Ok(Storage::Bool(zip(x, y, |a, b| a <= b))),
        BinaryOp::Greater => return Ok(Storage::Bool(zip(x, y, |a, b| a > b))),
        BinaryOp::GreaterEqual => return Ok(Storage::Bool(zip(x, y, |a, b| a >= b))),
        BinaryOp::Equal => return Ok(Storage::Bool(zip(x, y, |a, b| a == b))),
        BinaryOp::NotEqual => return Ok(Storage::Bool(zip(x, y, |a, b| a != b))),
        _ => return Err(unsupported(op.as_str(), T::DTYPE)),
    };
    Ok(Storage::from_vec(values))
}

fn bitwise<T: Bits + PartialEq>(op: BinaryOp, x: &[T], y: &Storage) -> Result<Storage> {
    let y = y.as_slice::<T>()?;
    let values: Vec<T> = match op {
        BinaryOp::BitAnd => zip(x, y, T::and),
        BinaryOp::BitOr => zip(x, y, T::or),
        BinaryOp::BitXor => zip(x, y, T::xor),
        BinaryOp::Equal => return Ok(Storage::Bool(zip(x, y, |a, b| a == b))),
        BinaryOp::NotEqual => return Ok(Storage::Bool(zip(x, y, |a, b| a != b))),
        _ => return Err(unsupported(op.as_str(), T::DTYPE)),
    };
    Ok(Storage::from_vec(values))
}

pub(crate) fn binary(op: BinaryOp, x: &Storage, y: &Storage) -> Result<Storage> {
    match (op, x) {
        (BinaryOp::LogicalAnd, Storage::Bool(a)) => {
            Ok(Storage::Bool(zip(a, y.as_slice::<bool>()?, |a, b| a && b)))
        }
        (BinaryOp::LogicalOr, Storage::Bool(a)) => {
            Ok(Storage::Bool(zip(a, y.as_slice::<bool>()?, |a, b| a || b)))
        }
        (BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor, _) | (_, Storage::Bool(_)) => {
            with_bits!(
                x,
                v => bitwise(op, v, y),
                other => Err(unsupported(op.as_str(), other.dtype()))
            )
        }
        _ => with_numeric!(
            x,
            v => arithmetic(op, v, y),
            other => Err(unsupported(op.as_str(), other.dtype()))
        ),
    }
}

fn convert<S: Numeric, T: Numeric>(x: &[S], from_float: bool) -> Vec<T> {
    if from_float {
        x.iter().map(|&a| T::from_f64(a.to_f64())).collect()
    } else {
        x.iter().map(|&a| T::from_i128(a.to_i128())).collect()
    }
}

fn cast_to<T: Numeric>(x: &Storage) -> Result<Vec<T>> {
    let from_float = x.dtype().is_float();
    Ok(match x {
        Storage::Bool(v) => v.iter().map(|&b| T::from_i128(b as i128)).collect(),
        Storage::Int32(v) => convert(v, from_float),
        Storage::Int64(v) => convert(v, from_float),
        Storage::Uint32(v) => convert(v, from_float),
        Storage::Uint64(v) => convert(v, from_float),
        Storage::Float32(v) => convert(v, from_float),
        Storage::Float64(v) => convert(v, from_float),
        Storage::BFloat16(v) => convert(v, from_float),
    })
}

/// Converts every element to `target`.
///
/// Float to integer conversions saturate; integer conversions wrap; narrowing
/// to `bfloat16` truncates.
pub(crate) fn cast(x: &Storage, target: DataType) -> Result<Storage> {
    if x.dtype() == target {
        return Ok(x.clone());
    }
    Ok(match target {
        DataType::Int32 => Storage::Int32(cast_to(x)?),
        DataType::Int64 => Storage::Int64(cast_to(x)?),
        DataType::Uint32 => Storage::Uint32(cast_to(x)?),
        DataType::Uint64 => Storage::Uint64(cast_to(x)?),
        DataType::Float32 => Storage::Float32(cast_to(x)?),
        DataType::Float64 => Storage::Float64(cast_to(x)?),
        DataType::BFloat16 => Storage::BFloat16(cast_to(x)?),
        DataType::Bool | DataType::Invalid => {
            return Err(GraphError::UnsupportedDType {
                op: "cast",
                dtype: target,
            })
        }
    })
}

pub(crate) fn math(function: MathFunction, x: &Storage) -> Result<Storage> {
    let f: fn(f64) -> f64 = match function {
        MathFunction::Cos => f64::cos,
        MathFunction::Sin => f64::sin,
        MathFunction::Tanh => f64::tanh,
    };
    Ok(match x {
        Storage::Float32(v) => Storage::Float32(v.iter().map(|&a| f(a as f64) as f32).collect()),
        Storage::Float64(v) => Storage::Float64(v.iter().map(|&a| f(a)).collect()),
        Storage::BFloat16(v) => Storage::BFloat16(
            v.iter()
                .map(|&a| BFloat16::from_f64(f(a.to_f64())))
                .collect(),
        ),
        other => return Err(unsupported(function.as_str(), other.dtype())),
    })
}
