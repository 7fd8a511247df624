use std::fmt;

use crate::bfloat16::BFloat16;
use crate::storage::Storage;

/// Kind of an atomic value, or of the elements stored in an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Sentinel for an unrecognized kind. Only meaningful in diagnostics.
    Invalid,
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float32,
    Float64,
    /// Reduced-precision float: the upper 16 bits of an IEEE 754 `f32`.
    BFloat16,
}

impl DataType {
    /// Every valid kind, in declaration order.
    pub const ALL: [DataType; 8] = [
        DataType::Bool,
        DataType::Int32,
        DataType::Int64,
        DataType::Uint32,
        DataType::Uint64,
        DataType::Float32,
        DataType::Float64,
        DataType::BFloat16,
    ];

    /// Returns the size in bytes of a single element.
    ///
    /// # Panics
    /// Panics on [`DataType::Invalid`]: an invalid kind reaching a size lookup
    /// is a broken invariant, not bad input.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::BFloat16 => 2,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Uint64 | DataType::Float64 => 8,
            DataType::Invalid => panic!("invalid datatype has no size"),
        }
    }

    /// Maps a raw kind code to a `DataType`.
    ///
    /// Codes follow declaration order starting at 1; anything else maps to
    /// [`DataType::Invalid`].
    pub fn from_raw(code: u32) -> DataType {
        match code {
            1 => DataType::Bool,
            2 => DataType::Int32,
            3 => DataType::Int64,
            4 => DataType::Uint32,
            5 => DataType::Uint64,
            6 => DataType::Float32,
            7 => DataType::Float64,
            8 => DataType::BFloat16,
            _ => DataType::Invalid,
        }
    }

    /// Returns the raw kind code of this `DataType` (0 for `Invalid`).
    pub fn to_raw(&self) -> u32 {
        match self {
            DataType::Invalid => 0,
            DataType::Bool => 1,
            DataType::Int32 => 2,
            DataType::Int64 => 3,
            DataType::Uint32 => 4,
            DataType::Uint64 => 5,
            DataType::Float32 => 6,
            DataType::Float64 => 7,
            DataType::BFloat16 => 8,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, DataType::Invalid)
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            DataType::Float32 | DataType::Float64 | DataType::BFloat16
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int32 | DataType::Int64 | DataType::Uint32 | DataType::Uint64
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64) || self.is_float()
    }

    /// Returns true for kinds on which algebra is defined (integers and floats).
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::BFloat16 => "bfloat16",
            DataType::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// A host scalar type that can be stored in an array.
///
/// Ties a Rust type to its [`DataType`] and to the matching [`Storage`]
/// variant, and defines its native-endian byte encoding.
pub trait ArrayElement: Copy + Send + Sync + fmt::Debug + 'static {
    const DTYPE: DataType;

    /// Decodes one element from exactly `DTYPE.size_in_bytes()` bytes.
    fn read_ne(bytes: &[u8]) -> Self;

    /// Appends the native-endian encoding of `self` to `out`.
    fn write_ne(self, out: &mut Vec<u8>);

    fn into_storage(values: Vec<Self>) -> Storage;

    fn storage_slice(storage: &Storage) -> Option<&[Self]>;
}

macro_rules! impl_array_element {
    ($ty:ty, $variant:ident) => {
        impl ArrayElement for $ty {
            const DTYPE: DataType = DataType::$variant;

            fn read_ne(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }

            fn write_ne(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }

            fn into_storage(values: Vec<Self>) -> Storage {
                Storage::$variant(values)
            }

            fn storage_slice(storage: &Storage) -> Option<&[Self]> {
                match storage {
                    Storage::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }
        }
    };
}

impl_array_element!(i32, Int32);
impl_array_element!(i64, Int64);
impl_array_element!(u32, Uint32);
impl_array_element!(u64, Uint64);
impl_array_element!(f32, Float32);
impl_array_element!(f64, Float64);

impl ArrayElement for bool {
    const DTYPE: DataType = DataType::Bool;

    fn read_ne(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn write_ne(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn into_storage(values: Vec<Self>) -> Storage {
        Storage::Bool(values)
    }

    fn storage_slice(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::Bool(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl ArrayElement for BFloat16 {
    const DTYPE: DataType = DataType::BFloat16;

    fn read_ne(bytes: &[u8]) -> Self {
        BFloat16::from_bits(u16::from_ne_bytes([bytes[0], bytes[1]]))
    }

    fn write_ne(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_ne_bytes());
    }

    fn into_storage(values: Vec<Self>) -> Storage {
        Storage::BFloat16(values)
    }

    fn storage_slice(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::BFloat16(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}
