use std::fmt;

/// Reduced-precision float stored as the upper 16 bits of an IEEE 754 `f32`.
///
/// Only conversion to and from wider floats is supported, no arithmetic.
/// Narrowing truncates the low 16 mantissa bits, so it is lossy: the relative
/// error of a round trip is below `2^-7`.
#[derive(Clone, Copy, Default, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct BFloat16(half::bf16);

impl BFloat16 {
    pub const ZERO: BFloat16 = BFloat16(half::bf16::ZERO);
    pub const ONE: BFloat16 = BFloat16(half::bf16::ONE);

    /// Truncates an `f32` to its upper 16 bits.
    pub fn from_f32(x: f32) -> Self {
        BFloat16::from_bits((x.to_bits() >> 16) as u16)
    }

    pub fn from_f64(x: f64) -> Self {
        BFloat16::from_f32(x as f32)
    }

    /// Expands back to `f32` by zero-filling the low 16 bits. Exact.
    pub fn to_f32(self) -> f32 {
        self.0.to_f32()
    }

    pub fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }

    pub const fn from_bits(bits: u16) -> Self {
        BFloat16(half::bf16::from_bits(bits))
    }

    pub const fn to_bits(self) -> u16 {
        self.0.to_bits()
    }
}

impl From<BFloat16> for f32 {
    fn from(x: BFloat16) -> f32 {
        x.to_f32()
    }
}

impl From<BFloat16> for half::bf16 {
    fn from(x: BFloat16) -> half::bf16 {
        x.0
    }
}

impl fmt::Debug for BFloat16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BFloat16({})", self.to_f32())
    }
}

impl fmt::Display for BFloat16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f32())
    }
}
