//! Typed arithmetic on packed words.
//!
//! Host bindings receive scalars as 64-bit words (see [`abi`](super::abi)).
//! These helpers unpack a word to its native type, apply the operation
//! with that type's semantics and pack the result again. Integer
//! arithmetic wraps; integer division and remainder by zero fail.

use super::abi;
use crate::telem::Element;
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Arith {
    pub const ALL: [Arith; 5] = [Arith::Add, Arith::Sub, Arith::Mul, Arith::Div, Arith::Mod];

    pub fn name(self) -> &'static str {
        match self {
            Arith::Add => "add",
            Arith::Sub => "sub",
            Arith::Mul => "mul",
            Arith::Div => "div",
            Arith::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Compare {
    pub const ALL: [Compare; 6] = [
        Compare::Gt,
        Compare::Lt,
        Compare::Ge,
        Compare::Le,
        Compare::Eq,
        Compare::Ne,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Compare::Gt => "gt",
            Compare::Lt => "lt",
            Compare::Ge => "ge",
            Compare::Le => "le",
            Compare::Eq => "eq",
            Compare::Ne => "ne",
        }
    }

    fn holds<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            Compare::Gt => lhs > rhs,
            Compare::Lt => lhs < rhs,
            Compare::Ge => lhs >= rhs,
            Compare::Le => lhs <= rhs,
            Compare::Eq => lhs == rhs,
            Compare::Ne => lhs != rhs,
        }
    }
}

/// Integer division or remainder by zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("integer divide by zero")]
pub struct DivideByZero;

trait Scalar: Element + PartialOrd {
    fn from_word(word: u64) -> Self {
        let bytes = abi::unpack(Self::DATA_TYPE, word);
        Self::read_le(&bytes[..Self::DATA_TYPE.density()])
    }

    fn into_word(self) -> u64 {
        let mut bytes = Vec::with_capacity(8);
        self.write_le(&mut bytes);
        abi::pack(Self::DATA_TYPE, &bytes)
    }

    fn apply(self, op: Arith, rhs: Self) -> Result<Self, DivideByZero>;

    fn pow(self, exp: Self) -> Self;

    fn negate(self) -> Self;
}

macro_rules! int_arith {
    ($lhs:expr, $op:expr, $rhs:expr) => {
        Ok(match $op {
            Arith::Add => $lhs.wrapping_add($rhs),
            Arith::Sub => $lhs.wrapping_sub($rhs),
            Arith::Mul => $lhs.wrapping_mul($rhs),
            Arith::Div | Arith::Mod if $rhs == 0 => return Err(DivideByZero),
            Arith::Div => $lhs.wrapping_div($rhs),
            Arith::Mod => $lhs.wrapping_rem($rhs),
        })
    };
}

macro_rules! impl_unsigned_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                fn apply(self, op: Arith, rhs: Self) -> Result<Self, DivideByZero> {
                    int_arith!(self, op, rhs)
                }

                fn pow(self, exp: Self) -> Self {
                    self.wrapping_pow(u32::try_from(exp).unwrap_or(u32::MAX))
                }

                fn negate(self) -> Self {
                    self.wrapping_neg()
                }
            }
        )*
    };
}

macro_rules! impl_signed_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                fn apply(self, op: Arith, rhs: Self) -> Result<Self, DivideByZero> {
                    int_arith!(self, op, rhs)
                }

                fn pow(self, exp: Self) -> Self {
                    if exp < 0 {
                        // Truncated reciprocal: zero unless |base| is one.
                        return match self {
                            1 => 1,
                            -1 if exp % 2 == 0 => 1,
                            -1 => -1,
                            _ => 0,
                        };
                    }
                    self.wrapping_pow(u32::try_from(exp).unwrap_or(u32::MAX))
                }

                fn negate(self) -> Self {
                    self.wrapping_neg()
                }
            }
        )*
    };
}

macro_rules! impl_float_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                fn apply(self, op: Arith, rhs: Self) -> Result<Self, DivideByZero> {
                    Ok(match op {
                        Arith::Add => self + rhs,
                        Arith::Sub => self - rhs,
                        Arith::Mul => self * rhs,
                        Arith::Div => self / rhs,
                        Arith::Mod => self % rhs,
                    })
                }

                fn pow(self, exp: Self) -> Self {
                    self.powf(exp)
                }

                fn negate(self) -> Self {
                    -self
                }
            }
        )*
    };
}

impl_unsigned_scalar!(u8, u16, u32, u64);
impl_signed_scalar!(i8, i16, i32, i64);
impl_float_scalar!(f32, f64);

/// Run `$f::<T>(args)` with `T` the native type of `$dt`. Timestamps
/// compute as `i64`.
macro_rules! dispatch {
    ($dt:expr, $f:ident($($arg:expr),*)) => {
        match $dt {
            DataType::U8 => $f::<u8>($($arg),*),
            DataType::U16 => $f::<u16>($($arg),*),
            DataType::U32 => $f::<u32>($($arg),*),
            DataType::U64 => $f::<u64>($($arg),*),
            DataType::I8 => $f::<i8>($($arg),*),
            DataType::I16 => $f::<i16>($($arg),*),
            DataType::I32 => $f::<i32>($($arg),*),
            DataType::I64 | DataType::TimeStamp => $f::<i64>($($arg),*),
            DataType::F32 => $f::<f32>($($arg),*),
            DataType::F64 => $f::<f64>($($arg),*),
        }
    };
}

/// `lhs op rhs` in the native type of `data_type`
pub fn arith(data_type: DataType, op: Arith, lhs: u64, rhs: u64) -> Result<u64, DivideByZero> {
    fn typed<T: Scalar>(op: Arith, lhs: u64, rhs: u64) -> Result<u64, DivideByZero> {
        T::from_word(lhs).apply(op, T::from_word(rhs)).map(T::into_word)
    }
    dispatch!(data_type, typed(op, lhs, rhs))
}

pub fn compare(data_type: DataType, op: Compare, lhs: u64, rhs: u64) -> bool {
    fn typed<T: Scalar>(op: Compare, lhs: u64, rhs: u64) -> bool {
        op.holds(T::from_word(lhs), T::from_word(rhs))
    }
    dispatch!(data_type, typed(op, lhs, rhs))
}

/// `base` raised to `exp`. Integer powers wrap; a negative integer
/// exponent truncates toward zero.
pub fn pow(data_type: DataType, base: u64, exp: u64) -> u64 {
    fn typed<T: Scalar>(base: u64, exp: u64) -> u64 {
        T::from_word(base).pow(T::from_word(exp)).into_word()
    }
    dispatch!(data_type, typed(base, exp))
}

pub fn negate(data_type: DataType, word: u64) -> u64 {
    fn typed<T: Scalar>(word: u64) -> u64 {
        T::from_word(word).negate().into_word()
    }
    dispatch!(data_type, typed(word))
}
