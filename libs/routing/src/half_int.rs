//! Half-integer arithmetic for track indices.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A number that is an integer or an integer plus one half.
///
/// Stored as twice its value, so all arithmetic is exact.
///
/// ```
/// # use routing::HalfInt;
/// let a = HalfInt::new(3);
/// let b = HalfInt::from_dbl(1);
/// assert_eq!(a + b, HalfInt::from_dbl(7));
/// assert_eq!((a + b).to_string(), "3.5");
/// ```
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct HalfInt(i64);

impl HalfInt {
    /// Zero.
    pub const ZERO: Self = Self(0);
    /// One half.
    pub const HALF: Self = Self(1);
    /// One.
    pub const ONE: Self = Self(2);

    /// Creates a [`HalfInt`] from an integer.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(2 * value)
    }

    /// Creates a [`HalfInt`] whose value is `dbl / 2`.
    #[inline]
    pub const fn from_dbl(dbl: i64) -> Self {
        Self(dbl)
    }

    /// Converts a float to a [`HalfInt`] if it is exactly representable.
    pub fn from_f64(value: f64) -> Option<Self> {
        let dbl = value * 2.0;
        if dbl.fract() != 0.0 || !dbl.is_finite() || dbl.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Self(dbl as i64))
    }

    /// Twice the value.
    #[inline]
    pub const fn dbl(&self) -> i64 {
        self.0
    }

    /// Returns `true` if the value is an integer.
    #[inline]
    pub const fn is_integer(&self) -> bool {
        self.0 % 2 == 0
    }

    /// The largest integer not greater than this value.
    #[inline]
    pub const fn floor(&self) -> i64 {
        self.0.div_euclid(2)
    }

    /// The smallest integer not less than this value.
    #[inline]
    pub const fn ceil(&self) -> i64 {
        (self.0 + 1).div_euclid(2)
    }

    /// The value as a float.
    #[inline]
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / 2.0
    }

    /// Adds one half.
    #[inline]
    pub const fn up(self) -> Self {
        Self(self.0 + 1)
    }

    /// Subtracts one half.
    #[inline]
    pub const fn down(self) -> Self {
        Self(self.0 - 1)
    }

    /// Halves the value, rounding to the nearest half-integer.
    ///
    /// Ties round up if `round_up` is set and down otherwise.
    pub const fn div2(self, round_up: bool) -> Self {
        if self.0 % 2 == 0 {
            Self(self.0 / 2)
        } else if round_up {
            Self((self.0 + 1).div_euclid(2))
        } else {
            Self(self.0.div_euclid(2))
        }
    }

    /// Multiplies by `rhs`, returning [`None`] on overflow.
    pub fn checked_mul(self, rhs: i64) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    /// Rounds the value to a multiple of one half (if `half`) or one,
    /// according to `ord`.
    ///
    /// `Ordering::Less` rounds down, `Ordering::Greater` rounds up and
    /// `Ordering::Equal` rounds to the nearest value, with ties rounding up.
    pub fn round_to(self, half: bool, ord: Ordering) -> Self {
        if half || self.is_integer() {
            return self;
        }
        match ord {
            Ordering::Less => Self::new(self.floor()),
            Ordering::Equal | Ordering::Greater => Self::new(self.ceil()),
        }
    }
}

impl From<i64> for HalfInt {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<u32> for HalfInt {
    fn from(value: u32) -> Self {
        Self::new(value as i64)
    }
}

impl Add for HalfInt {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Add<i64> for HalfInt {
    type Output = Self;
    fn add(self, rhs: i64) -> Self::Output {
        Self(self.0 + 2 * rhs)
    }
}

impl AddAssign for HalfInt {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for HalfInt {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Sub<i64> for HalfInt {
    type Output = Self;
    fn sub(self, rhs: i64) -> Self::Output {
        Self(self.0 - 2 * rhs)
    }
}

impl SubAssign for HalfInt {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for HalfInt {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<i64> for HalfInt {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl PartialEq<i64> for HalfInt {
    fn eq(&self, other: &i64) -> bool {
        self.0 == 2 * other
    }
}

impl PartialOrd<i64> for HalfInt {
    fn partial_cmp(&self, other: &i64) -> Option<Ordering> {
        self.0.partial_cmp(&(2 * other))
    }
}

impl std::iter::Sum for HalfInt {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl Display for HalfInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_integer() {
            write!(f, "{}", self.0 / 2)
        } else {
            let sign = if self.0 < 0 { "-" } else { "" };
            write!(f, "{sign}{}.5", self.0.abs() / 2)
        }
    }
}

impl Debug for HalfInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Serialize for HalfInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_integer() {
            serializer.serialize_i64(self.0 / 2)
        } else {
            serializer.serialize_f64(self.to_f64())
        }
    }
}

struct HalfIntVisitor;

impl Visitor<'_> for HalfIntVisitor {
    type Value = HalfInt;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "an integer or an integer plus one half")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(HalfInt::new(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .map(HalfInt::new)
            .map_err(|_| E::custom(format!("{v} is too large for a track index")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        HalfInt::from_f64(v).ok_or_else(|| E::custom(format!("{v} is not a half-integer")))
    }
}

impl<'de> Deserialize<'de> for HalfInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(HalfIntVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        let x = HalfInt::from_dbl(-3);
        assert_eq!(x.floor(), -2);
        assert_eq!(x.ceil(), -1);
        assert_eq!(x.to_string(), "-1.5");
        assert_eq!(HalfInt::from_dbl(5).div2(true), HalfInt::from_dbl(3));
        assert_eq!(HalfInt::from_dbl(5).div2(false), HalfInt::from_dbl(2));
        assert_eq!(HalfInt::new(3).div2(false), HalfInt::from_dbl(3));
        assert_eq!(HalfInt::from_dbl(3).round_to(false, Ordering::Less), HalfInt::new(1));
        assert_eq!(HalfInt::from_dbl(3).round_to(false, Ordering::Greater), HalfInt::new(2));
    }

    #[test]
    fn serde_numbers() {
        let v: Vec<HalfInt> = serde_yaml::from_str("[1, 2.5, -0.5]").unwrap();
        assert_eq!(
            v,
            vec![HalfInt::new(1), HalfInt::from_dbl(5), HalfInt::from_dbl(-1)]
        );
        assert!(serde_yaml::from_str::<HalfInt>("0.25").is_err());
    }
}
