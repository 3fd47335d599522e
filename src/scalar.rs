//! The [`Scalar`] trait for writing differentiation-generic numeric code.
//!
//! Residuals and objectives implemented as `fn f<S: Scalar>(u: &[S], theta: &[S]) -> S`
//! evaluate transparently with plain `f64`, forward-mode [`Dual<S>`](crate::Dual),
//! and reverse-mode [`Reverse<S>`](crate::Reverse). Because the wrapper types are
//! themselves `Scalar`, they nest: `Dual<Reverse<f64>>` differentiates a tangent
//! in reverse, a tape over `Dual<f64>` differentiates a gradient forward, and a
//! tape over `Reverse<f64>` differentiates a gradient in reverse again. The three
//! second-order strategies in [`crate::strategy`] are exactly these compositions.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use num_traits::Float;

/// Scalar types the sensitivity pipeline can evaluate through.
///
/// The operation set is deliberately small: the arithmetic a discretized
/// residual needs, plus the elementary functions that show up in material
/// laws and objectives.
pub trait Scalar:
    Copy
    + Debug
    + Default
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    /// Lift a plain float to this scalar as a constant (zero derivative).
    fn from_f64(val: f64) -> Self;

    /// The additive identity, as a constant.
    fn zero() -> Self;

    /// The multiplicative identity, as a constant.
    fn one() -> Self;

    /// Extract the primal value, recursing through any wrapper layers.
    fn value(&self) -> f64;

    /// True only for an untracked, structurally exact zero.
    ///
    /// Reverse sweeps use this to skip dead adjoints. A primal-value
    /// comparison is not enough: a tracked variable whose value happens to
    /// be zero can still carry a nonzero derivative, and skipping it would
    /// drop second-order terms in nested sweeps.
    fn is_strict_zero(&self) -> bool;

    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
}

impl Scalar for f64 {
    #[inline]
    fn from_f64(val: f64) -> Self {
        val
    }

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }

    #[inline]
    fn value(&self) -> f64 {
        *self
    }

    #[inline]
    fn is_strict_zero(&self) -> bool {
        *self == 0.0
    }

    #[inline]
    fn sqrt(self) -> Self {
        Float::sqrt(self)
    }

    #[inline]
    fn abs(self) -> Self {
        Float::abs(self)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        Float::powi(self, n)
    }

    #[inline]
    fn exp(self) -> Self {
        Float::exp(self)
    }

    #[inline]
    fn ln(self) -> Self {
        Float::ln(self)
    }

    #[inline]
    fn sin(self) -> Self {
        Float::sin(self)
    }

    #[inline]
    fn cos(self) -> Self {
        Float::cos(self)
    }
}
