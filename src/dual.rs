//! Forward-mode dual numbers, generic over any [`Scalar`] so they nest.

use std::fmt::{self, Display};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::scalar::Scalar;

/// A value paired with its tangent: `re + eps·ε` where `ε² = 0`.
///
/// The components are any [`Scalar`], so `Dual<Reverse<f64>>` records a
/// directional derivative onto an active reverse tape — the building block
/// of the reverse-over-forward second-order strategy.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dual<S: Scalar> {
    /// Primal value.
    pub re: S,
    /// Tangent value.
    pub eps: S,
}

impl<S: Scalar> Dual<S> {
    /// Create a new dual number.
    #[inline]
    pub fn new(re: S, eps: S) -> Self {
        Dual { re, eps }
    }

    /// Create a constant (zero tangent).
    #[inline]
    pub fn constant(re: S) -> Self {
        Dual {
            re,
            eps: S::zero(),
        }
    }

    /// Create a variable seeded with a unit tangent.
    #[inline]
    pub fn variable(re: S) -> Self {
        Dual { re, eps: S::one() }
    }

    /// Chain rule helper: given `f(re)` and `f'(re)`, produce the dual result.
    #[inline]
    fn chain(self, f_val: S, f_deriv: S) -> Self {
        Dual {
            re: f_val,
            eps: self.eps * f_deriv,
        }
    }
}

impl<S: Scalar> Display for Dual<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} + {:?}ε", self.re, self.eps)
    }
}

impl<S: Scalar> Add for Dual<S> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Dual {
            re: self.re + rhs.re,
            eps: self.eps + rhs.eps,
        }
    }
}

impl<S: Scalar> Sub for Dual<S> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Dual {
            re: self.re - rhs.re,
            eps: self.eps - rhs.eps,
        }
    }
}

impl<S: Scalar> Mul for Dual<S> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Dual {
            re: self.re * rhs.re,
            eps: self.re * rhs.eps + self.eps * rhs.re,
        }
    }
}

impl<S: Scalar> Div for Dual<S> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let inv = S::one() / rhs.re;
        Dual {
            re: self.re * inv,
            eps: (self.eps * rhs.re - self.re * rhs.eps) * inv * inv,
        }
    }
}

impl<S: Scalar> Neg for Dual<S> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Dual {
            re: -self.re,
            eps: -self.eps,
        }
    }
}

impl<S: Scalar> AddAssign for Dual<S> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<S: Scalar> SubAssign for Dual<S> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<S: Scalar> MulAssign for Dual<S> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

// Ordering and equality compare primal values; tangents do not participate.
impl<S: Scalar> PartialEq for Dual<S> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.re == other.re
    }
}

impl<S: Scalar> PartialOrd for Dual<S> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.re.partial_cmp(&other.re)
    }
}

impl<S: Scalar> Scalar for Dual<S> {
    #[inline]
    fn from_f64(val: f64) -> Self {
        Dual::constant(S::from_f64(val))
    }

    #[inline]
    fn zero() -> Self {
        Dual::constant(S::zero())
    }

    #[inline]
    fn one() -> Self {
        Dual::constant(S::one())
    }

    #[inline]
    fn value(&self) -> f64 {
        self.re.value()
    }

    #[inline]
    fn is_strict_zero(&self) -> bool {
        self.re.is_strict_zero() && self.eps.is_strict_zero()
    }

    #[inline]
    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        let two = S::from_f64(2.0);
        self.chain(s, S::one() / (two * s))
    }

    #[inline]
    fn abs(self) -> Self {
        let sign = if self.re.value() < 0.0 {
            -S::one()
        } else {
            S::one()
        };
        self.chain(self.re.abs(), sign)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        let deriv = S::from_f64(n as f64) * self.re.powi(n - 1);
        self.chain(self.re.powi(n), deriv)
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.re.exp();
        self.chain(e, e)
    }

    #[inline]
    fn ln(self) -> Self {
        self.chain(self.re.ln(), S::one() / self.re)
    }

    #[inline]
    fn sin(self) -> Self {
        self.chain(self.re.sin(), self.re.cos())
    }

    #[inline]
    fn cos(self) -> Self {
        self.chain(self.re.cos(), -self.re.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_rule() {
        // d/dx (x * (x + 3)) = 2x + 3 at x = 2 → 7
        let x = Dual::<f64>::variable(2.0);
        let y = x * (x + Dual::from_f64(3.0));
        assert!((y.re - 10.0).abs() < 1e-12);
        assert!((y.eps - 7.0).abs() < 1e-12);
    }

    #[test]
    fn quotient_rule() {
        // d/dx (1 / x) = -1/x² at x = 4
        let x = Dual::<f64>::variable(4.0);
        let y = Dual::from_f64(1.0) / x;
        assert!((y.re - 0.25).abs() < 1e-12);
        assert!((y.eps + 0.0625).abs() < 1e-12);
    }

    #[test]
    fn nested_dual_second_derivative() {
        // f(x) = x³: f''(x) = 6x at x = 2 → 12.
        // Outer eps carries d/dx, inner eps of the outer eps carries d²/dx².
        let x: Dual<Dual<f64>> = Dual::new(Dual::variable(2.0), Dual::one());
        let y = x * x * x;
        assert!((y.re.re - 8.0).abs() < 1e-12);
        assert!((y.eps.re - 12.0).abs() < 1e-12);
        assert!((y.eps.eps - 12.0).abs() < 1e-12);
    }

    #[test]
    fn elementary_functions() {
        let x = Dual::<f64>::variable(0.7);
        let y = x.sin() * x.exp();
        let expected = 0.7_f64.sin() * 0.7_f64.exp();
        let expected_d = 0.7_f64.cos() * 0.7_f64.exp() + 0.7_f64.sin() * 0.7_f64.exp();
        assert!((y.re - expected).abs() < 1e-12);
        assert!((y.eps - expected_d).abs() < 1e-12);
    }
}
