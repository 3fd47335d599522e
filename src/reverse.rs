//! Reverse-mode variables recording onto the thread-local active tape.

use std::fmt::{self, Display};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::scalar::Scalar;
use crate::tape::{with_active_tape, TapeThreadLocal, CONSTANT};

/// A value plus its gradient index on the active `Tape<S>`.
///
/// `Reverse` carries no tape reference, so it is `Copy` and `'static` and can
/// itself serve as the multiplier scalar of an enclosing tape. Arithmetic
/// between constants stays off the tape entirely.
#[derive(Clone, Copy, Debug)]
pub struct Reverse<S: TapeThreadLocal> {
    /// Primal value.
    pub value: S,
    /// Gradient index on the active tape, or [`CONSTANT`].
    pub index: u32,
}

impl<S: TapeThreadLocal> Reverse<S> {
    /// Lift a value as an untracked constant.
    #[inline]
    pub fn constant(value: S) -> Self {
        Reverse {
            value,
            index: CONSTANT,
        }
    }

    /// Register a tracked independent variable on the active tape.
    #[inline]
    pub fn variable(value: S) -> Self {
        let index = with_active_tape::<S, _>(|tape| tape.new_variable());
        Reverse { value, index }
    }

    /// Chain rule helper for unary functions with precomputed derivative.
    #[inline]
    fn chain(self, f_val: S, f_deriv: S) -> Self {
        if self.index == CONSTANT {
            return Reverse::constant(f_val);
        }
        let index = with_active_tape::<S, _>(|tape| tape.push_unary(self.index, f_deriv));
        Reverse {
            value: f_val,
            index,
        }
    }

    #[inline]
    fn binary(self, rhs: Self, value: S, d_lhs: S, d_rhs: S) -> Self {
        if self.index == CONSTANT && rhs.index == CONSTANT {
            return Reverse::constant(value);
        }
        let index = with_active_tape::<S, _>(|tape| {
            tape.push_binary(self.index, d_lhs, rhs.index, d_rhs)
        });
        Reverse { value, index }
    }
}

impl<S: TapeThreadLocal> Default for Reverse<S> {
    fn default() -> Self {
        Reverse::constant(S::default())
    }
}

impl<S: TapeThreadLocal> Display for Reverse<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value)
    }
}

impl<S: TapeThreadLocal> Add for Reverse<S> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.binary(rhs, self.value + rhs.value, S::one(), S::one())
    }
}

impl<S: TapeThreadLocal> Sub for Reverse<S> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.binary(rhs, self.value - rhs.value, S::one(), -S::one())
    }
}

impl<S: TapeThreadLocal> Mul for Reverse<S> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self.binary(rhs, self.value * rhs.value, rhs.value, self.value)
    }
}

impl<S: TapeThreadLocal> Div for Reverse<S> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let inv = S::one() / rhs.value;
        self.binary(
            rhs,
            self.value * inv,
            inv,
            -self.value * inv * inv,
        )
    }
}

impl<S: TapeThreadLocal> Neg for Reverse<S> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        self.chain(-self.value, -S::one())
    }
}

impl<S: TapeThreadLocal> AddAssign for Reverse<S> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<S: TapeThreadLocal> SubAssign for Reverse<S> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<S: TapeThreadLocal> MulAssign for Reverse<S> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

// Comparisons look only at primal values.
impl<S: TapeThreadLocal> PartialEq for Reverse<S> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<S: TapeThreadLocal> PartialOrd for Reverse<S> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl<S: TapeThreadLocal> Scalar for Reverse<S> {
    #[inline]
    fn from_f64(val: f64) -> Self {
        Reverse::constant(S::from_f64(val))
    }

    #[inline]
    fn zero() -> Self {
        Reverse::constant(S::zero())
    }

    #[inline]
    fn one() -> Self {
        Reverse::constant(S::one())
    }

    #[inline]
    fn value(&self) -> f64 {
        self.value.value()
    }

    #[inline]
    fn is_strict_zero(&self) -> bool {
        self.index == CONSTANT && self.value.is_strict_zero()
    }

    #[inline]
    fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, S::one() / (S::from_f64(2.0) * s))
    }

    #[inline]
    fn abs(self) -> Self {
        let sign = if self.value.value() < 0.0 {
            -S::one()
        } else {
            S::one()
        };
        self.chain(self.value.abs(), sign)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        let deriv = S::from_f64(n as f64) * self.value.powi(n - 1);
        self.chain(self.value.powi(n), deriv)
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.value.exp();
        self.chain(e, e)
    }

    #[inline]
    fn ln(self) -> Self {
        self.chain(self.value.ln(), S::one() / self.value)
    }

    #[inline]
    fn sin(self) -> Self {
        self.chain(self.value.sin(), self.value.cos())
    }

    #[inline]
    fn cos(self) -> Self {
        self.chain(self.value.cos(), -self.value.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tape::{Tape, TapeGuard};

    #[test]
    fn gradient_of_polynomial() {
        // f(x, y) = x²y + y at (3, 2): df/dx = 12, df/dy = 10.
        let mut tape = Tape::<f64>::new();
        let _guard = TapeGuard::new(&mut tape);
        let x = Reverse::variable(3.0);
        let y = Reverse::variable(2.0);
        let f = x * x * y + y;
        let adjoints = with_active_tape::<f64, _>(|t| t.reverse(f.index));
        assert!((adjoints[x.index as usize] - 12.0).abs() < 1e-12);
        assert!((adjoints[y.index as usize] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn constants_stay_off_tape() {
        let mut tape = Tape::<f64>::new();
        let _guard = TapeGuard::new(&mut tape);
        let c = Reverse::<f64>::from_f64(2.0) * Reverse::from_f64(3.0);
        assert_eq!(c.index, CONSTANT);
        assert!((c.value - 6.0).abs() < 1e-12);
    }

    #[test]
    fn division_partials() {
        // f = x / y at (1, 4): df/dx = 0.25, df/dy = -1/16.
        let mut tape = Tape::<f64>::new();
        let _guard = TapeGuard::new(&mut tape);
        let x = Reverse::variable(1.0);
        let y = Reverse::variable(4.0);
        let f = x / y;
        let adjoints = with_active_tape::<f64, _>(|t| t.reverse(f.index));
        assert!((adjoints[x.index as usize] - 0.25).abs() < 1e-12);
        assert!((adjoints[y.index as usize] + 0.0625).abs() < 1e-12);
    }
}
