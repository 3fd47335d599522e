//! Two-stack tape for reverse-mode sweeps, generic over the stored scalar.
//!
//! The forward pass records precomputed partial derivatives (multipliers) and
//! operand indices; the reverse sweep is a single multiply-accumulate loop.
//! Because multipliers are any [`Scalar`], a `Tape<Dual<f64>>` sweep carries
//! tangents through the adjoints (forward-over-reverse), and a
//! `Tape<Reverse<f64>>` sweep records its own arithmetic onto the enclosing
//! `f64` tape (reverse-over-reverse).

use std::cell::Cell;

use crate::dual::Dual;
use crate::reverse::Reverse;
use crate::scalar::Scalar;

/// Sentinel index indicating a constant (not recorded on tape).
pub const CONSTANT: u32 = u32::MAX;

/// A recorded operation: its result lives at `lhs_index`, and its operands'
/// multipliers/indices span `[prev.end_plus_one .. self.end_plus_one)`.
#[derive(Clone, Copy, Debug)]
struct Statement {
    lhs_index: u32,
    end_plus_one: u32,
}

/// Two-stack reverse-mode tape.
pub struct Tape<S: Scalar> {
    statements: Vec<Statement>,
    multipliers: Vec<S>,
    indices: Vec<u32>,
    num_variables: u32,
}

impl<S: Scalar> Default for Tape<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scalar> Tape<S> {
    /// Create an empty tape.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a tape with pre-allocated capacity.
    pub fn with_capacity(est_ops: usize) -> Self {
        let mut tape = Tape {
            statements: Vec::with_capacity(est_ops + 1),
            multipliers: Vec::with_capacity(est_ops * 2),
            indices: Vec::with_capacity(est_ops * 2),
            num_variables: 0,
        };
        // Sentinel statement at index 0 so that `statements[i-1].end_plus_one`
        // is always valid for i >= 1.
        tape.statements.push(Statement {
            lhs_index: 0,
            end_plus_one: 0,
        });
        tape
    }

    /// Register a new independent variable; returns its gradient index.
    ///
    /// No statement is pushed for inputs — they are leaf nodes whose
    /// adjoints survive the reverse sweep.
    #[inline]
    pub fn new_variable(&mut self) -> u32 {
        let idx = self.num_variables;
        self.num_variables += 1;
        idx
    }

    /// Record `result = f(operand)` with precomputed `multiplier = df/d(operand)`.
    #[inline]
    pub fn push_unary(&mut self, operand_idx: u32, multiplier: S) -> u32 {
        let result_idx = self.num_variables;
        self.num_variables += 1;

        if operand_idx != CONSTANT {
            self.multipliers.push(multiplier);
            self.indices.push(operand_idx);
        }

        self.statements.push(Statement {
            lhs_index: result_idx,
            end_plus_one: self.multipliers.len() as u32,
        });
        result_idx
    }

    /// Record a binary operation with precomputed partial derivatives.
    #[inline]
    pub fn push_binary(&mut self, lhs_idx: u32, lhs_mult: S, rhs_idx: u32, rhs_mult: S) -> u32 {
        let result_idx = self.num_variables;
        self.num_variables += 1;

        if lhs_idx != CONSTANT {
            self.multipliers.push(lhs_mult);
            self.indices.push(lhs_idx);
        }
        if rhs_idx != CONSTANT {
            self.multipliers.push(rhs_mult);
            self.indices.push(rhs_idx);
        }

        self.statements.push(Statement {
            lhs_index: result_idx,
            end_plus_one: self.multipliers.len() as u32,
        });
        result_idx
    }

    /// Run the reverse sweep with the adjoint of `seed_index` set to one.
    pub fn reverse(&self, seed_index: u32) -> Vec<S> {
        self.reverse_seeded(&[(seed_index, S::one())])
    }

    /// Run the reverse sweep with custom adjoint seeds.
    ///
    /// Dead adjoints are skipped only when structurally zero
    /// ([`Scalar::is_strict_zero`]); a tracked zero still propagates so
    /// nested sweeps keep their derivative information.
    pub fn reverse_seeded(&self, seeds: &[(u32, S)]) -> Vec<S> {
        let mut adjoints = vec![S::zero(); self.num_variables as usize];
        for &(idx, seed) in seeds {
            if idx != CONSTANT {
                adjoints[idx as usize] += seed;
            }
        }

        for i in (1..self.statements.len()).rev() {
            let stmt = self.statements[i];
            let a = adjoints[stmt.lhs_index as usize];
            if !a.is_strict_zero() {
                adjoints[stmt.lhs_index as usize] = S::zero();
                let start = self.statements[i - 1].end_plus_one as usize;
                let end = stmt.end_plus_one as usize;
                for j in start..end {
                    adjoints[self.indices[j] as usize] += self.multipliers[j] * a;
                }
            }
        }
        adjoints
    }
}

// Thread-local active tape pointers, one per scalar type the second-order
// strategies instantiate.
thread_local! {
    static TAPE_F64: Cell<*mut Tape<f64>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_DUAL_F64: Cell<*mut Tape<Dual<f64>>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_REV_F64: Cell<*mut Tape<Reverse<f64>>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Selects the thread-local active-tape cell for a given scalar type.
///
/// Implemented for `f64` (first order), `Dual<f64>` (forward-over-reverse),
/// and `Reverse<f64>` (reverse-over-reverse). Tapes over distinct scalar
/// types can be active simultaneously, which is what nesting relies on.
pub trait TapeThreadLocal: Scalar {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>>;
}

impl TapeThreadLocal for f64 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F64
    }
}

impl TapeThreadLocal for Dual<f64> {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_DUAL_F64
    }
}

impl TapeThreadLocal for Reverse<f64> {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_REV_F64
    }
}

/// Access the active tape for the current thread. Panics if none is active.
#[inline]
pub fn with_active_tape<S: TapeThreadLocal, R>(f: impl FnOnce(&mut Tape<S>) -> R) -> R {
    S::cell().with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "no active tape for this scalar type; use the diff:: entry points"
        );
        // SAFETY: TapeGuard keeps the pointer valid for the duration of the
        // closure-based API scope, and the thread-local guarantees a single
        // mutable reference at a time.
        let tape = unsafe { &mut *ptr };
        f(tape)
    })
}

/// RAII guard that installs a tape as the thread-local active tape and
/// restores the previous one on drop, including on unwind.
pub struct TapeGuard<S: TapeThreadLocal> {
    prev: *mut Tape<S>,
}

impl<S: TapeThreadLocal> TapeGuard<S> {
    pub fn new(tape: &mut Tape<S>) -> Self {
        let prev = S::cell().with(|cell| {
            let prev = cell.get();
            cell.set(tape as *mut Tape<S>);
            prev
        });
        TapeGuard { prev }
    }
}

impl<S: TapeThreadLocal> Drop for TapeGuard<S> {
    fn drop(&mut self) {
        S::cell().with(|cell| {
            cell.set(self.prev);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_accumulates_fanout() {
        // y = x + x: adjoint of x must be 2.
        let mut tape = Tape::<f64>::new();
        let x = tape.new_variable();
        let y = tape.push_binary(x, 1.0, x, 1.0);
        let adjoints = tape.reverse(y);
        assert!((adjoints[x as usize] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn constants_are_not_recorded() {
        let mut tape = Tape::<f64>::new();
        let x = tape.new_variable();
        // y = c * x with c constant: only one multiplier recorded.
        let y = tape.push_binary(CONSTANT, 0.0, x, 3.0);
        let adjoints = tape.reverse(y);
        assert!((adjoints[x as usize] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn tracked_zero_adjoint_still_propagates() {
        // Dual adjoint with zero primal but nonzero tangent must not be
        // skipped by the dead-adjoint test.
        let mut tape = Tape::<Dual<f64>>::new();
        let x = tape.new_variable();
        let y = tape.push_unary(x, Dual::constant(5.0));
        let seed = Dual::new(0.0, 1.0);
        let adjoints = tape.reverse_seeded(&[(y, seed)]);
        assert!((adjoints[x as usize].eps - 5.0).abs() < 1e-12);
    }

    #[test]
    fn guard_restores_previous_tape() {
        let mut outer = Tape::<f64>::new();
        {
            let _g1 = TapeGuard::new(&mut outer);
            let mut inner = Tape::<f64>::new();
            {
                let _g2 = TapeGuard::new(&mut inner);
                with_active_tape::<f64, _>(|t| {
                    t.new_variable();
                });
            }
            // Back to the outer tape.
            with_active_tape::<f64, _>(|t| {
                assert_eq!(t.num_variables, 0);
            });
        }
    }
}
