//! Free-function differentiation operators: gradients, pushforwards and
//! pullbacks over slices.
//!
//! Each operator is generic over the base scalar, so they compose into
//! second-order evaluations by instantiation: `grad::<Dual<f64>>` sweeps a
//! tape whose adjoints carry tangents, `vjp::<Reverse<f64>>` sweeps an inner
//! tape whose arithmetic records onto the enclosing one, and a `Dual<Reverse>`
//! tangent inside `grad::<f64>` differentiates a directional derivative.

use crate::dual::Dual;
use crate::reverse::Reverse;
use crate::scalar::Scalar;
use crate::tape::{Tape, TapeGuard, TapeThreadLocal, CONSTANT};

/// Gradient of a scalar-valued function at `x`.
///
/// If the output never touches the inputs, the gradient is identically zero.
pub fn grad<S: TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<S>]) -> Reverse<S>,
    x: &[S],
) -> Vec<S> {
    let mut tape = Tape::<S>::with_capacity(x.len() * 4);
    let _guard = TapeGuard::new(&mut tape);

    let inputs: Vec<Reverse<S>> = x.iter().map(|&xi| Reverse::variable(xi)).collect();
    let output = f(&inputs);

    if output.index == CONSTANT {
        return vec![S::zero(); x.len()];
    }
    let adjoints = crate::tape::with_active_tape::<S, _>(|t| t.reverse(output.index));
    inputs
        .iter()
        .map(|v| adjoints[v.index as usize])
        .collect()
}

/// Vector-Jacobian product: `wᵀ · ∂f/∂x` for a vector-valued `f`.
pub fn vjp<S: TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<S>]) -> Vec<Reverse<S>>,
    x: &[S],
    w: &[S],
) -> Vec<S> {
    let mut tape = Tape::<S>::with_capacity(x.len() * 4);
    let _guard = TapeGuard::new(&mut tape);

    let inputs: Vec<Reverse<S>> = x.iter().map(|&xi| Reverse::variable(xi)).collect();
    let outputs = f(&inputs);
    assert_eq!(outputs.len(), w.len(), "weight length mismatch");

    let seeds: Vec<(u32, S)> = outputs
        .iter()
        .zip(w.iter())
        .filter(|(out, _)| out.index != CONSTANT)
        .map(|(out, &wi)| (out.index, wi))
        .collect();
    if seeds.is_empty() {
        return vec![S::zero(); x.len()];
    }
    let adjoints = crate::tape::with_active_tape::<S, _>(|t| t.reverse_seeded(&seeds));
    inputs
        .iter()
        .map(|v| adjoints[v.index as usize])
        .collect()
}

/// Jacobian-vector product: `∂f/∂x · v` by one forward pass with duals.
pub fn jvp<S: Scalar>(
    f: impl FnOnce(&[Dual<S>]) -> Vec<Dual<S>>,
    x: &[S],
    v: &[S],
) -> Vec<S> {
    assert_eq!(x.len(), v.len(), "direction length mismatch");
    let inputs: Vec<Dual<S>> = x
        .iter()
        .zip(v.iter())
        .map(|(&xi, &vi)| Dual::new(xi, vi))
        .collect();
    f(&inputs).into_iter().map(|y| y.eps).collect()
}
