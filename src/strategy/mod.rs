//! Second-order evaluation strategies.
//!
//! All three strategies compute the same eight mixed-partial contractions at
//! the point `(u, θ)` along the directions `(û, θ̂)` and the adjoint weights
//! `λ`; they differ only in how the two differentiation levels are nested.
//! Numerically they agree to linear-solve tolerance, so the choice is a
//! performance knob.

use std::str::FromStr;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::Error;
use crate::model::{Objective, ResidualModel};

mod fwd_rev;
mod rev_fwd;
mod rev_rev;

/// How to nest the two differentiation levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SecondOrderStrategy {
    /// Forward over reverse: one reverse sweep with tangent-carrying adjoints.
    #[default]
    FwdRev,
    /// Reverse over forward: reverse sweep of an inner directional derivative.
    RevFwd,
    /// Reverse over reverse: inner sweep recorded onto an outer tape.
    RevRev,
}

impl FromStr for SecondOrderStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "fwd_rev" => Ok(SecondOrderStrategy::FwdRev),
            "rev_fwd" => Ok(SecondOrderStrategy::RevFwd),
            "rev_rev" => Ok(SecondOrderStrategy::RevRev),
            other => Err(Error::UnsupportedOption(other.to_string())),
        }
    }
}

/// The eight second-order contractions.
///
/// State-shaped terms enter the right-hand side of the second adjoint solve;
/// parameter-shaped terms enter the final assembly directly.
#[derive(Clone, Debug)]
pub struct MixedPartials {
    /// `(∂²J/∂u∂u) û`
    pub t1: Vec<f64>,
    /// `(∂²J/∂u∂θ) θ̂`
    pub t2: Vec<f64>,
    /// `(∂²J/∂θ∂u) û`
    pub t3: Vec<f64>,
    /// `(∂²J/∂θ∂θ) θ̂`
    pub t4: Vec<f64>,
    /// `λᵢ (∂²Fᵢ/∂u∂u) û`
    pub t5: Vec<f64>,
    /// `λᵢ (∂²Fᵢ/∂u∂θ) θ̂`
    pub t6: Vec<f64>,
    /// `λᵢ (∂²Fᵢ/∂θ∂u) û`
    pub t7: Vec<f64>,
    /// `λᵢ (∂²Fᵢ/∂θ∂θ) θ̂`
    pub t8: Vec<f64>,
}

impl MixedPartials {
    /// Sum of the state-shaped terms `t1 + t2 + t5 + t6`.
    pub fn state_shaped_sum(&self) -> Vec<f64> {
        sum4(&self.t1, &self.t2, &self.t5, &self.t6)
    }

    /// Sum of the parameter-shaped terms `t3 + t4 + t7 + t8`.
    pub fn param_shaped_sum(&self) -> Vec<f64> {
        sum4(&self.t3, &self.t4, &self.t7, &self.t8)
    }
}

fn sum4(a: &[f64], b: &[f64], c: &[f64], d: &[f64]) -> Vec<f64> {
    (0..a.len()).map(|i| a[i] + b[i] + c[i] + d[i]).collect()
}

/// Wall-clock cost of the two second-order phases.
#[derive(Clone, Copy, Debug, Default)]
pub struct HvpProfile {
    /// Time spent in the objective curvature phase.
    pub j_time: Duration,
    /// Time spent in the constraint curvature phase.
    pub f_time: Duration,
}

/// Evaluate the eight contractions through the chosen strategy.
pub fn evaluate<M: ResidualModel, O: Objective>(
    strategy: SecondOrderStrategy,
    model: &M,
    obj: &O,
    u: &[f64],
    theta: &[f64],
    lam: &[f64],
    u_hat: &[f64],
    theta_hat: &[f64],
) -> (MixedPartials, HvpProfile) {
    let j_start = Instant::now();
    let [t1, t2, t3, t4] = match strategy {
        SecondOrderStrategy::FwdRev => {
            fwd_rev::objective_curvature(obj, u, theta, u_hat, theta_hat)
        }
        SecondOrderStrategy::RevFwd => {
            rev_fwd::objective_curvature(obj, u, theta, u_hat, theta_hat)
        }
        SecondOrderStrategy::RevRev => {
            rev_rev::objective_curvature(obj, u, theta, u_hat, theta_hat)
        }
    };
    let j_time = j_start.elapsed();

    let f_start = Instant::now();
    let [t5, t6, t7, t8] = match strategy {
        SecondOrderStrategy::FwdRev => {
            fwd_rev::constraint_curvature(model, u, theta, lam, u_hat, theta_hat)
        }
        SecondOrderStrategy::RevFwd => {
            rev_fwd::constraint_curvature(model, u, theta, lam, u_hat, theta_hat)
        }
        SecondOrderStrategy::RevRev => {
            rev_rev::constraint_curvature(model, u, theta, lam, u_hat, theta_hat)
        }
    };
    let f_time = f_start.elapsed();

    debug!(
        "[incremental-adjoint] {strategy:?} curvature phases: J {j_time:?}, F {f_time:?}"
    );

    (
        MixedPartials {
            t1,
            t2,
            t3,
            t4,
            t5,
            t6,
            t7,
            t8,
        },
        HvpProfile { j_time, f_time },
    )
}

/// Split a gradient over the concatenated `(u, θ)` input back into its
/// state-shaped and parameter-shaped halves.
fn split_joint_gradient(grad: Vec<f64>, n_state: usize) -> (Vec<f64>, Vec<f64>) {
    let theta_part = grad[n_state..].to_vec();
    let mut u_part = grad;
    u_part.truncate(n_state);
    (u_part, theta_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_parse() {
        assert_eq!(
            "fwd_rev".parse::<SecondOrderStrategy>().unwrap(),
            SecondOrderStrategy::FwdRev
        );
        assert_eq!(
            "rev_fwd".parse::<SecondOrderStrategy>().unwrap(),
            SecondOrderStrategy::RevFwd
        );
        assert_eq!(
            "rev_rev".parse::<SecondOrderStrategy>().unwrap(),
            SecondOrderStrategy::RevRev
        );
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = "rev_rev_rev".parse::<SecondOrderStrategy>().unwrap_err();
        match err {
            Error::UnsupportedOption(name) => assert_eq!(name, "rev_rev_rev"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
