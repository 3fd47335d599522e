//! Damped Newton solver for the forward problem `F(u, θ) = 0`.

use log::debug;

use crate::error::{Error, Result, Stage};
use crate::linalg::{norm, LinearSolverOptions};
use crate::model::ResidualModel;
use crate::operator::JacobianOperator;

/// Armijo backtracking parameters for the merit function `½‖F‖²`.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArmijoParams {
    /// Sufficient-decrease constant.
    pub c: f64,
    /// Backtracking shrink factor.
    pub rho: f64,
    pub alpha_init: f64,
    /// Smallest step before the search is declared stalled.
    pub alpha_min: f64,
}

impl Default for ArmijoParams {
    fn default() -> Self {
        ArmijoParams {
            c: 1e-4,
            rho: 0.5,
            alpha_init: 1.0,
            alpha_min: 1e-12,
        }
    }
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StepStrategy {
    FullStep,
    LineSearch(ArmijoParams),
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewtonOptions {
    /// Residual norm below which the solve is converged.
    pub tol: f64,
    pub max_iter: usize,
    pub step: StepStrategy,
    pub linear: LinearSolverOptions,
}

impl Default for NewtonOptions {
    fn default() -> Self {
        NewtonOptions {
            tol: 1e-10,
            max_iter: 50,
            step: StepStrategy::LineSearch(ArmijoParams::default()),
            linear: LinearSolverOptions::default(),
        }
    }
}

/// Solve `F(u, θ) = 0` by Newton's method starting from `u0`.
pub fn solve<M: ResidualModel>(
    model: &M,
    theta: &[f64],
    u0: &[f64],
    options: &NewtonOptions,
) -> Result<Vec<f64>> {
    let mut u = u0.to_vec();
    let mut residual = model.residual(&u, theta);
    let mut residual_norm = norm(&residual);

    for iteration in 0..options.max_iter {
        if residual_norm <= options.tol {
            debug!(
                "[forward] converged after {iteration} iterations, residual {residual_norm:.3e}"
            );
            return Ok(u);
        }

        let mut op = JacobianOperator::assemble(model, &u, theta);
        let rhs: Vec<f64> = residual.iter().map(|r| -r).collect();
        let direction = op.solve(&rhs, &options.linear).map_err(|source| {
            Error::LinearSolveFailure {
                stage: Stage::Forward,
                source,
            }
        })?;

        match options.step {
            StepStrategy::FullStep => {
                for (ui, di) in u.iter_mut().zip(direction.iter()) {
                    *ui += di;
                }
                residual = model.residual(&u, theta);
                residual_norm = norm(&residual);
            }
            StepStrategy::LineSearch(params) => {
                // Along the Newton direction the merit slope at zero is
                // exactly -‖F‖².
                let merit = 0.5 * residual_norm * residual_norm;
                let slope = -residual_norm * residual_norm;
                let mut alpha = params.alpha_init;
                loop {
                    let trial: Vec<f64> = u
                        .iter()
                        .zip(direction.iter())
                        .map(|(ui, di)| ui + alpha * di)
                        .collect();
                    let trial_residual = model.residual(&trial, theta);
                    let trial_norm = norm(&trial_residual);
                    if 0.5 * trial_norm * trial_norm <= merit + params.c * alpha * slope {
                        u = trial;
                        residual = trial_residual;
                        residual_norm = trial_norm;
                        break;
                    }
                    alpha *= params.rho;
                    if alpha < params.alpha_min {
                        debug!(
                            "[forward] line search stalled at iteration {iteration}, \
                             residual {residual_norm:.3e}"
                        );
                        return Err(Error::ConvergenceFailure {
                            stage: Stage::Forward,
                            iterations: iteration,
                            residual_norm,
                        });
                    }
                }
            }
        }
        debug!("[forward] iteration {iteration}: residual {residual_norm:.3e}");
    }

    if residual_norm <= options.tol {
        return Ok(u);
    }
    Err(Error::ConvergenceFailure {
        stage: Stage::Forward,
        iterations: options.max_iter,
        residual_norm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Layout;
    use crate::scalar::Scalar;
    use std::sync::Arc;

    struct Cubic;

    impl ResidualModel for Cubic {
        fn state_layout(&self) -> Arc<Layout> {
            Layout::flat(2)
        }
        fn param_layout(&self) -> Arc<Layout> {
            Layout::flat(2)
        }
        fn residual<S: Scalar>(&self, u: &[S], theta: &[S]) -> Vec<S> {
            // u_i³ + u_i = θ_i, monotone with a unique root.
            u.iter()
                .zip(theta.iter())
                .map(|(&ui, &ti)| ui * ui * ui + ui - ti)
                .collect()
        }
    }

    #[test]
    fn converges_on_monotone_cubic() {
        let theta = [2.0, 10.0];
        let u = solve(&Cubic, &theta, &[0.0, 0.0], &NewtonOptions::default()).unwrap();
        // Roots of x³ + x = 2 and x³ + x = 10.
        assert!((u[0] - 1.0).abs() < 1e-9);
        assert!((u[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn full_step_matches_line_search_on_mild_problem() {
        let theta = [2.0, 2.0];
        let opts = NewtonOptions {
            step: StepStrategy::FullStep,
            ..NewtonOptions::default()
        };
        let u = solve(&Cubic, &theta, &[0.5, 0.5], &opts).unwrap();
        assert!((u[0] - 1.0).abs() < 1e-9);
        assert!((u[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn budget_exhaustion_is_a_forward_convergence_failure() {
        let opts = NewtonOptions {
            max_iter: 1,
            tol: 1e-14,
            ..NewtonOptions::default()
        };
        let err = solve(&Cubic, &[2.0, 10.0], &[0.0, 0.0], &opts).unwrap_err();
        match err {
            Error::ConvergenceFailure { stage, .. } => assert_eq!(stage, Stage::Forward),
            other => panic!("unexpected error: {other}"),
        }
    }
}
