//! The four-solve sensitivity pipeline and its one-shot driver.
//!
//! For an objective `J(u, θ)` constrained by `F(u, θ) = 0`:
//!
//! 1. forward: solve `F(u, θ) = 0` for `u`,
//! 2. adjoint: solve `Aᵀ λ = −∂J/∂u` with `A = ∂F/∂u`,
//! 3. incremental forward: solve `A û = −(∂F/∂θ) θ̂`,
//! 4. incremental adjoint: evaluate the eight curvature contractions, solve
//!    `Aᵀ λ̂ = −(t1 + t2 + t5 + t6)`, and assemble
//!    `HVP = t3 + t4 + t7 + t8 + λ̂ᵢ ∂Fᵢ/∂θ`.
//!
//! `A` is assembled once in step 2 and reused by steps 3 and 4.

use log::debug;

use crate::container::Container;
use crate::diff::{grad, jvp, vjp};
use crate::dual::Dual;
use crate::error::{Error, Result, Stage};
use crate::linalg::LinearSolverOptions;
use crate::model::{Objective, ResidualModel};
use crate::newton::{self, NewtonOptions};
use crate::operator::JacobianOperator;
use crate::reverse::Reverse;
use crate::strategy::{self, HvpProfile, SecondOrderStrategy};

/// Options for the one-shot [`hvp`] driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct HvpOptions {
    pub newton: NewtonOptions,
    /// Linear solver for the incremental forward solve.
    pub state_solver: LinearSolverOptions,
    /// Linear solver for the two transposed solves.
    pub adjoint_solver: LinearSolverOptions,
    pub strategy: SecondOrderStrategy,
}

fn joint(u: &[f64], theta: &[f64]) -> Vec<f64> {
    u.iter().chain(theta.iter()).copied().collect()
}

/// Gradient of the objective over the concatenated `(u, θ)` point.
fn objective_gradient<O: Objective>(obj: &O, u: &[f64], theta: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = u.len();
    let g = grad(
        |v: &[Reverse<f64>]| obj.eval(&v[..n], &v[n..]),
        &joint(u, theta),
    );
    let theta_part = g[n..].to_vec();
    let mut u_part = g;
    u_part.truncate(n);
    (u_part, theta_part)
}

/// Pullback of the residual along `w` over the concatenated `(u, θ)` point.
fn residual_pullback<M: ResidualModel>(
    model: &M,
    u: &[f64],
    theta: &[f64],
    w: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let n = u.len();
    let g = vjp(
        |v: &[Reverse<f64>]| model.residual(&v[..n], &v[n..]),
        &joint(u, theta),
        w,
    );
    let theta_part = g[n..].to_vec();
    let mut u_part = g;
    u_part.truncate(n);
    (u_part, theta_part)
}

/// Solve the forward problem from a zero initial state.
///
/// A parameter container whose length does not match the model's parameter
/// layout is reported as [`Error::UnsupportedOption`].
pub fn forward_step<M: ResidualModel>(
    model: &M,
    theta: &Container,
    options: &NewtonOptions,
) -> Result<Container> {
    let state_layout = model.state_layout();
    let expected = model.param_layout().len();
    if theta.flatten().len() != expected {
        return Err(Error::UnsupportedOption(format!(
            "parameter container has length {}, model expects {expected}",
            theta.flatten().len()
        )));
    }
    debug!("[forward] solving state, dim {}", state_layout.len());
    let u0 = vec![0.0; state_layout.len()];
    let u = newton::solve(model, theta.flatten(), &u0, options)?;
    Ok(Container::from_flat(&state_layout, u))
}

/// Solve `Aᵀ λ = −∂J/∂u` and return `λ` together with the assembled
/// operator for reuse by the incremental solves.
pub fn adjoint_step<M: ResidualModel, O: Objective>(
    model: &M,
    obj: &O,
    u: &Container,
    theta: &Container,
    options: &LinearSolverOptions,
) -> Result<(Container, JacobianOperator)> {
    let (dj_du, _) = objective_gradient(obj, u.flatten(), theta.flatten());
    let rhs: Vec<f64> = dj_du.iter().map(|g| -g).collect();

    let mut a = JacobianOperator::assemble(model, u.flatten(), theta.flatten());
    debug!("[adjoint] solving transposed system, dim {}", a.dim());
    let lam = a
        .solve_transposed(&rhs, options)
        .map_err(|source| Error::LinearSolveFailure {
            stage: Stage::Adjoint,
            source,
        })?;
    Ok((Container::from_flat(&model.state_layout(), lam), a))
}

/// Forward solve followed by the adjoint solve.
pub fn forward_and_adjoint<M: ResidualModel, O: Objective>(
    model: &M,
    obj: &O,
    theta: &Container,
    newton_options: &NewtonOptions,
    adjoint_options: &LinearSolverOptions,
) -> Result<(Container, Container, JacobianOperator)> {
    let u = forward_step(model, theta, newton_options)?;
    let (lam, a) = adjoint_step(model, obj, &u, theta, adjoint_options)?;
    Ok((u, lam, a))
}

/// Solve `A û = −(∂F/∂θ) θ̂` for the state perturbation `û`.
pub fn incremental_forward_step<M: ResidualModel>(
    model: &M,
    u: &Container,
    theta: &Container,
    theta_hat: &Container,
    a: &mut JacobianOperator,
    options: &LinearSolverOptions,
) -> Result<Container> {
    let n = u.flatten().len();
    let direction: Vec<f64> = vec![0.0; n]
        .into_iter()
        .chain(theta_hat.flatten().iter().copied())
        .collect();
    let df_dtheta_that = jvp(
        |v: &[Dual<f64>]| model.residual(&v[..n], &v[n..]),
        &joint(u.flatten(), theta.flatten()),
        &direction,
    );
    let rhs: Vec<f64> = df_dtheta_that.iter().map(|x| -x).collect();

    debug!("[incremental-forward] solving system, dim {}", a.dim());
    let u_hat = a
        .solve(&rhs, options)
        .map_err(|source| Error::LinearSolveFailure {
            stage: Stage::IncrementalForward,
            source,
        })?;
    Ok(Container::from_flat(&model.state_layout(), u_hat))
}

/// Incremental forward solve, curvature contractions, second adjoint solve,
/// and final assembly of the Hessian-vector product.
#[allow(clippy::too_many_arguments)]
pub fn incremental_forward_and_adjoint<M: ResidualModel, O: Objective>(
    model: &M,
    obj: &O,
    u: &Container,
    theta: &Container,
    lam: &Container,
    theta_hat: &Container,
    a: &mut JacobianOperator,
    strategy: SecondOrderStrategy,
    state_options: &LinearSolverOptions,
    adjoint_options: &LinearSolverOptions,
) -> Result<(Container, HvpProfile)> {
    let u_hat = incremental_forward_step(model, u, theta, theta_hat, a, state_options)?;

    let (partials, profile) = strategy::evaluate(
        strategy,
        model,
        obj,
        u.flatten(),
        theta.flatten(),
        lam.flatten(),
        u_hat.flatten(),
        theta_hat.flatten(),
    );

    let rhs: Vec<f64> = partials.state_shaped_sum().iter().map(|x| -x).collect();
    debug!("[incremental-adjoint] solving transposed system, dim {}", a.dim());
    let lam_hat = a
        .solve_transposed(&rhs, adjoint_options)
        .map_err(|source| Error::LinearSolveFailure {
            stage: Stage::IncrementalAdjoint,
            source,
        })?;

    let (_, pullback_theta) = residual_pullback(model, u.flatten(), theta.flatten(), &lam_hat);
    let hvp_flat: Vec<f64> = partials
        .param_shaped_sum()
        .iter()
        .zip(pullback_theta.iter())
        .map(|(p, q)| p + q)
        .collect();

    Ok((
        Container::from_flat(&model.param_layout(), hvp_flat),
        profile,
    ))
}

/// One-shot driver: forward, adjoint, incremental forward, incremental
/// adjoint, assembly.
pub fn hvp<M: ResidualModel, O: Objective>(
    model: &M,
    obj: &O,
    theta: &Container,
    theta_hat: &Container,
    options: &HvpOptions,
) -> Result<(Container, HvpProfile)> {
    let (u, lam, mut a) = forward_and_adjoint(
        model,
        obj,
        theta,
        &options.newton,
        &options.adjoint_solver,
    )?;
    incremental_forward_and_adjoint(
        model,
        obj,
        &u,
        theta,
        &lam,
        theta_hat,
        &mut a,
        options.strategy,
        &options.state_solver,
        &options.adjoint_solver,
    )
}

/// First-order reduced gradient `dJ/dθ = ∂J/∂θ + λᵢ ∂Fᵢ/∂θ`.
pub fn reduced_gradient<M: ResidualModel, O: Objective>(
    model: &M,
    obj: &O,
    u: &Container,
    theta: &Container,
    lam: &Container,
) -> Container {
    let (_, dj_dtheta) = objective_gradient(obj, u.flatten(), theta.flatten());
    let (_, pf_theta) = residual_pullback(model, u.flatten(), theta.flatten(), lam.flatten());
    let g: Vec<f64> = dj_dtheta
        .iter()
        .zip(pf_theta.iter())
        .map(|(a, b)| a + b)
        .collect();
    Container::from_flat(&model.param_layout(), g)
}
