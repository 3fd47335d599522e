//! Adjoint-based second-order sensitivities for PDE-constrained optimization.
//!
//! Given a discretized constraint `F(u, θ) = 0` and an objective `J(u, θ)`,
//! this crate computes exact Hessian-vector products of the reduced objective
//! `θ ↦ J(u(θ), θ)` through a forward solve, an adjoint solve, an incremental
//! forward solve and an incremental adjoint solve, at the cost of a handful
//! of linear systems with the state Jacobian `∂F/∂u`.
//!
//! Models are written once, generically over [`Scalar`], and differentiated
//! to second order by type-level nesting of [`Dual`] tangents and [`Reverse`]
//! tape variables. Three equivalent nesting orders are available as
//! [`SecondOrderStrategy`].
//!
//! ```
//! use platypus::{Container, HvpOptions, Layout, Objective, ResidualModel, Scalar};
//! use std::sync::Arc;
//!
//! struct Poisson1d;
//!
//! impl ResidualModel for Poisson1d {
//!     fn state_layout(&self) -> Arc<Layout> { Layout::flat(4) }
//!     fn param_layout(&self) -> Arc<Layout> { Layout::flat(4) }
//!     fn residual<S: Scalar>(&self, u: &[S], theta: &[S]) -> Vec<S> {
//!         let two = S::from_f64(2.0);
//!         (0..4)
//!             .map(|i| {
//!                 let left = if i > 0 { u[i - 1] } else { S::zero() };
//!                 let right = if i < 3 { u[i + 1] } else { S::zero() };
//!                 two * u[i] - left - right - theta[i]
//!             })
//!             .collect()
//!     }
//! }
//!
//! struct Compliance;
//!
//! impl Objective for Compliance {
//!     fn eval<S: Scalar>(&self, u: &[S], theta: &[S]) -> S {
//!         u.iter().zip(theta.iter()).map(|(&ui, &ti)| ui * ti).fold(S::zero(), |a, b| a + b)
//!     }
//! }
//!
//! let layout = Layout::flat(4);
//! let theta = Container::from_flat(&layout, vec![1.0; 4]);
//! let theta_hat = Container::from_flat(&layout, vec![0.0, 1.0, 0.0, 0.0]);
//! let (hvp, _profile) = platypus::hvp(
//!     &Poisson1d, &Compliance, &theta, &theta_hat, &HvpOptions::default(),
//! ).unwrap();
//! assert_eq!(hvp.flatten().len(), 4);
//! ```

pub mod container;
pub mod diff;
pub mod dual;
pub mod engine;
pub mod error;
pub mod linalg;
pub mod model;
pub mod newton;
pub mod operator;
pub mod reverse;
pub mod scalar;
pub mod strategy;
pub mod tape;

pub use container::{l2_norm_error, Container, Field, Layout};
pub use dual::Dual;
pub use engine::{
    adjoint_step, forward_and_adjoint, forward_step, hvp, incremental_forward_and_adjoint,
    incremental_forward_step, reduced_gradient, HvpOptions,
};
pub use error::{Error, Result, SolveFailure, Stage};
pub use linalg::{LinearSolverOptions, Preconditioner, SolveMethod};
pub use model::{DirichletBc, Objective, ResidualModel};
pub use newton::{ArmijoParams, NewtonOptions, StepStrategy};
pub use operator::{JacobianOperator, TransposedJacobian};
pub use reverse::Reverse;
pub use scalar::Scalar;
pub use strategy::{HvpProfile, MixedPartials, SecondOrderStrategy};
