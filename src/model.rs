//! The problem contract: discretized residuals and objectives.

use std::sync::Arc;

use crate::container::Layout;
use crate::scalar::Scalar;

/// A discretized constraint `F(u, θ) = 0` over flattened state and
/// parameters.
///
/// The residual is a pure function of both arguments and must be written
/// generically over [`Scalar`]; that single definition is what every
/// first- and second-order derivative in the pipeline evaluates through.
/// Boundary conditions are part of the residual (see [`DirichletBc`]).
pub trait ResidualModel {
    fn state_layout(&self) -> Arc<Layout>;
    fn param_layout(&self) -> Arc<Layout>;

    /// Evaluate `F(u, θ)`. Output length equals the state length.
    fn residual<S: Scalar>(&self, u: &[S], theta: &[S]) -> Vec<S>;
}

/// A scalar objective `J(u, θ)`, also generic over [`Scalar`].
pub trait Objective {
    fn eval<S: Scalar>(&self, u: &[S], theta: &[S]) -> S;
}

/// Pins selected state entries to fixed values by replacing the matching
/// residual rows with `u[d] − value`.
///
/// The replacement rows are affine in `u` and independent of `θ`, so the
/// constrained rows contribute nothing to the parameter pullbacks.
pub struct DirichletBc<M> {
    inner: M,
    pins: Vec<(usize, f64)>,
}

impl<M: ResidualModel> DirichletBc<M> {
    pub fn new(inner: M, pins: Vec<(usize, f64)>) -> Self {
        let n = inner.state_layout().len();
        for &(dof, _) in &pins {
            assert!(dof < n, "pinned dof {dof} out of range");
        }
        DirichletBc { inner, pins }
    }
}

impl<M: ResidualModel> ResidualModel for DirichletBc<M> {
    fn state_layout(&self) -> Arc<Layout> {
        self.inner.state_layout()
    }

    fn param_layout(&self) -> Arc<Layout> {
        self.inner.param_layout()
    }

    fn residual<S: Scalar>(&self, u: &[S], theta: &[S]) -> Vec<S> {
        let mut r = self.inner.residual(u, theta);
        for &(dof, value) in &self.pins {
            r[dof] = u[dof] - S::from_f64(value);
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Layout;

    struct Springs;

    impl ResidualModel for Springs {
        fn state_layout(&self) -> Arc<Layout> {
            Layout::flat(3)
        }
        fn param_layout(&self) -> Arc<Layout> {
            Layout::flat(3)
        }
        fn residual<S: Scalar>(&self, u: &[S], theta: &[S]) -> Vec<S> {
            u.iter()
                .zip(theta.iter())
                .map(|(&ui, &ti)| ui * ti - S::one())
                .collect()
        }
    }

    #[test]
    fn dirichlet_rows_replace_the_residual() {
        let model = DirichletBc::new(Springs, vec![(1, 2.5)]);
        let u = [1.0, 4.0, 3.0];
        let theta = [2.0, 2.0, 2.0];
        let r = model.residual(&u, &theta);
        assert!((r[0] - 1.0).abs() < 1e-12);
        assert!((r[1] - 1.5).abs() < 1e-12);
        assert!((r[2] - 5.0).abs() < 1e-12);
    }
}
