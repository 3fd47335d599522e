//! The state Jacobian `A = ∂F/∂u` shared across the pipeline's linear solves.
//!
//! The operator is assembled once per outer point `(u, θ)` and then reused by
//! the adjoint, incremental-forward and incremental-adjoint solves. Transposed
//! products and solves go through an explicit [`transposed`](JacobianOperator::transposed)
//! view; the stored matrix is never flipped in place, so the operator reads
//! identically before and after any solve, including failing ones.

use crate::dual::Dual;
use crate::error::SolveFailure;
use crate::linalg::{
    self, bicgstab, jacobi_inverse_diagonal, lu_factor, LuFactors, LinearSolverOptions,
    Preconditioner, SolveMethod,
};
use crate::model::ResidualModel;

/// Dense `∂F/∂u`, row-major, with lazily cached LU factors for both
/// orientations.
#[derive(Debug)]
pub struct JacobianOperator {
    n: usize,
    a: Vec<f64>,
    lu: Option<LuFactors>,
    lu_transposed: Option<LuFactors>,
}

impl JacobianOperator {
    /// Assemble `∂F/∂u` at `(u, θ)` by one forward-mode sweep per column.
    pub fn assemble<M: ResidualModel>(model: &M, u: &[f64], theta: &[f64]) -> Self {
        let n = u.len();
        let theta_dual: Vec<Dual<f64>> = theta.iter().map(|&t| Dual::constant(t)).collect();
        let mut a = vec![0.0; n * n];

        let mut u_dual: Vec<Dual<f64>> = u.iter().map(|&v| Dual::constant(v)).collect();
        for col in 0..n {
            u_dual[col].eps = 1.0;
            let r = model.residual(&u_dual, &theta_dual);
            debug_assert_eq!(r.len(), n, "residual length mismatch");
            for (row, ri) in r.iter().enumerate() {
                a[row * n + col] = ri.eps;
            }
            u_dual[col].eps = 0.0;
        }

        JacobianOperator {
            n,
            a,
            lu: None,
            lu_transposed: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Row-major entries, for inspection.
    pub fn matrix(&self) -> &[f64] {
        &self.a
    }

    /// `A · x`.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        linalg::matvec(&self.a, self.n, x)
    }

    /// Read-only transposed view over the same storage.
    pub fn transposed(&self) -> TransposedJacobian<'_> {
        TransposedJacobian { op: self }
    }

    /// Solve `A x = b`.
    pub fn solve(
        &mut self,
        b: &[f64],
        options: &LinearSolverOptions,
    ) -> Result<Vec<f64>, SolveFailure> {
        self.solve_oriented(b, options, false)
    }

    /// Solve `Aᵀ x = b` without mutating the stored matrix.
    pub fn solve_transposed(
        &mut self,
        b: &[f64],
        options: &LinearSolverOptions,
    ) -> Result<Vec<f64>, SolveFailure> {
        self.solve_oriented(b, options, true)
    }

    fn solve_oriented(
        &mut self,
        b: &[f64],
        options: &LinearSolverOptions,
        transposed: bool,
    ) -> Result<Vec<f64>, SolveFailure> {
        match options.method {
            SolveMethod::Direct => {
                let cached = if transposed {
                    self.lu_transposed.take()
                } else {
                    self.lu.take()
                };
                let factors = match cached {
                    Some(f) => f,
                    None => {
                        let mat = if transposed {
                            transpose(&self.a, self.n)
                        } else {
                            self.a.clone()
                        };
                        lu_factor(&mat, self.n).ok_or(SolveFailure::Singular)?
                    }
                };
                let x = factors.solve(b);
                if transposed {
                    self.lu_transposed = Some(factors);
                } else {
                    self.lu = Some(factors);
                }
                Ok(x)
            }
            SolveMethod::BiCgStab => {
                // The Jacobi diagonal is orientation independent.
                let inv_diag = match options.preconditioner {
                    Preconditioner::Jacobi => jacobi_inverse_diagonal(&self.a, self.n),
                    Preconditioner::Identity => vec![1.0; self.n],
                };
                let precond = |v: &[f64]| -> Vec<f64> {
                    v.iter().zip(inv_diag.iter()).map(|(vi, di)| vi * di).collect()
                };
                let x0 = vec![0.0; self.n];
                if transposed {
                    let view = self.transposed();
                    bicgstab(
                        |v| view.apply(v),
                        precond,
                        b,
                        &x0,
                        options.tol,
                        options.max_iter,
                    )
                } else {
                    bicgstab(
                        |v| self.apply(v),
                        precond,
                        b,
                        &x0,
                        options.tol,
                        options.max_iter,
                    )
                }
            }
        }
    }
}

fn transpose(a: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            out[j * n + i] = a[i * n + j];
        }
    }
    out
}

/// Borrowed transposed view of a [`JacobianOperator`].
pub struct TransposedJacobian<'a> {
    op: &'a JacobianOperator,
}

impl TransposedJacobian<'_> {
    pub fn dim(&self) -> usize {
        self.op.n
    }

    /// `Aᵀ · x`.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        let n = self.op.n;
        assert_eq!(x.len(), n);
        let mut out = vec![0.0; n];
        for i in 0..n {
            let xi = x[i];
            if xi != 0.0 {
                for j in 0..n {
                    out[j] += self.op.a[i * n + j] * xi;
                }
            }
        }
        out
    }
}
