//! Dense linear algebra kernels: LU with partial pivoting and a
//! Jacobi-preconditioned BiCGStab.
//!
//! Matrices are row-major flat slices. These kernels are deliberately plain;
//! the pipeline's solves all go through [`crate::operator::JacobianOperator`],
//! which owns orientation and factorization caching.

use crate::error::SolveFailure;

#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Row-major dense matrix-vector product.
pub fn matvec(a: &[f64], n: usize, x: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), n * n);
    assert_eq!(x.len(), n);
    (0..n).map(|i| dot(&a[i * n..(i + 1) * n], x)).collect()
}

/// LU factorization with partial pivoting, stored packed in one buffer.
#[derive(Clone, Debug)]
pub struct LuFactors {
    n: usize,
    lu: Vec<f64>,
    pivots: Vec<usize>,
}

/// Factor a dense `n × n` row-major matrix. Returns `None` when a pivot
/// column is zero to working precision.
pub fn lu_factor(a: &[f64], n: usize) -> Option<LuFactors> {
    assert_eq!(a.len(), n * n);
    let mut lu = a.to_vec();
    let mut pivots = vec![0usize; n];

    for col in 0..n {
        // Partial pivoting on the largest remaining entry in this column.
        let mut pivot_row = col;
        let mut pivot_val = lu[col * n + col].abs();
        for row in (col + 1)..n {
            let v = lu[row * n + col].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = row;
            }
        }
        if pivot_val < f64::EPSILON * (n as f64) {
            return None;
        }
        pivots[col] = pivot_row;
        if pivot_row != col {
            for k in 0..n {
                lu.swap(col * n + k, pivot_row * n + k);
            }
        }

        let inv_pivot = 1.0 / lu[col * n + col];
        for row in (col + 1)..n {
            let factor = lu[row * n + col] * inv_pivot;
            lu[row * n + col] = factor;
            for k in (col + 1)..n {
                lu[row * n + k] -= factor * lu[col * n + k];
            }
        }
    }
    Some(LuFactors { n, lu, pivots })
}

impl LuFactors {
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve `A x = b` through the stored factors.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        assert_eq!(b.len(), n);
        let mut x = b.to_vec();

        for col in 0..n {
            x.swap(col, self.pivots[col]);
        }
        // Forward substitution with unit-diagonal L.
        for row in 1..n {
            let mut sum = x[row];
            for k in 0..row {
                sum -= self.lu[row * n + k] * x[k];
            }
            x[row] = sum;
        }
        // Back substitution with U.
        for row in (0..n).rev() {
            let mut sum = x[row];
            for k in (row + 1)..n {
                sum -= self.lu[row * n + k] * x[k];
            }
            x[row] = sum / self.lu[row * n + row];
        }
        x
    }
}

/// Solver selection for the pipeline's linear systems.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveMethod {
    /// Dense LU with partial pivoting; factors are cached by the operator.
    Direct,
    /// Preconditioned BiCGStab.
    BiCgStab,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Preconditioner {
    Identity,
    Jacobi,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearSolverOptions {
    pub method: SolveMethod,
    /// Relative residual tolerance for the iterative method.
    pub tol: f64,
    pub max_iter: usize,
    pub preconditioner: Preconditioner,
}

impl Default for LinearSolverOptions {
    fn default() -> Self {
        LinearSolverOptions {
            method: SolveMethod::Direct,
            tol: 1e-10,
            max_iter: 1000,
            preconditioner: Preconditioner::Jacobi,
        }
    }
}

/// Preconditioned BiCGStab for `A x = b`, with `A` given as a closure and the
/// preconditioner as an approximate inverse application.
pub fn bicgstab(
    apply: impl Fn(&[f64]) -> Vec<f64>,
    precond: impl Fn(&[f64]) -> Vec<f64>,
    b: &[f64],
    x0: &[f64],
    tol: f64,
    max_iter: usize,
) -> Result<Vec<f64>, SolveFailure> {
    let n = b.len();
    let b_norm = norm(b).max(f64::MIN_POSITIVE);
    let threshold = tol * b_norm;

    let mut x = x0.to_vec();
    let ax = apply(&x);
    let mut r: Vec<f64> = b.iter().zip(ax.iter()).map(|(bi, axi)| bi - axi).collect();
    if norm(&r) <= threshold {
        return Ok(x);
    }
    let r_hat = r.clone();

    let mut rho = 1.0;
    let mut alpha = 1.0;
    let mut omega = 1.0;
    let mut v = vec![0.0; n];
    let mut p = vec![0.0; n];

    for _ in 0..max_iter {
        let rho_next = dot(&r_hat, &r);
        if rho_next.abs() < f64::MIN_POSITIVE {
            return Err(SolveFailure::NotConverged);
        }
        let beta = (rho_next / rho) * (alpha / omega);
        for i in 0..n {
            p[i] = r[i] + beta * (p[i] - omega * v[i]);
        }
        let p_hat = precond(&p);
        v = apply(&p_hat);
        let denom = dot(&r_hat, &v);
        if denom.abs() < f64::MIN_POSITIVE {
            return Err(SolveFailure::NotConverged);
        }
        alpha = rho_next / denom;

        let s: Vec<f64> = r.iter().zip(v.iter()).map(|(ri, vi)| ri - alpha * vi).collect();
        if norm(&s) <= threshold {
            for i in 0..n {
                x[i] += alpha * p_hat[i];
            }
            return Ok(x);
        }

        let s_hat = precond(&s);
        let t = apply(&s_hat);
        let tt = dot(&t, &t);
        if tt < f64::MIN_POSITIVE {
            return Err(SolveFailure::NotConverged);
        }
        omega = dot(&t, &s) / tt;
        for i in 0..n {
            x[i] += alpha * p_hat[i] + omega * s_hat[i];
        }
        r = s.iter().zip(t.iter()).map(|(si, ti)| si - omega * ti).collect();
        if norm(&r) <= threshold {
            return Ok(x);
        }
        rho = rho_next;
    }
    Err(SolveFailure::NotConverged)
}

/// Jacobi preconditioner built from the matrix diagonal. Zero diagonal
/// entries fall back to the identity on that row.
pub fn jacobi_inverse_diagonal(a: &[f64], n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let d = a[i * n + i];
            if d.abs() < f64::MIN_POSITIVE {
                1.0
            } else {
                1.0 / d
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_matrix() -> (Vec<f64>, usize) {
        // Diagonally dominant, well conditioned.
        let a = vec![
            4.0, 1.0, 0.0, //
            1.0, 5.0, 2.0, //
            0.0, 2.0, 6.0,
        ];
        (a, 3)
    }

    #[test]
    fn lu_reproduces_rhs() {
        let (a, n) = toy_matrix();
        let x_true = vec![1.0, -2.0, 0.5];
        let b = matvec(&a, n, &x_true);
        let lu = lu_factor(&a, n).unwrap();
        let x = lu.solve(&b);
        for (xi, ti) in x.iter().zip(x_true.iter()) {
            assert!((xi - ti).abs() < 1e-12);
        }
    }

    #[test]
    fn lu_rejects_singular_matrix() {
        let a = vec![
            1.0, 2.0, //
            2.0, 4.0,
        ];
        assert!(lu_factor(&a, 2).is_none());
    }

    #[test]
    fn pivoting_handles_zero_leading_entry() {
        let a = vec![
            0.0, 1.0, //
            1.0, 0.0,
        ];
        let lu = lu_factor(&a, 2).unwrap();
        let x = lu.solve(&[3.0, 7.0]);
        assert!((x[0] - 7.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn bicgstab_matches_direct_solve() {
        let (a, n) = toy_matrix();
        let x_true = vec![0.3, 1.7, -0.9];
        let b = matvec(&a, n, &x_true);
        let inv_diag = jacobi_inverse_diagonal(&a, n);
        let x = bicgstab(
            |v| matvec(&a, n, v),
            |v| v.iter().zip(inv_diag.iter()).map(|(vi, di)| vi * di).collect(),
            &b,
            &vec![0.0; n],
            1e-12,
            200,
        )
        .unwrap();
        for (xi, ti) in x.iter().zip(x_true.iter()) {
            assert!((xi - ti).abs() < 1e-9);
        }
    }

    #[test]
    fn bicgstab_reports_budget_exhaustion() {
        let (a, n) = toy_matrix();
        let b = vec![1.0, 1.0, 1.0];
        let err = bicgstab(
            |v| matvec(&a, n, v),
            |v| v.to_vec(),
            &b,
            &vec![0.0; n],
            1e-14,
            1,
        )
        .unwrap_err();
        assert_eq!(err, SolveFailure::NotConverged);
    }
}
