//! Reverse-over-forward: the inner pass computes a directional derivative
//! with dual numbers whose components live on an outer tape; the outer
//! reverse sweep then differentiates that scalar.

use crate::diff::grad;
use crate::dual::Dual;
use crate::model::{Objective, ResidualModel};
use crate::reverse::Reverse;
use crate::scalar::Scalar;

use super::split_joint_gradient;

/// Pair tracked primal values with a constant tangent direction.
fn seed(
    x: &[Reverse<f64>],
    direction: &[f64],
) -> Vec<Dual<Reverse<f64>>> {
    x.iter()
        .zip(direction.iter())
        .map(|(&xi, &di)| Dual::new(xi, Reverse::from_f64(di)))
        .collect()
}

pub(super) fn objective_curvature<O: Objective>(
    obj: &O,
    u: &[f64],
    theta: &[f64],
    u_hat: &[f64],
    theta_hat: &[f64],
) -> [Vec<f64>; 4] {
    let n = u.len();
    let zero_u = vec![0.0; n];
    let zero_t = vec![0.0; theta.len()];
    let joint: Vec<f64> = u.iter().chain(theta.iter()).copied().collect();

    let pass = |du: &[f64], dt: &[f64]| {
        let g = grad(
            |v: &[Reverse<f64>]| {
                let ud = seed(&v[..n], du);
                let td = seed(&v[n..], dt);
                obj.eval(&ud, &td).eps
            },
            &joint,
        );
        split_joint_gradient(g, n)
    };

    let (t1, t3) = pass(u_hat, &zero_t);
    let (t2, t4) = pass(&zero_u, theta_hat);
    [t1, t2, t3, t4]
}

pub(super) fn constraint_curvature<M: ResidualModel>(
    model: &M,
    u: &[f64],
    theta: &[f64],
    lam: &[f64],
    u_hat: &[f64],
    theta_hat: &[f64],
) -> [Vec<f64>; 4] {
    let n = u.len();
    let zero_u = vec![0.0; n];
    let zero_t = vec![0.0; theta.len()];
    let joint: Vec<f64> = u.iter().chain(theta.iter()).copied().collect();

    let pass = |du: &[f64], dt: &[f64]| {
        let g = grad(
            |v: &[Reverse<f64>]| {
                let ud = seed(&v[..n], du);
                let td = seed(&v[n..], dt);
                let r = model.residual(&ud, &td);
                // Contract the residual tangents with the adjoint weights.
                let mut acc = Reverse::<f64>::zero();
                for (ri, &li) in r.iter().zip(lam.iter()) {
                    acc += ri.eps * Reverse::from_f64(li);
                }
                acc
            },
            &joint,
        );
        split_joint_gradient(g, n)
    };

    let (t5, t7) = pass(u_hat, &zero_t);
    let (t6, t8) = pass(&zero_u, theta_hat);
    [t5, t6, t7, t8]
}
