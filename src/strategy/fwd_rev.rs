//! Forward-over-reverse: a single reverse sweep whose adjoints are dual
//! numbers, so the tangent channel of each input adjoint is one Hessian
//! contraction.

use crate::diff::{grad, vjp};
use crate::dual::Dual;
use crate::model::{Objective, ResidualModel};
use crate::reverse::Reverse;

use super::split_joint_gradient;

fn joint_point(u: &[f64], theta: &[f64], du: &[f64], dtheta: &[f64]) -> Vec<Dual<f64>> {
    u.iter()
        .zip(du.iter())
        .chain(theta.iter().zip(dtheta.iter()))
        .map(|(&x, &dx)| Dual::new(x, dx))
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

    let pass = |du: &[f64], dt: &[f64]| {
        let x = joint_point(u, theta, du, dt);
        let g = grad(
            |v: &[Reverse<Dual<f64>>]| obj.eval(&v[..n], &v[n..]),
            &x,
        );
        split_joint_gradient(g.iter().map(|d| d.eps).collect(), n)
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
    // The adjoint weights are fixed data, lifted as tangent-free constants.
    let weights: Vec<Dual<f64>> = lam.iter().map(|&l| Dual::constant(l)).collect();

    let pass = |du: &[f64], dt: &[f64]| {
        let x = joint_point(u, theta, du, dt);
        let g = vjp(
            |v: &[Reverse<Dual<f64>>]| model.residual(&v[..n], &v[n..]),
            &x,
            &weights,
        );
        split_joint_gradient(g.iter().map(|d| d.eps).collect(), n)
    };

    let (t5, t7) = pass(u_hat, &zero_t);
    let (t6, t8) = pass(&zero_u, theta_hat);
    [t5, t6, t7, t8]
}
