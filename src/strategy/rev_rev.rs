//! Reverse-over-reverse: the inner gradient runs on a tape over tracked
//! scalars, so the inner sweep's multiply-accumulate arithmetic records onto
//! the outer tape; the outer pullback along the direction weights then yields
//! the contractions.

use crate::diff::{grad, vjp};
use crate::model::{Objective, ResidualModel};
use crate::reverse::Reverse;
use crate::scalar::Scalar;

use super::split_joint_gradient;

pub(super) fn objective_curvature<O: Objective>(
    obj: &O,
    u: &[f64],
    theta: &[f64],
    u_hat: &[f64],
    theta_hat: &[f64],
) -> [Vec<f64>; 4] {
    let n = u.len();
    let joint: Vec<f64> = u.iter().chain(theta.iter()).copied().collect();
    // Weights contract the inner gradient, so by symmetry of the Hessian the
    // outer pullback along (û, 0) is exactly the û contraction.
    let joint_u_hat: Vec<f64> = u_hat
        .iter()
        .copied()
        .chain(std::iter::repeat(0.0).take(theta.len()))
        .collect();
    let joint_theta_hat: Vec<f64> = std::iter::repeat(0.0)
        .take(n)
        .chain(theta_hat.iter().copied())
        .collect();

    let inner_gradient = |v: &[Reverse<f64>]| -> Vec<Reverse<f64>> {
        grad(
            |w: &[Reverse<Reverse<f64>>]| obj.eval(&w[..n], &w[n..]),
            v,
        )
    };

    let (t1, t3) = split_joint_gradient(vjp(inner_gradient, &joint, &joint_u_hat), n);
    let (t2, t4) = split_joint_gradient(vjp(inner_gradient, &joint, &joint_theta_hat), n);
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
    let joint: Vec<f64> = u.iter().chain(theta.iter()).copied().collect();
    let joint_u_hat: Vec<f64> = u_hat
        .iter()
        .copied()
        .chain(std::iter::repeat(0.0).take(theta.len()))
        .collect();
    let joint_theta_hat: Vec<f64> = std::iter::repeat(0.0)
        .take(n)
        .chain(theta_hat.iter().copied())
        .collect();
    let weights: Vec<Reverse<f64>> = lam.iter().map(|&l| Reverse::from_f64(l)).collect();

    let inner_pullback = |v: &[Reverse<f64>]| -> Vec<Reverse<f64>> {
        vjp(
            |w: &[Reverse<Reverse<f64>>]| model.residual(&w[..n], &w[n..]),
            v,
            &weights,
        )
    };

    let (t5, t7) = split_joint_gradient(vjp(inner_pullback, &joint, &joint_u_hat), n);
    let (t6, t8) = split_joint_gradient(vjp(inner_pullback, &joint, &joint_theta_hat), n);
    [t5, t6, t7, t8]
}
