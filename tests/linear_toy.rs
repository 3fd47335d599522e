//! Closed-form validation on a linear constraint.
//!
//! With `F(u, θ) = K u − θ` for a fixed SPD matrix `K` and `J = ½‖u‖²`, the
//! reduced objective is `½‖K⁻¹θ‖²` and its Hessian-vector product is exactly
//! `K⁻ᵀ K⁻¹ θ̂`.

use std::sync::Arc;

use approx::assert_relative_eq;

use platypus::linalg::{lu_factor, matvec};
use platypus::{
    adjoint_step, hvp, Container, Error, HvpOptions, Layout, Objective, ResidualModel, Scalar,
    SecondOrderStrategy, Stage,
};

const N: usize = 10;

/// SPD tridiagonal stiffness matrix.
fn stiffness() -> Vec<f64> {
    let mut k = vec![0.0; N * N];
    for i in 0..N {
        k[i * N + i] = 2.0;
        if i > 0 {
            k[i * N + i - 1] = -1.0;
        }
        if i < N - 1 {
            k[i * N + i + 1] = -1.0;
        }
    }
    k
}

struct LinearModel {
    k: Vec<f64>,
}

impl ResidualModel for LinearModel {
    fn state_layout(&self) -> Arc<Layout> {
        Layout::flat(N)
    }
    fn param_layout(&self) -> Arc<Layout> {
        Layout::flat(N)
    }
    fn residual<S: Scalar>(&self, u: &[S], theta: &[S]) -> Vec<S> {
        (0..N)
            .map(|i| {
                let mut acc = -theta[i];
                for j in 0..N {
                    let kij = self.k[i * N + j];
                    if kij != 0.0 {
                        acc += S::from_f64(kij) * u[j];
                    }
                }
                acc
            })
            .collect()
    }
}

struct HalfSquaredNorm;

impl Objective for HalfSquaredNorm {
    fn eval<S: Scalar>(&self, u: &[S], _theta: &[S]) -> S {
        let mut acc = S::zero();
        for &ui in u {
            acc += ui * ui;
        }
        acc * S::from_f64(0.5)
    }
}

fn theta() -> Container {
    let values: Vec<f64> = (0..N).map(|i| 1.0 + 0.3 * (i as f64)).collect();
    Container::from_flat(&Layout::flat(N), values)
}

fn theta_hat() -> Container {
    let values: Vec<f64> = (0..N).map(|i| ((i as f64) * 0.7).sin() + 0.2).collect();
    Container::from_flat(&Layout::flat(N), values)
}

/// `K⁻ᵀ K⁻¹ θ̂`, computed independently of the pipeline.
fn closed_form_hvp() -> Vec<f64> {
    let k = stiffness();
    let lu = lu_factor(&k, N).unwrap();
    // K is symmetric, so the transposed solve reuses the same factors.
    lu.solve(&lu.solve(theta_hat().flatten()))
}

#[test]
fn hvp_matches_closed_form_for_every_strategy() {
    let model = LinearModel { k: stiffness() };
    let expected = closed_form_hvp();

    for strategy in [
        SecondOrderStrategy::FwdRev,
        SecondOrderStrategy::RevFwd,
        SecondOrderStrategy::RevRev,
    ] {
        let options = HvpOptions {
            strategy,
            ..HvpOptions::default()
        };
        let (result, _profile) =
            hvp(&model, &HalfSquaredNorm, &theta(), &theta_hat(), &options).unwrap();
        for (&got, &want) in result.flatten().iter().zip(expected.iter()) {
            assert_relative_eq!(got, want, max_relative = 1e-6, epsilon = 1e-10);
        }
    }
}

#[test]
fn adjoint_satisfies_the_transposed_system() {
    let model = LinearModel { k: stiffness() };
    let options = HvpOptions::default();
    let u = platypus::forward_step(&model, &theta(), &options.newton).unwrap();
    let (lam, a) =
        adjoint_step(&model, &HalfSquaredNorm, &u, &theta(), &options.adjoint_solver).unwrap();

    // Aᵀλ + ∂J/∂u must vanish; here ∂J/∂u = u.
    let at_lam = a.transposed().apply(lam.flatten());
    let residual: f64 = at_lam
        .iter()
        .zip(u.flatten().iter())
        .map(|(x, ui)| (x + ui) * (x + ui))
        .sum::<f64>()
        .sqrt();
    assert!(residual < 1e-8, "adjoint residual {residual:.3e}");
}

#[test]
fn forward_solution_solves_the_linear_system() {
    let model = LinearModel { k: stiffness() };
    let u = platypus::forward_step(&model, &theta(), &HvpOptions::default().newton).unwrap();
    let ku = matvec(&stiffness(), N, u.flatten());
    for (&kui, &ti) in ku.iter().zip(theta().flatten().iter()) {
        assert_relative_eq!(kui, ti, max_relative = 1e-8, epsilon = 1e-10);
    }
}

#[test]
fn operator_reads_the_same_after_the_adjoint_solve() {
    let model = LinearModel { k: stiffness() };
    let options = HvpOptions::default();
    let u = platypus::forward_step(&model, &theta(), &options.newton).unwrap();
    let (_, a) =
        adjoint_step(&model, &HalfSquaredNorm, &u, &theta(), &options.adjoint_solver).unwrap();

    // A·probe must match the stiffness product even though a transposed
    // solve has happened in between.
    let probe: Vec<f64> = (0..N).map(|i| (i as f64) - 4.5).collect();
    let applied = a.apply(&probe);
    let expected = matvec(&stiffness(), N, &probe);
    for (&got, &want) in applied.iter().zip(expected.iter()) {
        assert_relative_eq!(got, want, max_relative = 1e-12, epsilon = 1e-12);
    }
}

#[test]
fn profile_reports_both_phases() {
    let model = LinearModel { k: stiffness() };
    let (_, profile) = hvp(
        &model,
        &HalfSquaredNorm,
        &theta(),
        &theta_hat(),
        &HvpOptions::default(),
    )
    .unwrap();
    assert!(profile.j_time + profile.f_time < std::time::Duration::from_secs(60));
}

#[test]
fn mismatched_parameter_length_is_an_unsupported_option() {
    let model = LinearModel { k: stiffness() };
    let short = Container::from_flat(&Layout::flat(4), vec![1.0; 4]);
    let err = platypus::forward_step(&model, &short, &HvpOptions::default().newton).unwrap_err();
    match err {
        Error::UnsupportedOption(msg) => assert!(msg.contains("length 4")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn singular_jacobian_fails_in_the_adjoint_stage_without_mutating_the_operator() {
    struct RankDeficient;
    impl ResidualModel for RankDeficient {
        fn state_layout(&self) -> Arc<Layout> {
            Layout::flat(2)
        }
        fn param_layout(&self) -> Arc<Layout> {
            Layout::flat(2)
        }
        fn residual<S: Scalar>(&self, u: &[S], theta: &[S]) -> Vec<S> {
            let s = u[0] + u[1] - theta[0];
            vec![s, s + s]
        }
    }

    let layout = Layout::flat(2);
    let u = Container::from_flat(&layout, vec![0.5, 0.5]);
    let theta = Container::from_flat(&layout, vec![1.0, 0.0]);
    let err = adjoint_step(
        &RankDeficient,
        &HalfSquaredNorm,
        &u,
        &theta,
        &HvpOptions::default().adjoint_solver,
    )
    .unwrap_err();
    match err {
        Error::LinearSolveFailure { stage, .. } => assert_eq!(stage, Stage::Adjoint),
        other => panic!("unexpected error: {other}"),
    }
}
