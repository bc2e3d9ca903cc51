use core::convert::Infallible;

use acqf_optim::prelude::*;

use crate::adam;
use crate::test_functions::{Pointwise, rosenbrock, rosenbrock_grad};

/// Couples the q points of a restart: `-(x₀·y₁ - 0.3)² - Σ (x - 0.5)²`.
fn coupled_score(restart: &[f64]) -> f64 {
    let cross = restart[0] * restart[3] - 0.3;
    -cross * cross - restart.iter().map(|x| (x - 0.5).powi(2)).sum::<f64>()
}

fn coupled_scores(batch: &CandidateBatch) -> core::result::Result<Vec<f64>, Infallible> {
    Ok(batch.restarts().map(coupled_score).collect())
}

#[test]
fn batched_gradient_equals_per_restart_gradient() {
    let shape = BatchShape::new(5, 2, 2).unwrap();
    let batch = acqf_optim::init::random_batch(
        shape,
        &Bounds::unit(2).unwrap(),
        &mut fastrand::Rng::with_seed(9),
    )
    .unwrap();

    let batched = FiniteDifference::new(coupled_scores).evaluate_with_gradient(&batch).unwrap();

    for k in 0..batch.n_restarts() {
        let single = batch.select(&[k]).unwrap();
        let alone = FiniteDifference::new(coupled_scores).evaluate_with_gradient(&single).unwrap();
        assert!((batched.scores[k] - alone.scores[0]).abs() < 1e-12);

        let len = shape.restart_len();
        let slice = &batched.gradient[k * len..(k + 1) * len];
        for (a, b) in slice.iter().zip(&alone.gradient) {
            assert!((a - b).abs() < 1e-9, "restart {k}: {a} vs {b}");
        }
    }
}

#[test]
fn batched_run_matches_individual_runs() {
    let bounds = Bounds::new(vec![-2.0; 3], vec![2.0; 3]).unwrap();
    let shape = BatchShape::new(4, 2, 3).unwrap();
    let initial =
        acqf_optim::init::random_batch(shape, &bounds, &mut fastrand::Rng::with_seed(21)).unwrap();
    let optimizer = adam(0.02, 40);

    let mut objective = Pointwise::new(rosenbrock, rosenbrock_grad);
    let together = optimizer.run(&mut objective, &bounds, initial.clone()).unwrap();

    for k in 0..initial.n_restarts() {
        let mut objective = Pointwise::new(rosenbrock, rosenbrock_grad);
        let alone = optimizer
            .run(&mut objective, &bounds, initial.select(&[k]).unwrap())
            .unwrap();
        for (a, b) in together.candidates.restart(k).iter().zip(alone.candidates.as_slice()) {
            assert!((a - b).abs() < 1e-12, "restart {k}: {a} vs {b}");
        }
        let scores = together.scores.as_ref().unwrap();
        let alone_scores = alone.scores.as_ref().unwrap();
        assert!((scores[k] - alone_scores[0]).abs() < 1e-9);
    }
}

#[test]
fn loss_history_is_sum_of_restart_losses() {
    let bounds = Bounds::unit(2).unwrap();
    let shape = BatchShape::new(3, 1, 2).unwrap();
    let initial =
        acqf_optim::init::random_batch(shape, &bounds, &mut fastrand::Rng::with_seed(4)).unwrap();
    let optimizer = adam(0.05, 10);

    let mut objective = Pointwise::quadratic(&[0.4, 0.6]);
    let together = optimizer.run(&mut objective, &bounds, initial.clone()).unwrap();

    let mut summed = vec![0.0; 10];
    for k in 0..3 {
        let mut objective = Pointwise::quadratic(&[0.4, 0.6]);
        let alone = optimizer
            .run(&mut objective, &bounds, initial.select(&[k]).unwrap())
            .unwrap();
        for (acc, loss) in summed.iter_mut().zip(&alone.loss_history) {
            *acc += loss;
        }
    }
    for (a, b) in together.loss_history.iter().zip(&summed) {
        assert!((a - b).abs() < 1e-12);
    }
}
