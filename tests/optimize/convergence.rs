use acqf_optim::prelude::*;

use crate::adam;
use crate::test_functions::{Pointwise, sphere, sphere_grad};

#[test]
fn unit_square_single_restart_reaches_target() {
    let bounds = Bounds::unit(2).unwrap();
    let target = [0.3, 0.7];

    for start in [[0.0, 0.0], [1.0, 1.0], [0.9, 0.1], [0.5, 0.5]] {
        let initial = CandidateBatch::from_nested(&[vec![start.to_vec()]]).unwrap();
        let mut objective = Pointwise::quadratic(&target);
        let optimizer = adam(0.05, 75);

        let mut run = optimizer.start(&bounds, initial).unwrap();
        while run.iterations() < 75 {
            run.step(&mut objective).unwrap();
            assert!(run.batch().as_slice().iter().all(|x| (0.0..=1.0).contains(x)));
        }
        let result = run.finish(&mut objective).unwrap();

        let x = result.candidates.point(0, 0);
        assert!(
            (x[0] - target[0]).abs() < 0.05 && (x[1] - target[1]).abs() < 0.05,
            "start {start:?} ended at {x:?}"
        );
        assert_eq!(result.loss_history.len(), 75);
    }
}

#[test]
fn small_learning_rate_improves_monotonically() {
    let bounds = Bounds::unit(3).unwrap();
    // Every coordinate starts at least 0.6 away from the target, farther than
    // 100 steps of size 0.001 can travel.
    let initial = CandidateBatch::from_nested(&[
        vec![vec![0.0, 0.1, 0.2]],
        vec![vec![0.2, 0.0, 0.05]],
        vec![vec![0.15, 0.15, 0.15]],
        vec![vec![0.0, 0.0, 0.0]],
    ])
    .unwrap();
    let mut objective = Pointwise::quadratic(&[0.8, 0.8, 0.8]);
    let result = adam(0.001, 100).run(&mut objective, &bounds, initial).unwrap();

    for pair in result.loss_history.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "loss went up: {pair:?}");
    }
    let first = result.loss_history[0];
    let last = result.loss_history[99];
    assert!(last < first);
}

#[test]
fn many_restarts_all_converge() {
    let bounds = Bounds::new(vec![-1.0; 4], vec![1.0; 4]).unwrap();
    let shape = BatchShape::new(32, 3, 4).unwrap();
    let mut objective = Pointwise::new(sphere, sphere_grad);
    let result = adam(0.05, 150)
        .run_random(&mut objective, &bounds, shape, &mut fastrand::Rng::with_seed(3))
        .unwrap();

    for &x in result.candidates.as_slice() {
        assert!(x.abs() < 0.05, "{x} not near the origin");
    }
    let (_, score) = result.best().unwrap();
    assert!(score > -0.01);
}

#[test]
fn loss_history_tracks_pre_step_loss() {
    let bounds = Bounds::unit(1).unwrap();
    let initial = CandidateBatch::from_nested(&[vec![vec![0.0]], vec![vec![1.0]]]).unwrap();
    let mut objective = Pointwise::quadratic(&[0.5]);
    let result = adam(0.1, 5).run(&mut objective, &bounds, initial).unwrap();

    // Both restarts start 0.5 away: loss = 2 * 0.25.
    assert!((result.loss_history[0] - 0.5).abs() < 1e-12);
    assert_eq!(objective.calls, 6);
}

#[test]
fn exp_ma_stopping_ends_run_early() {
    let bounds = Bounds::unit(2).unwrap();
    let shape = BatchShape::new(4, 1, 2).unwrap();
    let mut objective = Pointwise::quadratic(&[0.25, 0.75]);
    let stopping = ExpMaStopping::builder()
        .max_iterations(5_000)
        .rel_tol(1e-4)
        .build()
        .unwrap();

    let mut rng = fastrand::Rng::with_seed(8);
    let initial = acqf_optim::init::random_batch(shape, &bounds, &mut rng).unwrap();
    let result = adam(0.05, 1)
        .run_until(&mut objective, &bounds, initial, stopping)
        .unwrap();

    // Two full windows are needed before the first comparison.
    assert!(result.iterations > 10 && result.iterations < 5_000);
    assert_eq!(result.loss_history.len(), result.iterations);
    assert!(result.loss_history.last().unwrap() < &result.loss_history[0]);
}

#[test]
fn closure_stopping_sees_every_loss() {
    let bounds = Bounds::unit(1).unwrap();
    let initial = CandidateBatch::from_nested(&[vec![vec![0.9]]]).unwrap();
    let mut objective = Pointwise::quadratic(&[0.1]);
    let mut seen = 0;
    let result = adam(0.05, 1)
        .run_until(&mut objective, &bounds, initial, |i: usize, losses: &[f64]| {
            seen = losses.len();
            assert_eq!(i, losses.len());
            losses.last().is_some_and(|&l| l < 1e-3)
        })
        .unwrap();
    assert_eq!(seen, result.iterations);
    assert!(result.loss_history.last().copied().unwrap() < 1e-3);
}
