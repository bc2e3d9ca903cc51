use acqf_optim::prelude::*;

use crate::adam;
use crate::test_functions::NoisyQuadratic;

#[test]
fn zero_learning_rate_leaves_batch_unchanged() {
    let bounds = Bounds::unit(3).unwrap();
    let shape = BatchShape::new(5, 2, 3).unwrap();
    let initial =
        acqf_optim::init::random_batch(shape, &bounds, &mut fastrand::Rng::with_seed(17)).unwrap();

    let mut objective = NoisyQuadratic::new(&[0.5, 0.5, 0.5], 0.5, 99);
    let result = adam(0.0, 40)
        .run(&mut objective, &bounds, initial.clone())
        .unwrap();

    assert_eq!(result.candidates, initial);
    assert_eq!(result.iterations, 40);
    // The objective is still resampled on every call.
    let distinct = result
        .loss_history
        .windows(2)
        .filter(|pair| pair[0] != pair[1])
        .count();
    assert!(distinct > 0);
}

#[test]
fn noisy_objective_still_converges() {
    let bounds = Bounds::unit(2).unwrap();
    let initial = CandidateBatch::from_nested(&[
        vec![vec![0.0, 0.0]],
        vec![vec![1.0, 1.0]],
        vec![vec![0.0, 1.0]],
    ])
    .unwrap();
    let mut objective = NoisyQuadratic::new(&[0.4, 0.6], 0.05, 7);
    let result = adam(0.02, 300).run(&mut objective, &bounds, initial).unwrap();

    assert!(bounds.contains(&result.candidates));
    for point in result.candidates.points() {
        assert!((point[0] - 0.4).abs() < 0.1, "{point:?}");
        assert!((point[1] - 0.6).abs() < 0.1, "{point:?}");
    }
}

#[test]
fn independent_runs_share_nothing() {
    let bounds = Bounds::unit(2).unwrap();
    let initial = CandidateBatch::from_nested(&[vec![vec![0.1, 0.9]]]).unwrap();
    let optimizer = adam(0.05, 30);

    let first = optimizer
        .run(&mut NoisyQuadratic::new(&[0.5, 0.5], 0.1, 1), &bounds, initial.clone())
        .unwrap();
    let second = optimizer
        .run(&mut NoisyQuadratic::new(&[0.5, 0.5], 0.1, 1), &bounds, initial)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn concurrent_runs_are_independent() {
    let bounds = Bounds::unit(2).unwrap();
    let optimizer = adam(0.05, 100);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = [[0.2, 0.2], [0.8, 0.3]]
            .into_iter()
            .enumerate()
            .map(|(i, target)| {
                let bounds = &bounds;
                let optimizer = &optimizer;
                scope.spawn(move || {
                    let mut objective = NoisyQuadratic::new(&target, 0.0, i as u64);
                    let initial = CandidateBatch::from_nested(&[vec![vec![0.5, 0.5]]]).unwrap();
                    optimizer.run(&mut objective, bounds, initial).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let a = results[0].candidates.point(0, 0);
    let b = results[1].candidates.point(0, 0);
    assert!((a[0] - 0.2).abs() < 0.05 && (a[1] - 0.2).abs() < 0.05);
    assert!((b[0] - 0.8).abs() < 0.05 && (b[1] - 0.3).abs() < 0.05);
}
