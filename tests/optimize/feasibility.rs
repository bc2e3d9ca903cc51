use core::convert::Infallible;

use acqf_optim::prelude::*;

use crate::adam;
use crate::test_functions::{Pointwise, rastrigin, rastrigin_grad};

/// Linear score `Σ w·x` per restart: constant gradient pushing into the corners.
struct Linear {
    weights: Vec<f64>,
}

impl BatchObjective for Linear {
    type Error = Infallible;

    fn evaluate_with_gradient(
        &mut self,
        batch: &CandidateBatch,
    ) -> core::result::Result<Evaluation, Infallible> {
        let d = self.weights.len();
        let scores = batch
            .restarts()
            .map(|r| r.iter().enumerate().map(|(i, x)| self.weights[i % d] * x).sum())
            .collect();
        let gradient = (0..batch.as_slice().len())
            .map(|i| self.weights[i % d])
            .collect();
        Ok(Evaluation { scores, gradient })
    }
}

#[test]
fn every_iterate_stays_inside_bounds() {
    let bounds = Bounds::new(vec![-1.0, 2.0, 0.0], vec![1.0, 3.0, 0.5]).unwrap();
    let shape = BatchShape::new(6, 2, 3).unwrap();
    let mut rng = fastrand::Rng::with_seed(11);
    let initial = acqf_optim::init::random_batch(shape, &bounds, &mut rng).unwrap();

    let mut objective = Linear {
        weights: vec![3.0, -2.0, 1.0],
    };
    let optimizer = adam(0.2, 1);
    let mut run = optimizer.start(&bounds, initial).unwrap();
    for i in 1..=50 {
        let step = run.step(&mut objective).unwrap();
        assert_eq!(step.iteration, i);
        assert!(bounds.contains(run.batch()), "infeasible after iteration {i}");
    }

    for point in run.batch().points() {
        assert_eq!(point, &[1.0, 2.0, 0.5]);
    }
}

#[test]
fn multimodal_objective_stays_feasible() {
    let bounds = Bounds::from_pairs(&[(-5.12, 5.12), (-5.12, 5.12)]).unwrap();
    let shape = BatchShape::new(16, 1, 2).unwrap();
    let mut objective = Pointwise::new(rastrigin, rastrigin_grad);
    let initial =
        acqf_optim::init::random_batch(shape, &bounds, &mut fastrand::Rng::with_seed(5)).unwrap();

    let mut run = adam(0.5, 1).start(&bounds, initial).unwrap();
    for _ in 0..100 {
        run.step(&mut objective).unwrap();
        for &x in run.batch().as_slice() {
            assert!((-5.12..=5.12).contains(&x), "{x} escaped the box");
        }
    }
}

#[test]
fn out_of_bounds_start_is_clamped_to_nearest_bound() {
    let bounds = Bounds::unit(2).unwrap();
    let initial = CandidateBatch::from_nested(&[vec![vec![1.7, -0.4]]]).unwrap();
    let run = adam(0.05, 1).start(&bounds, initial).unwrap();
    assert_eq!(run.batch().as_slice(), &[1.0, 0.0]);
}

#[test]
fn oversized_step_is_clamped_exactly() {
    let bounds = Bounds::unit(2).unwrap();
    let initial = CandidateBatch::from_nested(&[vec![vec![0.5, 0.5]]]).unwrap();
    let mut objective = Linear {
        weights: vec![1.0, -1.0],
    };

    // One Adam step moves every coordinate by about the learning rate.
    let mut run = adam(10.0, 1).start(&bounds, initial).unwrap();
    run.step(&mut objective).unwrap();
    assert_eq!(run.batch().as_slice(), &[1.0, 0.0]);
}

#[test]
fn projection_is_idempotent() {
    let bounds = Bounds::new(vec![0.0, -2.0], vec![1.0, 2.0]).unwrap();
    let mut batch = CandidateBatch::from_nested(&[
        vec![vec![5.0, -7.0], vec![0.3, 1.5]],
        vec![vec![-0.1, 2.0], vec![1.0, 9.0]],
    ])
    .unwrap();

    bounds.project(&mut batch);
    let once = batch.clone();
    bounds.project(&mut batch);
    assert_eq!(batch, once);
    assert_eq!(once.as_slice(), &[1.0, -2.0, 0.3, 1.5, 0.0, 2.0, 1.0, 2.0]);
}

#[test]
fn degenerate_bounds_pin_coordinate() {
    let bounds = Bounds::new(vec![0.0, 0.25], vec![1.0, 0.25]).unwrap();
    let shape = BatchShape::new(3, 1, 2).unwrap();
    let mut objective = Pointwise::quadratic(&[0.6, 0.9]);
    let result = adam(0.05, 60)
        .run_random(&mut objective, &bounds, shape, &mut fastrand::Rng::with_seed(2))
        .unwrap();
    for point in result.candidates.points() {
        assert_eq!(point[1], 0.25);
        assert!((point[0] - 0.6).abs() < 0.05);
    }
}
