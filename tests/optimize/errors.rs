use core::convert::Infallible;

use acqf_optim::prelude::*;
use acqf_optim::{BoxError, Quantity};

use crate::adam;

/// Well-behaved for `healthy_calls` calls, then misbehaves as configured.
struct Faulty {
    healthy_calls: usize,
    calls: usize,
    fault: Fault,
}

#[derive(Clone, Copy)]
enum Fault {
    ShortScores,
    LongGradient,
    NanScore,
    InfiniteGradient,
    HugeScores,
    Fails,
}

#[derive(Debug, thiserror::Error)]
#[error("model posterior unavailable")]
struct PosteriorError;

impl Faulty {
    fn new(healthy_calls: usize, fault: Fault) -> Self {
        Self {
            healthy_calls,
            calls: 0,
            fault,
        }
    }
}

impl BatchObjective for Faulty {
    type Error = PosteriorError;

    fn evaluate_with_gradient(
        &mut self,
        batch: &CandidateBatch,
    ) -> core::result::Result<Evaluation, PosteriorError> {
        self.calls += 1;
        let mut scores: Vec<f64> = batch.restarts().map(|r| -r.iter().sum::<f64>()).collect();
        let mut gradient = vec![-1.0; batch.as_slice().len()];
        if self.calls <= self.healthy_calls {
            return Ok(Evaluation { scores, gradient });
        }
        match self.fault {
            Fault::ShortScores => {
                scores.pop();
            }
            Fault::LongGradient => gradient.push(0.0),
            Fault::NanScore => scores[0] = f64::NAN,
            Fault::InfiniteGradient => gradient[1] = f64::INFINITY,
            Fault::HugeScores => scores.fill(f64::MAX),
            Fault::Fails => return Err(PosteriorError),
        }
        Ok(Evaluation { scores, gradient })
    }
}

fn two_restarts() -> CandidateBatch {
    CandidateBatch::from_nested(&[vec![vec![0.5, 0.5]], vec![vec![0.2, 0.8]]]).unwrap()
}

fn run_faulty(healthy_calls: usize, fault: Fault) -> acqf_optim::Error {
    let bounds = Bounds::unit(2).unwrap();
    let mut objective = Faulty::new(healthy_calls, fault);
    adam(0.01, 10)
        .run(&mut objective, &bounds, two_restarts())
        .unwrap_err()
}

#[test]
fn short_score_vector_is_a_shape_error() {
    let err = run_faulty(0, Fault::ShortScores);
    assert!(
        matches!(err, Error::InvalidShape { iteration: Some(1), .. }),
        "{err}"
    );
}

#[test]
fn long_gradient_is_a_shape_error() {
    let err = run_faulty(3, Fault::LongGradient);
    assert!(
        matches!(err, Error::InvalidShape { iteration: Some(4), .. }),
        "{err}"
    );
    assert!(err.to_string().contains("iteration 4"));
}

#[test]
fn non_finite_outputs_are_reported() {
    assert!(matches!(
        run_faulty(2, Fault::NanScore),
        Error::NonFiniteValue {
            iteration: 3,
            quantity: Quantity::Score
        }
    ));
    assert!(matches!(
        run_faulty(0, Fault::InfiniteGradient),
        Error::NonFiniteValue {
            iteration: 1,
            quantity: Quantity::Gradient
        }
    ));
}

#[test]
fn overflowing_score_sum_is_reported() {
    // Each score is finite, their sum is not.
    assert!(matches!(
        run_faulty(1, Fault::HugeScores),
        Error::NonFiniteValue {
            iteration: 2,
            quantity: Quantity::Score
        }
    ));
}

#[test]
fn overflowing_step_is_reported_as_candidate() {
    let bounds = Bounds::new(vec![-f64::MAX], vec![f64::MAX]).unwrap();
    let mut objective = Faulty::new(usize::MAX, Fault::Fails);
    let initial = CandidateBatch::from_nested(&[vec![vec![-f64::MAX]]]).unwrap();
    let mut run = adam(f64::MAX, 5).start(&bounds, initial).unwrap();

    let err = run.step(&mut objective).unwrap_err();
    assert!(
        matches!(
            err,
            Error::NonFiniteValue {
                iteration: 1,
                quantity: Quantity::Candidate
            }
        ),
        "{err}"
    );
    assert_eq!(run.batch().as_slice(), &[-f64::MAX]);
    assert_eq!(run.iterations(), 0);
}

#[test]
fn objective_error_keeps_its_source() {
    let err = run_faulty(5, Fault::Fails);
    assert_eq!(err.iteration(), Some(6));
    let Error::ObjectiveEvaluation { source, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(source.downcast_ref::<PosteriorError>().is_some());
    let source = core::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), "model posterior unavailable");
}

#[test]
fn failed_step_keeps_last_feasible_batch() {
    let bounds = Bounds::unit(2).unwrap();
    let mut objective = Faulty::new(2, Fault::Fails);
    let optimizer = adam(0.01, 1);
    let mut run = optimizer.start(&bounds, two_restarts()).unwrap();
    run.step(&mut objective).unwrap();
    run.step(&mut objective).unwrap();
    let before = run.batch().clone();

    assert!(run.step(&mut objective).is_err());
    assert_eq!(run.batch(), &before);
    assert_eq!(run.iterations(), 2);
    assert!(bounds.contains(run.batch()));
}

#[test]
fn finite_difference_shape_error_gets_iteration() {
    let bounds = Bounds::unit(1).unwrap();
    let mut objective = FiniteDifference::new(|_: &CandidateBatch| Ok::<_, Infallible>(vec![0.0]));
    let initial = CandidateBatch::from_nested(&[vec![vec![0.1]], vec![vec![0.2]]]).unwrap();
    let err = adam(0.01, 5).run(&mut objective, &bounds, initial).unwrap_err();
    assert!(
        matches!(err, Error::InvalidShape { iteration: Some(1), .. }),
        "{err}"
    );
}

#[test]
fn finite_difference_forwards_boxed_errors() {
    let bounds = Bounds::unit(1).unwrap();
    let mut objective = FiniteDifference::new(|_: &CandidateBatch| {
        Err::<Vec<f64>, BoxError>("sampler exhausted".into())
    });
    let initial = CandidateBatch::from_nested(&[vec![vec![0.1]]]).unwrap();
    let err = adam(0.01, 5).run(&mut objective, &bounds, initial).unwrap_err();
    assert!(matches!(
        err,
        Error::ObjectiveEvaluation {
            iteration: Some(1),
            ..
        }
    ));
}

#[test]
fn mismatched_bounds_are_rejected_before_any_evaluation() {
    let bounds = Bounds::unit(3).unwrap();
    let mut objective = Faulty::new(usize::MAX, Fault::Fails);
    let err = adam(0.01, 5)
        .run(&mut objective, &bounds, two_restarts())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidShape { .. }));
    assert_eq!(objective.calls, 0);
}

#[test]
fn ragged_nested_input_is_rejected() {
    assert!(matches!(
        CandidateBatch::from_nested(&[vec![vec![0.1, 0.2]], vec![vec![0.3]]]),
        Err(Error::InvalidShape { .. })
    ));
    assert!(BatchShape::new(0, 1, 1).is_err());
}
