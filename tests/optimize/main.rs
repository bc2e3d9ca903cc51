mod convergence;
mod decomposition;
mod errors;
mod feasibility;
mod stochastic;
#[allow(dead_code)]
#[path = "../../benches/test_functions.rs"]
mod test_functions;

use acqf_optim::ProjectedAdam;

pub(crate) fn adam(learning_rate: f64, iterations: usize) -> ProjectedAdam {
    ProjectedAdam::builder()
        .learning_rate(learning_rate)
        .max_iterations(iterations)
        .build()
        .unwrap()
}
