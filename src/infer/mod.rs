//! Per-component solvers: MaxWalkSAT for MAP, MC-SAT and Gibbs for sampling,
//! and width-gated variable elimination for exact expectations.
//!
//! Every solver works on a single [`Problem`] and owns its random generator,
//! so components can be solved in any order on any thread with identical
//! results.

pub mod exact;
pub mod gibbs;
pub mod mcsat;
pub(crate) mod search;
pub mod walksat;

use std::time::{Duration, Instant};

use rand::rngs::StdRng;

use crate::mrf::Problem;

pub use mcsat::{McSat, SampleSet};
pub use walksat::{MapOutcome, WalkSat};

/// A solver that can be run on one component.
pub trait ComponentSolver: Sync {
    type Outcome: Send;

    fn name(&self) -> &'static str;

    fn solve(&self, problem: &Problem, rng: &mut StdRng, deadline: &Deadline) -> Self::Outcome;
}

/// Truth values of a component's atoms, by local index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assignment {
    values: Vec<bool>,
}

impl Assignment {
    pub fn new(values: Vec<bool>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> bool {
        self.values[index]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.values
    }

    pub fn into_inner(self) -> Vec<bool> {
        self.values
    }
}

/// Wall-clock limit shared by all solvers of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Seed of a component's generator, derived from the run seed and the component id.
pub fn component_seed(seed: u64, component: usize) -> u64 {
    // splitmix64 finalizer
    let mut z = seed ^ (component as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_seeds_differ_per_component() {
        assert_ne!(component_seed(7, 0), component_seed(7, 1));
        assert_eq!(component_seed(7, 3), component_seed(7, 3));
        assert_ne!(component_seed(7, 0), component_seed(8, 0));
    }

    #[test]
    fn deadline_without_timeout_never_expires() {
        assert!(!Deadline::none().expired());
        assert!(Deadline::after(Some(Duration::ZERO)).expired());
    }
}
