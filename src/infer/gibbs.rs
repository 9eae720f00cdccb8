//! Single-site Gibbs sampling over the full weighted problem.
//!
//! Hard clauses are soft with the problem's hard weight, so chains started
//! from a hard-satisfying state rarely leave it. Used as a learning backend.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::WalkSatConfig;
use crate::mrf::Problem;

use super::mcsat::{SampleRecord, SampleSet};
use super::search::SearchState;
use super::walksat::WalkSat;
use super::{ComponentSolver, Deadline};

/// Gibbs sampler.
#[derive(Debug, Clone)]
pub struct Gibbs {
    /// Counted samples per run.
    pub samples: usize,
    /// Sweeps between counted samples.
    pub thinning: usize,
    pub burn_in: usize,
    walksat: WalkSatConfig,
}

impl Gibbs {
    pub fn new(samples: usize, thinning: usize, burn_in: usize, walksat: WalkSatConfig) -> Self {
        Self {
            samples,
            thinning: thinning.max(1),
            burn_in,
            walksat,
        }
    }

    /// Draw `samples` samples, handing each one to `visit`.
    pub fn run_with(
        &self,
        problem: &Problem,
        start: Option<&[bool]>,
        samples: usize,
        rng: &mut StdRng,
        deadline: &Deadline,
        visit: &mut dyn FnMut(&[bool]),
    ) -> SampleSet {
        let n = problem.atom_count();
        let mut set = SampleSet {
            true_counts: vec![0; n],
            complete: true,
            ..SampleSet::default()
        };
        let values = if problem.has_hard() {
            WalkSat::new(self.walksat.clone())
                .satisfy_hard(problem, start, rng, deadline)
                .assignment
                .into_inner()
        } else {
            start.map(<[bool]>::to_vec).unwrap_or_else(|| problem.initial.clone())
        };
        let mut state = SearchState::new(problem, values, SearchState::full_penalties(problem));

        for _ in 0..self.burn_in {
            sweep(&mut state, rng);
        }
        for _ in 0..samples {
            if deadline.expired() {
                set.complete = false;
                break;
            }
            for _ in 0..self.thinning {
                sweep(&mut state, rng);
            }
            set.records.push(SampleRecord {
                retained: 0,
                satisfied: state.hard_bad() == 0,
                cost: state.cost(),
            });
            set.count(&state.values);
            visit(&state.values);
        }
        set
    }
}

/// Resample every atom once, in index order.
fn sweep(state: &mut SearchState<'_>, rng: &mut StdRng) {
    for atom in 0..state.values.len() {
        let (delta, _) = state.delta(atom);
        // P(flip) = exp(-delta) / (1 + exp(-delta))
        let p = 1.0 / (1.0 + delta.exp());
        if rng.gen_bool(p.clamp(0.0, 1.0)) {
            state.flip(atom);
        }
    }
}

impl ComponentSolver for Gibbs {
    type Outcome = SampleSet;

    fn name(&self) -> &'static str {
        "gibbs"
    }

    fn solve(&self, problem: &Problem, rng: &mut StdRng, deadline: &Deadline) -> SampleSet {
        self.run_with(problem, None, self.samples, rng, deadline, &mut |_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrf::{LocalClause, LocalLit, Sense};
    use crate::symbol::ClauseId;
    use rand::SeedableRng;

    fn unit(atom: u32, w: f64) -> LocalClause {
        LocalClause {
            lits: vec![LocalLit { atom, positive: true }],
            weight: w.abs(),
            sense: if w >= 0.0 { Sense::Satisfy } else { Sense::Falsify },
            hard: false,
            source: ClauseId(0),
        }
    }

    #[test]
    fn unit_clause_marginal_matches_logistic() {
        let problem = Problem::from_clauses(2, vec![unit(0, 1.0), unit(1, -1.0)]);
        let gibbs = Gibbs::new(4_000, 1, 10, WalkSatConfig::default());
        let mut rng = StdRng::seed_from_u64(21);
        let m = gibbs.solve(&problem, &mut rng, &Deadline::none()).marginals();
        let expected = 1.0 / (1.0 + (-1.0f64).exp());
        assert!((m[0] - expected).abs() < 0.04, "marginal {}", m[0]);
        assert!((m[1] - (1.0 - expected)).abs() < 0.04, "marginal {}", m[1]);
    }

    #[test]
    fn thinning_does_not_change_the_sample_count() {
        let problem = Problem::from_clauses(1, vec![unit(0, 0.5)]);
        let gibbs = Gibbs::new(25, 4, 0, WalkSatConfig::default());
        let mut rng = StdRng::seed_from_u64(3);
        let set = gibbs.solve(&problem, &mut rng, &Deadline::none());
        assert_eq!(set.samples, 25);
        assert_eq!(set.records.len(), 25);
        assert!(set.complete);
    }
}
