//! MC-SAT marginal sampling with SampleSAT as the transition kernel.
//!
//! Every transition keeps all hard clauses plus each currently good soft
//! clause with probability `1 - exp(-|w| x)`, then moves to a near-uniform
//! assignment satisfying the kept set. Atom frequencies over the retained
//! samples estimate the marginals.

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use crate::config::{McSatConfig, WalkSatConfig};
use crate::mrf::Problem;

use super::search::SearchState;
use super::walksat::{pick_atom, WalkSat};
use super::{ComponentSolver, Deadline};

/// Bookkeeping for one transition.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SampleRecord {
    /// Clauses kept as constraints for this step.
    pub retained: usize,
    /// SampleSAT satisfied every kept clause.
    pub satisfied: bool,
    /// Weighted cost of the sample on the full problem.
    pub cost: f64,
}

/// Running marginals at a dump point.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Number of samples drawn when the snapshot was taken.
    pub sample: usize,
    pub marginals: Vec<f64>,
}

/// The samples of one component.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleSet {
    pub records: Vec<SampleRecord>,
    /// Per local atom, the number of counted samples in which it was true.
    pub true_counts: Vec<u64>,
    /// Counted samples (after burn-in).
    pub samples: u64,
    #[serde(skip)]
    pub assignments: Vec<Vec<bool>>,
    pub snapshots: Vec<Snapshot>,
    pub complete: bool,
}

impl SampleSet {
    fn new(atoms: usize) -> Self {
        Self {
            true_counts: vec![0; atoms],
            complete: true,
            ..Self::default()
        }
    }

    /// Fraction of counted samples in which each atom is true.
    pub fn marginals(&self) -> Vec<f64> {
        frequencies(&self.true_counts, self.samples)
    }

    pub(crate) fn count(&mut self, values: &[bool]) {
        for (count, &v) in self.true_counts.iter_mut().zip(values) {
            if v {
                *count += 1;
            }
        }
        self.samples += 1;
    }
}

fn frequencies(counts: &[u64], samples: u64) -> Vec<f64> {
    if samples == 0 {
        return vec![0.5; counts.len()];
    }
    counts.iter().map(|&c| c as f64 / samples as f64).collect()
}

/// MC-SAT sampler.
#[derive(Debug, Clone)]
pub struct McSat {
    config: McSatConfig,
    walksat: WalkSatConfig,
}

impl McSat {
    pub fn new(config: McSatConfig, walksat: WalkSatConfig) -> Self {
        Self { config, walksat }
    }

    pub fn config(&self) -> &McSatConfig {
        &self.config
    }

    /// Starting state: an assignment satisfying the hard clauses when one is found.
    pub fn initial_state(
        &self,
        problem: &Problem,
        start: Option<&[bool]>,
        rng: &mut StdRng,
        deadline: &Deadline,
    ) -> Vec<bool> {
        if !problem.has_hard() {
            return start.map(<[bool]>::to_vec).unwrap_or_else(|| problem.initial.clone());
        }
        let out = WalkSat::new(self.walksat.clone()).satisfy_hard(problem, start, rng, deadline);
        if out.hard_violations > 0 {
            tracing::debug!(violations = out.hard_violations, "no hard-satisfying start state found");
        }
        out.assignment.into_inner()
    }

    /// Draw `config.samples` samples.
    pub fn run(
        &self,
        problem: &Problem,
        start: Option<&[bool]>,
        rng: &mut StdRng,
        deadline: &Deadline,
    ) -> SampleSet {
        self.run_with(problem, start, self.config.samples, rng, deadline, &mut |_| {})
    }

    /// Draw `samples` counted samples, handing each one to `visit`.
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
        let mut set = SampleSet::new(n);
        let mut values = self.initial_state(problem, start, rng, deadline);
        let mut window = vec![0u64; n];
        let mut window_samples = 0u64;

        for step in 0..self.config.burn_in + samples {
            if deadline.expired() {
                set.complete = false;
                break;
            }
            let record = self.transition(problem, &mut values, rng);
            if step < self.config.burn_in {
                continue;
            }
            set.records.push(record);
            set.count(&values);
            for (count, &v) in window.iter_mut().zip(&values) {
                if v {
                    *count += 1;
                }
            }
            window_samples += 1;
            if self.config.keep_samples {
                set.assignments.push(values.clone());
            }
            visit(&values);

            let drawn = set.records.len();
            if self.config.dump_interval > 0 && drawn % self.config.dump_interval == 0 {
                if self.config.snapshot {
                    set.snapshots.push(Snapshot {
                        sample: drawn,
                        marginals: frequencies(&window, window_samples),
                    });
                }
                if !self.config.cumulative {
                    window.iter_mut().for_each(|c| *c = 0);
                    window_samples = 0;
                }
            }
        }
        set
    }

    /// One MC-SAT step from `values`, updated in place.
    pub fn transition(&self, problem: &Problem, values: &mut Vec<bool>, rng: &mut StdRng) -> SampleRecord {
        let mut retained = 0;
        let penalty: Vec<f64> = problem
            .clauses
            .iter()
            .map(|c| {
                let keep = c.hard
                    || (c.weight > 0.0
                        && !c.is_bad(values.as_slice())
                        && rng.gen_bool(1.0 - (-c.weight * self.config.param).exp()));
                if keep {
                    retained += 1;
                    1.0
                } else {
                    0.0
                }
            })
            .collect();

        let satisfied = self.sample_sat(problem, values, penalty, rng);
        let (hard, soft) = problem.cost(values);
        SampleRecord {
            retained,
            satisfied,
            cost: hard as f64 * problem.hard_weight + soft,
        }
    }

    /// SampleSAT over the clauses with a positive penalty. Returns whether the
    /// resulting state satisfies all of them.
    fn sample_sat(&self, problem: &Problem, values: &mut Vec<bool>, penalty: Vec<f64>, rng: &mut StdRng) -> bool {
        let n = problem.atom_count();
        if n == 0 {
            return true;
        }
        let mut state = SearchState::new(problem, std::mem::take(values), penalty);
        let mut last_sat: Option<Vec<bool>> = None;
        let steps = self.config.steps_per_atom.max(1) * n;

        for _ in 0..steps {
            if rng.gen_bool(self.config.sa_prob) {
                let atom = rng.gen_range(0..n);
                let (delta, _) = state.delta(atom);
                if delta <= 0.0 || rng.gen_bool((-delta * self.config.sa_coef).exp().min(1.0)) {
                    if delta > 0.0 && state.bad_count() == 0 {
                        last_sat = Some(state.values.clone());
                    }
                    state.flip(atom);
                }
            } else if let Some(clause) = state.random_bad(rng) {
                if let Some(atom) = pick_atom(&state, clause, self.walksat.random_step, false, rng) {
                    state.flip(atom);
                }
            }
        }

        if state.bad_count() == 0 {
            *values = state.values;
            true
        } else if let Some(sat) = last_sat {
            *values = sat;
            true
        } else {
            *values = state.values;
            false
        }
    }
}

impl ComponentSolver for McSat {
    type Outcome = SampleSet;

    fn name(&self) -> &'static str {
        "mcsat"
    }

    fn solve(&self, problem: &Problem, rng: &mut StdRng, deadline: &Deadline) -> SampleSet {
        self.run(problem, None, rng, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrf::{LocalClause, LocalLit, Sense};
    use crate::symbol::ClauseId;
    use rand::SeedableRng;

    fn clause(lits: &[(u32, bool)], w: f64, hard: bool) -> LocalClause {
        LocalClause {
            lits: lits
                .iter()
                .map(|&(atom, positive)| LocalLit { atom, positive })
                .collect(),
            weight: w.abs(),
            sense: if w >= 0.0 { Sense::Satisfy } else { Sense::Falsify },
            hard,
            source: ClauseId(0),
        }
    }

    fn sampler(samples: usize) -> McSat {
        McSat::new(
            McSatConfig {
                samples,
                ..McSatConfig::default()
            },
            WalkSatConfig::default(),
        )
    }

    #[test]
    fn unconstrained_atom_is_near_one_half() {
        let problem = Problem::from_clauses(1, vec![clause(&[(0, true)], 0.0, false)]);
        let mut rng = StdRng::seed_from_u64(17);
        let set = sampler(2_000).solve(&problem, &mut rng, &Deadline::none());
        let p = set.marginals()[0];
        assert!((p - 0.5).abs() < 0.06, "marginal {p}");
        assert_eq!(set.samples, 2_000);
    }

    #[test]
    fn positive_unit_clause_raises_the_marginal() {
        let problem = Problem::from_clauses(2, vec![clause(&[(0, true)], 2.0, false)]);
        let mut rng = StdRng::seed_from_u64(5);
        let set = sampler(1_000).solve(&problem, &mut rng, &Deadline::none());
        let m = set.marginals();
        // exp(2) / (1 + exp(2)) is about 0.88.
        assert!(m[0] > 0.75, "marginal {}", m[0]);
        assert!((m[1] - 0.5).abs() < 0.1, "marginal {}", m[1]);
    }

    #[test]
    fn hard_clauses_hold_in_every_sample() {
        let problem = Problem::from_clauses(
            2,
            vec![
                clause(&[(0, true), (1, true)], 0.0, true),
                clause(&[(0, false)], 1.0, false),
            ],
        );
        let mut rng = StdRng::seed_from_u64(2);
        let mut seen = 0;
        let set = sampler(200).run_with(&problem, None, 200, &mut rng, &Deadline::none(), &mut |v: &[bool]| {
            seen += 1;
            assert!(v[0] || v[1]);
        });
        assert_eq!(seen, 200);
        assert!(set.records.iter().all(|r| r.satisfied));
    }

    #[test]
    fn burn_in_and_snapshots() {
        let problem = Problem::from_clauses(1, vec![clause(&[(0, true)], 1.0, false)]);
        let sampler = McSat::new(
            McSatConfig {
                samples: 10,
                burn_in: 5,
                dump_interval: 5,
                snapshot: true,
                keep_samples: true,
                ..McSatConfig::default()
            },
            WalkSatConfig::default(),
        );
        let mut rng = StdRng::seed_from_u64(8);
        let set = sampler.solve(&problem, &mut rng, &Deadline::none());
        assert_eq!(set.samples, 10);
        assert_eq!(set.assignments.len(), 10);
        assert_eq!(set.snapshots.len(), 2);
        assert_eq!(set.snapshots[1].sample, 10);
    }

    #[test]
    fn expired_deadline_marks_incomplete() {
        let problem = Problem::from_clauses(1, vec![clause(&[(0, true)], 1.0, false)]);
        let mut rng = StdRng::seed_from_u64(1);
        let deadline = Deadline::after(Some(std::time::Duration::ZERO));
        let set = sampler(10).solve(&problem, &mut rng, &deadline);
        assert!(!set.complete);
        assert_eq!(set.samples, 0);
        assert_eq!(set.marginals(), vec![0.5]);
    }
}
