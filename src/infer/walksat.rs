//! MaxWalkSAT with optional simulated-annealing steps.

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use crate::config::WalkSatConfig;
use crate::mrf::Problem;

use super::search::SearchState;
use super::{Assignment, ComponentSolver, Deadline};

/// Flips between deadline checks.
const DEADLINE_STRIDE: u64 = 256;

const EPSILON: f64 = 1e-9;

/// Result of a MAP search on one component.
#[derive(Debug, Clone, Serialize)]
pub struct MapOutcome {
    #[serde(skip)]
    pub assignment: Assignment,
    pub hard_violations: usize,
    pub soft_cost: f64,
    pub flips: u64,
    pub tries: u32,
    /// False when the deadline cut the search short.
    pub complete: bool,
}

/// Weighted MaxWalkSAT solver.
#[derive(Debug, Clone)]
pub struct WalkSat {
    config: WalkSatConfig,
}

impl WalkSat {
    pub fn new(config: WalkSatConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WalkSatConfig {
        &self.config
    }

    /// Search the full weighted problem, first try from `start` (or the seeded values).
    pub fn search(
        &self,
        problem: &Problem,
        start: Option<&[bool]>,
        rng: &mut StdRng,
        deadline: &Deadline,
    ) -> MapOutcome {
        let penalty = SearchState::full_penalties(problem);
        self.run(problem, penalty, self.config.avoid_breaking_hard, start, rng, deadline)
    }

    /// Search for an assignment satisfying the hard clauses only.
    pub fn satisfy_hard(
        &self,
        problem: &Problem,
        start: Option<&[bool]>,
        rng: &mut StdRng,
        deadline: &Deadline,
    ) -> MapOutcome {
        let penalty = problem
            .clauses
            .iter()
            .map(|c| if c.hard { 1.0 } else { 0.0 })
            .collect();
        self.run(problem, penalty, false, start, rng, deadline)
    }

    fn run(
        &self,
        problem: &Problem,
        penalty: Vec<f64>,
        strict: bool,
        start: Option<&[bool]>,
        rng: &mut StdRng,
        deadline: &Deadline,
    ) -> MapOutcome {
        let n = problem.atom_count();
        let max_flips = self.config.flips_for(n);
        let mut best: Vec<bool> = start.map(<[bool]>::to_vec).unwrap_or_else(|| problem.initial.clone());
        let mut best_cost = f64::INFINITY;
        let mut flips = 0u64;
        let mut tries = 0u32;
        let mut complete = true;

        'tries: for t in 0..self.config.max_tries.max(1) {
            tries += 1;
            let values = if t == 0 {
                best.clone()
            } else {
                (0..n).map(|_| rng.gen_bool(0.5)).collect()
            };
            let mut state = SearchState::new(problem, values, penalty.clone());
            if state.cost() < best_cost - EPSILON {
                best_cost = state.cost();
                best.clone_from(&state.values);
            }

            for step in 0..max_flips {
                if state.bad_count() == 0 {
                    break;
                }
                if step % DEADLINE_STRIDE == 0 && deadline.expired() {
                    complete = false;
                    break 'tries;
                }
                let progress = step as f64 / max_flips as f64;
                if self.step(&mut state, progress, strict, rng) {
                    flips += 1;
                }
                if state.cost() < best_cost - EPSILON {
                    best_cost = state.cost();
                    best.clone_from(&state.values);
                }
            }
            if best_cost <= EPSILON {
                break;
            }
        }

        let (hard_violations, soft_cost) = problem.cost(&best);
        MapOutcome {
            assignment: Assignment::new(best),
            hard_violations,
            soft_cost,
            flips,
            tries,
            complete,
        }
    }

    /// One MaxWalkSAT move. Returns whether an atom was flipped. In `strict`
    /// mode no move may make a satisfied hard clause bad.
    fn step(&self, state: &mut SearchState<'_>, progress: f64, strict: bool, rng: &mut StdRng) -> bool {
        let n = state.values.len();
        if self.config.anneal_prob > 0.0 && n > 0 && rng.gen_bool(self.config.anneal_prob.min(1.0)) {
            let atom = rng.gen_range(0..n);
            let (delta, breaks_hard) = state.delta(atom);
            if strict && breaks_hard {
                return false;
            }
            let accept = delta <= 0.0
                || rng.gen_bool((-delta * self.config.anneal_coef * (1.0 + progress)).exp().min(1.0));
            if accept {
                state.flip(atom);
            }
            return accept;
        }

        let Some(clause) = state.random_bad(rng) else {
            return false;
        };
        match pick_atom(state, clause, self.config.random_step, strict, rng) {
            Some(atom) => {
                state.flip(atom);
                true
            }
            None => false,
        }
    }
}

/// Choose the atom of a bad clause to flip: random with probability
/// `random_step`, otherwise the lowest cost delta (ties to the lowest index).
/// With `avoid_breaking_hard`, atoms whose flip breaks a satisfied hard clause
/// are never chosen, and `None` means every atom of the clause would.
pub(crate) fn pick_atom(
    state: &SearchState<'_>,
    clause: usize,
    random_step: f64,
    avoid_breaking_hard: bool,
    rng: &mut StdRng,
) -> Option<usize> {
    let lits = &state.problem().clauses[clause].lits;
    if rng.gen_bool(random_step.clamp(0.0, 1.0)) {
        if !avoid_breaking_hard {
            return Some(lits[rng.gen_range(0..lits.len())].atom as usize);
        }
        let safe: Vec<usize> = lits
            .iter()
            .map(|l| l.atom as usize)
            .filter(|&atom| !state.delta(atom).1)
            .collect();
        return (!safe.is_empty()).then(|| safe[rng.gen_range(0..safe.len())]);
    }

    let mut best: Option<(f64, usize)> = None;
    for lit in lits {
        let atom = lit.atom as usize;
        let (delta, breaks_hard) = state.delta(atom);
        if avoid_breaking_hard && breaks_hard {
            continue;
        }
        let better = match best {
            None => true,
            Some((d, a)) => delta < d - EPSILON || ((delta - d).abs() <= EPSILON && atom < a),
        };
        if better {
            best = Some((delta, atom));
        }
    }
    best.map(|(_, atom)| atom)
}

impl ComponentSolver for WalkSat {
    type Outcome = MapOutcome;

    fn name(&self) -> &'static str {
        "walksat"
    }

    fn solve(&self, problem: &Problem, rng: &mut StdRng, deadline: &Deadline) -> MapOutcome {
        self.search(problem, None, rng, deadline)
    }
}
