//! Incremental local-search state shared by WalkSAT, SampleSAT and Gibbs.
//!
//! Tracks the number of true literals per clause and the set of bad clauses,
//! so a flip costs time proportional to the atom's occurrences.

use rand::Rng;

use crate::mrf::{Problem, Sense};

const NOT_BAD: u32 = u32::MAX;

pub(crate) struct SearchState<'p> {
    problem: &'p Problem,
    pub values: Vec<bool>,
    true_lits: Vec<u32>,
    /// Penalty of each clause when bad; zero disables the clause.
    penalty: Vec<f64>,
    bad: Vec<u32>,
    bad_pos: Vec<u32>,
    cost: f64,
    hard_bad: usize,
}

impl<'p> SearchState<'p> {
    pub fn new(problem: &'p Problem, values: Vec<bool>, penalty: Vec<f64>) -> Self {
        let mut state = Self {
            problem,
            values,
            true_lits: vec![0; problem.clauses.len()],
            penalty,
            bad: Vec::new(),
            bad_pos: vec![NOT_BAD; problem.clauses.len()],
            cost: 0.0,
            hard_bad: 0,
        };
        for (ci, clause) in problem.clauses.iter().enumerate() {
            state.true_lits[ci] = clause
                .lits
                .iter()
                .filter(|l| state.values[l.atom as usize] == l.positive)
                .count() as u32;
            if state.is_bad(ci, state.true_lits[ci]) {
                state.mark_bad(ci);
            }
        }
        state
    }

    /// Penalties of the full weighted problem.
    pub fn full_penalties(problem: &Problem) -> Vec<f64> {
        (0..problem.clauses.len()).map(|c| problem.penalty(c)).collect()
    }

    fn is_bad(&self, clause: usize, true_lits: u32) -> bool {
        if self.penalty[clause] <= 0.0 {
            return false;
        }
        match self.problem.clauses[clause].sense {
            Sense::Satisfy => true_lits == 0,
            Sense::Falsify => true_lits > 0,
        }
    }

    fn mark_bad(&mut self, clause: usize) {
        self.bad_pos[clause] = self.bad.len() as u32;
        self.bad.push(clause as u32);
        self.cost += self.penalty[clause];
        if self.problem.clauses[clause].hard {
            self.hard_bad += 1;
        }
    }

    fn unmark_bad(&mut self, clause: usize) {
        let pos = self.bad_pos[clause] as usize;
        let last = self.bad.len() - 1;
        self.bad.swap(pos, last);
        self.bad_pos[self.bad[pos] as usize] = pos as u32;
        self.bad.pop();
        self.bad_pos[clause] = NOT_BAD;
        self.cost -= self.penalty[clause];
        if self.problem.clauses[clause].hard {
            self.hard_bad -= 1;
        }
    }

    /// Cost change of flipping `atom`, and whether the flip makes a good hard clause bad.
    pub fn delta(&self, atom: usize) -> (f64, bool) {
        let mut delta = 0.0;
        let mut breaks_hard = false;
        for occ in &self.problem.occurrences[atom] {
            let c = occ.clause as usize;
            if self.penalty[c] <= 0.0 {
                continue;
            }
            let tc = self.true_lits[c];
            let new_tc = if self.values[atom] == occ.positive {
                tc - 1
            } else {
                tc + 1
            };
            let before = self.is_bad(c, tc);
            let after = self.is_bad(c, new_tc);
            if before != after {
                if after {
                    delta += self.penalty[c];
                    if self.problem.clauses[c].hard {
                        breaks_hard = true;
                    }
                } else {
                    delta -= self.penalty[c];
                }
            }
        }
        (delta, breaks_hard)
    }

    pub fn flip(&mut self, atom: usize) {
        let was = self.values[atom];
        self.values[atom] = !was;
        for i in 0..self.problem.occurrences[atom].len() {
            let occ = self.problem.occurrences[atom][i];
            let c = occ.clause as usize;
            let tc = self.true_lits[c];
            let new_tc = if was == occ.positive { tc - 1 } else { tc + 1 };
            self.true_lits[c] = new_tc;
            let before = self.bad_pos[c] != NOT_BAD;
            let after = self.is_bad(c, new_tc);
            if before && !after {
                self.unmark_bad(c);
            } else if !before && after {
                self.mark_bad(c);
            }
        }
    }

    pub fn bad_count(&self) -> usize {
        self.bad.len()
    }

    /// A uniformly chosen bad clause.
    pub fn random_bad(&self, rng: &mut impl Rng) -> Option<usize> {
        if self.bad.is_empty() {
            None
        } else {
            Some(self.bad[rng.gen_range(0..self.bad.len())] as usize)
        }
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn hard_bad(&self) -> usize {
        self.hard_bad
    }

    pub fn problem(&self) -> &'p Problem {
        self.problem
    }
}
