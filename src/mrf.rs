//! Component-local weighted CNF, the input of every solver.
//!
//! A [`Problem`] renumbers a component's atoms to `0..n` and stores each clause
//! as local literals with a weight magnitude and a [`Sense`]: a positive weight
//! asks for the clause to be satisfied, a negative weight for it to be
//! falsified. Atom occurrences are kept as index arrays for the local search.

use std::collections::HashMap;

use crate::ground::{GroundClause, GroundModel};
use crate::partition::MrfComponent;
use crate::symbol::{AtomId, ClauseId};

/// Which truth value of a clause is rewarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Satisfy,
    Falsify,
}

/// A literal over a component-local atom index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalLit {
    pub atom: u32,
    pub positive: bool,
}

#[derive(Debug, Clone)]
pub struct LocalClause {
    pub lits: Vec<LocalLit>,
    /// Weight magnitude; zero for hard clauses.
    pub weight: f64,
    pub sense: Sense,
    pub hard: bool,
    pub source: ClauseId,
}

impl LocalClause {
    pub fn is_satisfied(&self, values: &[bool]) -> bool {
        self.lits
            .iter()
            .any(|l| values[l.atom as usize] == l.positive)
    }

    /// The clause is in its penalised state.
    pub fn is_bad(&self, values: &[bool]) -> bool {
        let sat = self.is_satisfied(values);
        match self.sense {
            Sense::Satisfy => !sat,
            Sense::Falsify => sat,
        }
    }

    /// Signed weight as written in the program.
    pub fn signed_weight(&self) -> f64 {
        match self.sense {
            Sense::Satisfy => self.weight,
            Sense::Falsify => -self.weight,
        }
    }
}

/// Occurrence of an atom in a clause.
#[derive(Debug, Clone, Copy)]
pub struct Occurrence {
    pub clause: u32,
    pub positive: bool,
}

/// One component as a standalone weighted CNF.
#[derive(Debug, Clone)]
pub struct Problem {
    /// Local index to global atom id.
    pub atoms: Vec<AtomId>,
    pub clauses: Vec<LocalClause>,
    /// Per local atom, the clauses it occurs in.
    pub occurrences: Vec<Vec<Occurrence>>,
    /// Seeded starting values.
    pub initial: Vec<bool>,
    /// Penalty of a violated hard clause: more than all soft weight together.
    pub hard_weight: f64,
}

impl Problem {
    /// Build the problem for a whole component.
    ///
    /// `weights` holds the current weight of every global clause (see
    /// [`GroundModel::reweight`]).
    pub fn build(model: &GroundModel, component: &MrfComponent, weights: &[f64]) -> Self {
        Self::conditioned(model, &component.atoms, &component.clauses, weights, &|_| false)
    }

    /// Build a problem over `atoms` only. Literals over atoms outside the set
    /// take their value from `outside`: clauses they satisfy are constant and
    /// dropped, literals they falsify are removed.
    pub fn conditioned(
        model: &GroundModel,
        atoms: &[AtomId],
        clauses: &[ClauseId],
        weights: &[f64],
        outside: &dyn Fn(AtomId) -> bool,
    ) -> Self {
        let local: HashMap<AtomId, u32> = atoms
            .iter()
            .enumerate()
            .map(|(i, a)| (*a, i as u32))
            .collect();

        let mut out = Vec::with_capacity(clauses.len());
        for &cid in clauses {
            let clause: &GroundClause = &model.clauses[cid.index()];
            let mut lits = Vec::with_capacity(clause.literals.len());
            let mut constant = false;
            for lit in &clause.literals {
                match local.get(&lit.atom) {
                    Some(&i) => lits.push(LocalLit {
                        atom: i,
                        positive: lit.positive,
                    }),
                    None if outside(lit.atom) == lit.positive => {
                        constant = true;
                        break;
                    }
                    None => {}
                }
            }
            if constant || lits.is_empty() {
                continue;
            }
            let w = weights[cid.index()];
            out.push(LocalClause {
                lits,
                weight: if clause.hard { 0.0 } else { w.abs() },
                sense: if clause.hard || w >= 0.0 {
                    Sense::Satisfy
                } else {
                    Sense::Falsify
                },
                hard: clause.hard,
                source: cid,
            });
        }

        let mut occurrences = vec![Vec::new(); atoms.len()];
        for (ci, clause) in out.iter().enumerate() {
            for lit in &clause.lits {
                occurrences[lit.atom as usize].push(Occurrence {
                    clause: ci as u32,
                    positive: lit.positive,
                });
            }
        }

        let soft_total: f64 = out.iter().filter(|c| !c.hard).map(|c| c.weight).sum();
        Self {
            atoms: atoms.to_vec(),
            initial: atoms.iter().map(|a| model.atoms.get(*a).initial).collect(),
            clauses: out,
            occurrences,
            hard_weight: soft_total + 1.0,
        }
    }

    /// Build directly from local clauses; used by tests and benchmarks.
    pub fn from_clauses(atom_count: usize, clauses: Vec<LocalClause>) -> Self {
        let mut occurrences = vec![Vec::new(); atom_count];
        for (ci, clause) in clauses.iter().enumerate() {
            for lit in &clause.lits {
                occurrences[lit.atom as usize].push(Occurrence {
                    clause: ci as u32,
                    positive: lit.positive,
                });
            }
        }
        let soft_total: f64 = clauses.iter().filter(|c| !c.hard).map(|c| c.weight).sum();
        Self {
            atoms: (0..atom_count as u32).map(AtomId).collect(),
            clauses,
            occurrences,
            initial: vec![false; atom_count],
            hard_weight: soft_total + 1.0,
        }
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Penalty paid when a clause is bad.
    pub fn penalty(&self, clause: usize) -> f64 {
        let c = &self.clauses[clause];
        if c.hard {
            self.hard_weight
        } else {
            c.weight
        }
    }

    /// Violated hard clauses and soft cost of an assignment.
    pub fn cost(&self, values: &[bool]) -> (usize, f64) {
        let mut hard = 0;
        let mut soft = 0.0;
        for c in &self.clauses {
            if c.is_bad(values) {
                if c.hard {
                    hard += 1;
                } else {
                    soft += c.weight;
                }
            }
        }
        (hard, soft)
    }

    /// Whether the problem has any hard clause.
    pub fn has_hard(&self) -> bool {
        self.clauses.iter().any(|c| c.hard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroundingConfig;
    use crate::evidence::EvidenceDb;
    use crate::ground::Grounder;
    use crate::mln::parser::{parse_program, parse_queries};
    use crate::mln::Program;
    use crate::partition::{partition, Partitioning};

    fn soft(lits: &[(u32, bool)], w: f64) -> LocalClause {
        LocalClause {
            lits: lits
                .iter()
                .map(|&(atom, positive)| LocalLit { atom, positive })
                .collect(),
            weight: w.abs(),
            sense: if w >= 0.0 { Sense::Satisfy } else { Sense::Falsify },
            hard: false,
            source: ClauseId(0),
        }
    }

    #[test]
    fn negative_weight_penalises_satisfaction() {
        let p = Problem::from_clauses(1, vec![soft(&[(0, true)], -2.0)]);
        assert_eq!(p.cost(&[true]), (0, 2.0));
        assert_eq!(p.cost(&[false]), (0, 0.0));
        assert_eq!(p.clauses[0].signed_weight(), -2.0);
    }

    #[test]
    fn hard_weight_exceeds_total_soft_weight() {
        let p = Problem::from_clauses(
            2,
            vec![soft(&[(0, true)], 1.5), soft(&[(1, false)], -0.5)],
        );
        assert!(p.hard_weight > 2.0);
        assert_eq!(p.occurrences[0].len(), 1);
    }

    #[test]
    fn component_problem_uses_local_indices() {
        let mut prog = Program::new();
        parse_program(
            &mut prog,
            "p.mln",
            "node = { A, B }\non(node)\n1.0 on(A) => on(B)\nonly(node)\n",
        )
        .unwrap();
        let queries = parse_queries(&prog, "q", "on").unwrap();
        let db = EvidenceDb::new();
        let config = GroundingConfig::default();
        let model = Grounder::new(&prog, &db, &config).ground(&queries, 1).unwrap();
        let comps = partition(&model, Partitioning::Components);
        let weights: Vec<f64> = model.clauses.iter().map(|c| c.weight).collect();
        let p = Problem::build(&model, &comps[0], &weights);
        assert_eq!(p.atom_count(), 2);
        assert_eq!(p.clauses.len(), 1);
        assert!(p.clauses[0].lits.iter().all(|l| (l.atom as usize) < 2));
    }

    #[test]
    fn conditioning_drops_satisfied_clauses() {
        let mut prog = Program::new();
        parse_program(
            &mut prog,
            "p.mln",
            "node = { A, B, C }\non(node)\n1.0 on(A) v on(B)\n1.0 on(B) v on(C)\n",
        )
        .unwrap();
        let queries = parse_queries(&prog, "q", "on").unwrap();
        let db = EvidenceDb::new();
        let config = GroundingConfig::default();
        let model = Grounder::new(&prog, &db, &config).ground(&queries, 1).unwrap();
        let weights: Vec<f64> = model.clauses.iter().map(|c| c.weight).collect();
        let all: Vec<ClauseId> = model.clauses.iter().map(|c| c.id).collect();
        let b = AtomId(1);
        let p = Problem::conditioned(&model, &[AtomId(0), AtomId(2)], &all, &weights, &|a| a == b);
        assert!(p.clauses.is_empty());
        let p = Problem::conditioned(&model, &[AtomId(0), AtomId(2)], &all, &weights, &|_| false);
        assert_eq!(p.clauses.len(), 2);
        assert!(p.clauses.iter().all(|c| c.lits.len() == 1));
    }
}
