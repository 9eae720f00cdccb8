//! Unit propagation over hard unit clauses.
//!
//! Each round fixes the atoms of all hard unit clauses, then simplifies every
//! clause against the fixed atoms: satisfied clauses disappear, falsified
//! literals are removed. Soft clauses that become empty only shift the cost by
//! a constant and are dropped; a hard clause that becomes empty is an
//! inconsistency. Rounds repeat until no hard unit clause is left, the round
//! budget is spent, or the time budget runs out. Stopping early is always safe:
//! every intermediate model is equivalent to the input on worlds that agree
//! with the fixed atoms.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::GroundError;
use crate::mln::Program;
use crate::symbol::{AtomId, ClauseId};

use super::{GroundClause, GroundLiteral, GroundModel, GroundResult};

/// Limits for one propagation pass.
#[derive(Debug, Clone)]
pub struct PropagationBudget {
    pub max_rounds: usize,
    pub timeout: Option<Duration>,
}

/// Run unit propagation in place. Returns the number of atoms fixed.
pub fn propagate(
    model: &mut GroundModel,
    program: &Program,
    budget: &PropagationBudget,
) -> GroundResult<usize> {
    let started = Instant::now();
    let mut fixed_total = 0;
    let mut rounds = 0;

    while rounds < budget.max_rounds {
        if budget.timeout.is_some_and(|t| started.elapsed() > t) {
            tracing::warn!(rounds, "unit propagation stopped at its time budget");
            break;
        }

        let units = collect_units(model, program)?;
        if units.is_empty() {
            break;
        }
        rounds += 1;
        for (&atom, &value) in &units {
            model.atoms.fix(atom, value);
        }
        fixed_total += units.len();
        simplify(model, program)?;
        tracing::debug!(round = rounds, fixed = units.len(), clauses = model.clauses.len(), "propagation round");
    }

    if rounds > 0 {
        model.refresh_activity();
    }

    model.stats.propagation_rounds = rounds;
    model.stats.propagated_atoms = fixed_total;
    tracing::info!(rounds, fixed = fixed_total, clauses = model.clauses.len(), "unit propagation finished");
    Ok(fixed_total)
}

/// Atoms forced by hard unit clauses. Opposite units on one atom are inconsistent.
fn collect_units(model: &GroundModel, program: &Program) -> GroundResult<HashMap<AtomId, bool>> {
    let mut units: HashMap<AtomId, bool> = HashMap::new();
    for clause in model.clauses.iter().filter(|c| c.hard && c.literals.len() == 1) {
        let lit = clause.literals[0];
        match units.insert(lit.atom, lit.positive) {
            Some(previous) if previous != lit.positive => {
                let atom = model.atoms.render(program, lit.atom);
                return Err(GroundError::Inconsistent {
                    rule: first_rule(clause),
                    clause: format!("{atom} ^ !{atom}"),
                });
            }
            _ => {}
        }
    }
    Ok(units)
}

/// Rebuild the clause list against the current fixed atoms, re-merging duplicates.
fn simplify(model: &mut GroundModel, program: &Program) -> GroundResult<()> {
    let old = std::mem::take(&mut model.clauses);
    let mut index: HashMap<Vec<GroundLiteral>, usize> = HashMap::new();
    let mut out: Vec<GroundClause> = Vec::with_capacity(old.len());

    for clause in old {
        let mut satisfied = false;
        let mut open = Vec::with_capacity(clause.literals.len());
        for lit in &clause.literals {
            match model.atoms.get(lit.atom).truth.value() {
                Some(v) if v == lit.positive => {
                    satisfied = true;
                    break;
                }
                Some(_) => {}
                None => open.push(*lit),
            }
        }
        if satisfied {
            continue;
        }
        if open.is_empty() {
            if clause.hard {
                let rendered = model.render_clause(program, &clause);
                return Err(GroundError::Inconsistent {
                    rule: first_rule(&clause),
                    clause: rendered,
                });
            }
            continue;
        }

        if let Some(&at) = index.get(&open) {
            let target = &mut out[at];
            target.weight += clause.weight;
            target.prior += clause.prior;
            target.hard |= clause.hard;
            target.origins.extend(clause.origins);
        } else {
            index.insert(open.clone(), out.len());
            out.push(GroundClause {
                id: ClauseId(out.len() as u32),
                literals: open,
                ..clause
            });
        }
    }

    model.clauses = out;
    Ok(())
}

fn first_rule(clause: &GroundClause) -> usize {
    clause.origins.first().map_or(0, |r| r.index())
}
