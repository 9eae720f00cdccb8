//! Merges per-component results into query answers and a run report.
//!
//! Components are independent, so their answers never overlap: every query
//! atom gets its value from the one component that contains it, or from
//! unit propagation when it was fixed there.

use serde::Serialize;

use crate::error::SolveError;
use crate::ground::{GroundModel, GroundingStats};
use crate::infer::{MapOutcome, SampleSet};
use crate::mln::Program;
use crate::mrf::Problem;
use crate::partition::MrfComponent;
use crate::symbol::AtomId;

/// Which answers a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Map,
    Marginal,
    /// MAP and marginals from one grounding.
    Dual,
}

impl Mode {
    pub fn wants_map(self) -> bool {
        matches!(self, Mode::Map | Mode::Dual)
    }

    pub fn wants_marginals(self) -> bool {
        matches!(self, Mode::Marginal | Mode::Dual)
    }
}

/// Outcome of one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ComponentStatus {
    Ok,
    /// The deadline cut the solver short; results are best-so-far.
    Incomplete,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub id: usize,
    pub atoms: usize,
    pub clauses: usize,
    pub status: ComponentStatus,
    pub solvers: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<u64>,
    pub elapsed_ms: u64,
}

/// A query atom with its argument labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtomLabel {
    pub predicate: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for AtomLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.predicate, self.args.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginalAnswer {
    pub atom: AtomLabel,
    pub probability: f64,
}

/// Everything a solving run produced.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceReport {
    pub mode: Mode,
    pub seed: u64,
    pub source_seed: u64,
    pub grounding: GroundingStats,
    pub components: Vec<ComponentReport>,
    /// Query atoms true in the MAP state, in query order.
    pub map: Vec<AtomLabel>,
    /// Query atom marginals at or above `min_prob`, in query order.
    pub marginals: Vec<MarginalAnswer>,
    pub hard_violations: usize,
    pub soft_cost: f64,
    pub complete: bool,
    pub elapsed_ms: u64,
}

impl InferenceReport {
    pub fn failed_components(&self) -> impl Iterator<Item = &ComponentReport> {
        self.components
            .iter()
            .filter(|c| matches!(c.status, ComponentStatus::Failed { .. }))
    }
}

/// The solver output of one component, before aggregation.
#[derive(Debug)]
pub struct ComponentResult {
    pub component: MrfComponent,
    pub problem: Problem,
    pub map: Option<MapOutcome>,
    pub samples: Option<SampleSet>,
    pub solvers: Vec<&'static str>,
    pub elapsed_ms: u64,
}

impl ComponentResult {
    /// Status from the solver flags: hard violations fail a component, a
    /// deadline hit makes it incomplete.
    pub fn status(&self) -> ComponentStatus {
        let map_failed = self.map.as_ref().is_some_and(|m| m.hard_violations > 0);
        let samples_failed = self.samples.as_ref().is_some_and(|s| {
            self.problem.has_hard() && !s.records.is_empty() && s.records.iter().all(|r| !r.satisfied)
        });
        if map_failed || samples_failed {
            return ComponentStatus::Failed {
                reason: SolveError::HardUnsatisfiable {
                    component: self.component.id,
                }
                .to_string(),
            };
        }
        let complete = self.map.as_ref().is_none_or(|m| m.complete)
            && self.samples.as_ref().is_none_or(|s| s.complete);
        if complete {
            ComponentStatus::Ok
        } else {
            ComponentStatus::Incomplete
        }
    }
}

/// Collects component results for one run.
pub struct Aggregator<'a> {
    program: &'a Program,
    model: &'a GroundModel,
    mode: Mode,
    min_prob: f64,
    map_values: Vec<Option<bool>>,
    marginals: Vec<Option<f64>>,
    components: Vec<ComponentReport>,
    hard_violations: usize,
    soft_cost: f64,
}

impl<'a> Aggregator<'a> {
    pub fn new(program: &'a Program, model: &'a GroundModel, mode: Mode, min_prob: f64) -> Self {
        let n = model.atoms.len();
        Self {
            program,
            model,
            mode,
            min_prob,
            map_values: vec![None; n],
            marginals: vec![None; n],
            components: Vec::new(),
            hard_violations: 0,
            soft_cost: 0.0,
        }
    }

    /// Merge one component. Results must arrive in component-id order.
    pub fn add(&mut self, result: ComponentResult) {
        let status = result.status();
        match &status {
            ComponentStatus::Ok => {}
            ComponentStatus::Incomplete => {
                tracing::warn!(component = result.component.id, "component solved incompletely");
            }
            ComponentStatus::Failed { reason } => {
                tracing::warn!(component = result.component.id, %reason, "component failed");
            }
        }

        if let Some(map) = &result.map {
            for (local, atom) in result.problem.atoms.iter().enumerate() {
                self.map_values[atom.index()] = Some(map.assignment.get(local));
            }
            self.hard_violations += map.hard_violations;
            self.soft_cost += map.soft_cost;
        }
        if let Some(samples) = &result.samples {
            for (atom, p) in result.problem.atoms.iter().zip(samples.marginals()) {
                self.marginals[atom.index()] = Some(p);
            }
        }

        self.components.push(ComponentReport {
            id: result.component.id,
            atoms: result.component.atoms.len(),
            clauses: result.component.clauses.len(),
            status,
            solvers: result.solvers,
            samples: result.samples.as_ref().map(|s| s.samples),
            map: result.map,
            elapsed_ms: result.elapsed_ms,
        });
    }

    fn label(&self, atom: AtomId) -> AtomLabel {
        let ground = self.model.atoms.get(atom);
        AtomLabel {
            predicate: self.program.predicate(ground.predicate).name.clone(),
            args: ground
                .args
                .iter()
                .map(|c| self.program.constants.resolve_label(*c))
                .collect(),
        }
    }

    /// Build the report. Query atoms given as evidence are not answers; atoms
    /// fixed by unit propagation are answered with their fixed value.
    pub fn finish(self, seed: u64, source_seed: u64, elapsed_ms: u64) -> InferenceReport {
        let mut map = Vec::new();
        let mut marginals = Vec::new();
        for &q in &self.model.queries {
            let atom = self.model.atoms.get(q);
            let fixed = atom.propagated.then(|| atom.truth.value()).flatten();
            if atom.truth.value().is_some() && fixed.is_none() {
                continue;
            }
            if self.mode.wants_map() && fixed.or(self.map_values[q.index()]) == Some(true) {
                map.push(self.label(q));
            }
            if self.mode.wants_marginals() {
                let p = fixed
                    .map(|v| if v { 1.0 } else { 0.0 })
                    .or(self.marginals[q.index()]);
                if let Some(p) = p.filter(|p| *p >= self.min_prob) {
                    marginals.push(MarginalAnswer {
                        atom: self.label(q),
                        probability: p,
                    });
                }
            }
        }

        let complete = self
            .components
            .iter()
            .all(|c| c.status == ComponentStatus::Ok);
        InferenceReport {
            mode: self.mode,
            seed,
            source_seed,
            grounding: self.model.stats.clone(),
            components: self.components,
            map,
            marginals,
            hard_violations: self.hard_violations,
            soft_cost: self.soft_cost,
            complete,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroundingConfig;
    use crate::evidence::EvidenceDb;
    use crate::ground::unit_prop::{propagate, PropagationBudget};
    use crate::ground::Grounder;
    use crate::config::WalkSatConfig;
    use crate::infer::{Assignment, ComponentSolver, Deadline, WalkSat};
    use crate::mln::parser::{parse_evidence, parse_program, parse_queries};
    use crate::partition::{partition, Partitioning};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const PROGRAM: &str = "person = { Anna, Bob, Carl }\n\
                           smokes(person)\n\
                           cancer(person)\n\
                           2.0 smokes(x) => cancer(x)\n\
                           cancer(Carl).\n";

    fn setup(evidence: &str) -> (Program, GroundModel) {
        let mut prog = Program::new();
        parse_program(&mut prog, "p.mln", PROGRAM).unwrap();
        let facts = parse_evidence(&prog, "e.db", evidence).unwrap();
        let db = EvidenceDb::from_facts(facts);
        let queries = parse_queries(&prog, "q", "cancer").unwrap();
        let config = GroundingConfig::default();
        let mut model = Grounder::new(&prog, &db, &config).ground(&queries, 1).unwrap();
        let budget = PropagationBudget {
            max_rounds: 10,
            timeout: None,
        };
        propagate(&mut model, &prog, &budget).unwrap();
        (prog, model)
    }

    fn solve_all(model: &GroundModel, mode: Mode) -> Vec<ComponentResult> {
        let weights: Vec<f64> = model.clauses.iter().map(|c| c.weight).collect();
        partition(model, Partitioning::Components)
            .into_iter()
            .map(|component| {
                let problem = Problem::build(model, &component, &weights);
                let mut rng = StdRng::seed_from_u64(component.id as u64);
                let map = mode
                    .wants_map()
                    .then(|| WalkSat::new(WalkSatConfig::default()).solve(&problem, &mut rng, &Deadline::none()));
                ComponentResult {
                    component,
                    problem,
                    map,
                    samples: None,
                    solvers: vec!["walksat"],
                    elapsed_ms: 0,
                }
            })
            .collect()
    }

    #[test]
    fn map_answers_skip_evidence_and_keep_propagated_atoms() {
        let (prog, model) = setup("smokes(Anna)\ncancer(Bob)\n");
        let mut agg = Aggregator::new(&prog, &model, Mode::Map, 0.0);
        for result in solve_all(&model, Mode::Map) {
            agg.add(result);
        }
        let report = agg.finish(1, 1, 0);
        let names: Vec<String> = report.map.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["cancer(Anna)", "cancer(Carl)"]);
        assert!(report.complete);
        assert_eq!(report.hard_violations, 0);
    }

    #[test]
    fn marginals_respect_min_prob() {
        let (prog, model) = setup("smokes(Anna)\ncancer(Bob)\n");
        let mut agg = Aggregator::new(&prog, &model, Mode::Marginal, 0.5);
        for mut result in solve_all(&model, Mode::Map) {
            let n = result.problem.atom_count();
            let set = SampleSet {
                true_counts: vec![1; n],
                samples: 4,
                complete: true,
                ..SampleSet::default()
            };
            result.map = None;
            result.samples = Some(set);
            agg.add(result);
        }
        let report = agg.finish(1, 1, 0);
        // cancer(Anna) has 0.25 and is filtered; cancer(Carl) was fixed true.
        assert_eq!(report.marginals.len(), 1);
        assert_eq!(report.marginals[0].atom.to_string(), "cancer(Carl)");
        assert_eq!(report.marginals[0].probability, 1.0);
    }

    #[test]
    fn hard_violation_fails_the_component() {
        let component = MrfComponent {
            id: 3,
            atoms: Vec::new(),
            clauses: Vec::new(),
        };
        let result = ComponentResult {
            component,
            problem: Problem::from_clauses(0, Vec::new()),
            map: Some(MapOutcome {
                assignment: Assignment::default(),
                hard_violations: 1,
                soft_cost: 0.0,
                flips: 0,
                tries: 1,
                complete: true,
            }),
            samples: None,
            solvers: vec!["walksat"],
            elapsed_ms: 0,
        };
        assert!(matches!(result.status(), ComponentStatus::Failed { .. }));
    }
}
