//! Grounding: weighted first-order rules plus evidence into a weighted ground CNF.
//!
//! The [`Grounder`] enumerates the bindings of every rule clause with a
//! relational join (see [`join`]), substitutes them, and normalizes the result
//! against evidence: literals fixed false are removed, clauses containing a
//! literal fixed true are dropped, tautologies are dropped, and identical
//! literal sets are merged. The output [`GroundModel`] is immutable apart from
//! the optional [unit propagation](unit_prop) pass that runs right after.

pub mod atoms;
pub(crate) mod join;
pub mod unit_prop;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;

use crate::config::GroundingConfig;
use crate::error::GroundError;
use crate::evidence::EvidenceSource;
use crate::mln::{Literal, Program, QuerySpec, Rule};
use crate::symbol::{AtomId, ClauseId, ConstantId, PredicateId, RuleId};

pub use atoms::{AtomStore, GroundAtom, Truth};

use join::{substitute, ClauseJoin, GeneratorTuples, JoinBudget};

/// Result type for grounding operations.
pub type GroundResult<T> = std::result::Result<T, GroundError>;

/// Bindings visited between wall-clock checks.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

// ---------------------------------------------------------------------------
// Ground clauses
// ---------------------------------------------------------------------------

/// A signed reference to a ground atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroundLiteral {
    pub atom: AtomId,
    pub positive: bool,
}

/// A weighted disjunction of ground literals.
#[derive(Debug, Clone, Serialize)]
pub struct GroundClause {
    pub id: ClauseId,
    /// Sorted by atom id, at most one literal per atom.
    pub literals: Vec<GroundLiteral>,
    /// Summed soft weight. A negative weight penalises satisfaction.
    pub weight: f64,
    /// At least one contributing grounding came from a hard rule.
    pub hard: bool,
    /// Source rule of every grounding merged into this clause.
    pub origins: Vec<RuleId>,
    /// Part of `weight` that comes from soft evidence rather than rules.
    pub prior: f64,
}

impl GroundClause {
    pub fn is_satisfied(&self, value: impl Fn(AtomId) -> bool) -> bool {
        self.literals.iter().any(|l| value(l.atom) == l.positive)
    }

    /// Soft penalty paid in a world where the clause has the given satisfaction.
    pub fn soft_cost(weight: f64, satisfied: bool) -> f64 {
        if weight > 0.0 && !satisfied {
            weight
        } else if weight < 0.0 && satisfied {
            -weight
        } else {
            0.0
        }
    }
}

/// Counters collected while grounding.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroundingStats {
    pub rules: usize,
    /// Bindings produced by the joins.
    pub bindings: u64,
    /// Groundings satisfied by evidence.
    pub satisfied: u64,
    pub tautologies: u64,
    /// Soft groundings falsified by evidence (constant cost, dropped).
    pub falsified_soft: u64,
    /// Groundings folded into an existing clause with the same literals.
    pub merged: u64,
    pub prior_clauses: usize,
    pub clauses: usize,
    pub atoms: usize,
    pub active_atoms: usize,
    pub propagation_rounds: usize,
    pub propagated_atoms: usize,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Ground model
// ---------------------------------------------------------------------------

/// The grounded MRF: atoms, merged clauses and the requested query atoms.
#[derive(Debug)]
pub struct GroundModel {
    pub atoms: AtomStore,
    pub clauses: Vec<GroundClause>,
    /// Query atoms in query order.
    pub queries: Vec<AtomId>,
    pub stats: GroundingStats,
}

impl GroundModel {
    /// Per-clause weights under a rule weight table indexed by rule id.
    ///
    /// The clause structure is fixed; only the weights change between
    /// learning rounds. Soft-evidence priors are carried over unchanged.
    pub fn reweight(&self, program: &Program, rule_weights: &[f64]) -> Vec<f64> {
        self.clauses
            .iter()
            .map(|clause| {
                clause.prior
                    + clause
                        .origins
                        .iter()
                        .filter(|r| !program.rule(**r).weight.is_hard())
                        .map(|r| rule_weights[r.index()] * program.rule(*r).clause_share())
                        .sum::<f64>()
            })
            .collect()
    }

    /// Hard violations and soft cost of a complete world.
    pub fn world_cost(&self, value: impl Fn(AtomId) -> bool) -> (usize, f64) {
        let mut hard = 0;
        let mut soft = 0.0;
        for clause in &self.clauses {
            let sat = clause.is_satisfied(&value);
            if clause.hard {
                if !sat {
                    hard += 1;
                }
            } else {
                soft += GroundClause::soft_cost(clause.weight, sat);
            }
        }
        (hard, soft)
    }

    /// Render a clause as `a(X) v !b(Y)`.
    pub fn render_clause(&self, program: &Program, clause: &GroundClause) -> String {
        clause
            .literals
            .iter()
            .map(|l| {
                let atom = self.atoms.render(program, l.atom);
                if l.positive {
                    atom
                } else {
                    format!("!{atom}")
                }
            })
            .collect::<Vec<_>>()
            .join(" v ")
    }

    /// Mark exactly the atoms that occur in some clause as active.
    fn refresh_activity(&mut self) {
        self.atoms.clear_activity();
        for clause in &self.clauses {
            for lit in &clause.literals {
                self.atoms.get_mut(lit.atom).active = true;
            }
        }
        self.stats.clauses = self.clauses.len();
        self.stats.atoms = self.atoms.len();
        self.stats.active_atoms = self.atoms.mrf_atoms().count();
    }
}

// ---------------------------------------------------------------------------
// Grounder
// ---------------------------------------------------------------------------

/// Grounds a program against an evidence source.
pub struct Grounder<'a, E: EvidenceSource + ?Sized> {
    program: &'a Program,
    evidence: &'a E,
    config: &'a GroundingConfig,
    closed: HashSet<PredicateId>,
    /// Atoms left open by soft evidence above the threshold.
    priors: Vec<(PredicateId, Vec<ConstantId>, f64)>,
    prior_keys: HashSet<(PredicateId, Vec<ConstantId>)>,
}

/// Accumulates clauses and atoms while rules are grounded.
struct ClauseBuilder {
    atoms: AtomStore,
    clauses: Vec<GroundClause>,
    index: HashMap<Vec<GroundLiteral>, usize>,
    stats: GroundingStats,
}

impl ClauseBuilder {
    fn add(&mut self, literals: Vec<GroundLiteral>, weight: f64, hard: bool, origin: Option<RuleId>) {
        if let Some(&existing) = self.index.get(&literals) {
            let clause = &mut self.clauses[existing];
            clause.weight += weight;
            clause.hard |= hard;
            match origin {
                Some(rule) => clause.origins.push(rule),
                None => clause.prior += weight,
            }
            self.stats.merged += 1;
            return;
        }
        let id = ClauseId(self.clauses.len() as u32);
        self.index.insert(literals.clone(), self.clauses.len());
        self.clauses.push(GroundClause {
            id,
            literals,
            weight,
            hard,
            origins: origin.into_iter().collect(),
            prior: if origin.is_none() { weight } else { 0.0 },
        });
    }
}

impl<'a, E: EvidenceSource + ?Sized> Grounder<'a, E> {
    pub fn new(program: &'a Program, evidence: &'a E, config: &'a GroundingConfig) -> Self {
        let mut closed: HashSet<PredicateId> = program
            .predicates
            .iter()
            .filter(|p| p.closed_world)
            .map(|p| p.id)
            .collect();
        for name in &config.closed_world {
            match program.predicate_id(name) {
                Some(id) => {
                    closed.insert(id);
                }
                None => tracing::warn!(predicate = %name, "closed-world predicate not declared"),
            }
        }

        let mut seen = HashSet::new();
        let priors: Vec<_> = evidence
            .priors()
            .iter()
            .filter(|(_, _, p)| *p >= config.soft_threshold)
            .filter(|(pred, args, _)| evidence.truth(*pred, args).is_none())
            .filter(|(pred, args, _)| seen.insert((*pred, args.clone())))
            .cloned()
            .collect();
        let prior_keys = priors
            .iter()
            .map(|(pred, args, _)| (*pred, args.clone()))
            .collect();

        Self {
            program,
            evidence,
            config,
            closed,
            priors,
            prior_keys,
        }
    }

    /// Ground all rules, expand the queries and optionally unit-propagate.
    ///
    /// `source_seed` seeds the initial truth value of every unknown atom.
    pub fn ground(mut self, queries: &[QuerySpec], source_seed: u64) -> GroundResult<GroundModel> {
        let started = Instant::now();
        let deadline = self.config.timeout().map(|t| started + t);

        let query_preds: HashSet<PredicateId> = queries.iter().map(|q| q.predicate).collect();
        for pred in &query_preds {
            if self.closed.remove(pred) {
                tracing::warn!(
                    predicate = %self.program.predicate(*pred).name,
                    "query predicate declared closed-world, treating it as open"
                );
            }
        }

        let mut builder = ClauseBuilder {
            atoms: AtomStore::new(),
            clauses: Vec::new(),
            index: HashMap::new(),
            stats: GroundingStats::default(),
        };

        let query_atoms = self.expand_queries(queries, &mut builder.atoms);
        let tuples = self.generator_tuples();

        for rule in &self.program.rules {
            self.ground_rule(rule, &tuples, &mut builder, deadline)?;
        }
        builder.stats.rules = self.program.rules.len();

        for (pred, args, p) in &self.priors {
            let atom = builder.atoms.intern(*pred, args);
            let weight = (p / (1.0 - p)).ln();
            builder.add(vec![GroundLiteral { atom, positive: true }], weight, false, None);
            builder.stats.prior_clauses += 1;
        }

        let mut model = GroundModel {
            atoms: builder.atoms,
            clauses: builder.clauses,
            queries: query_atoms,
            stats: builder.stats,
        };
        model.refresh_activity();

        if self.config.unit_propagate {
            let budget = unit_prop::PropagationBudget {
                max_rounds: self.config.unit_prop_max_rounds,
                timeout: self.config.unit_prop_timeout(),
            };
            unit_prop::propagate(&mut model, self.program, &budget)?;
        }

        if self.config.activate_all {
            for &q in &model.queries {
                let atom = model.atoms.get_mut(q);
                if atom.truth == Truth::Unknown {
                    atom.active = true;
                }
            }
        }

        model.atoms.seed_initial(source_seed);
        model.stats.atoms = model.atoms.len();
        model.stats.active_atoms = model.atoms.mrf_atoms().count();
        model.stats.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            rules = model.stats.rules,
            clauses = model.stats.clauses,
            atoms = model.stats.atoms,
            active = model.stats.active_atoms,
            merged = model.stats.merged,
            elapsed_ms = model.stats.elapsed_ms,
            "grounding finished"
        );
        Ok(model)
    }

    /// Truth fixed by evidence or the closed-world assumption.
    fn fixed_truth(&self, predicate: PredicateId, args: &[ConstantId]) -> Option<bool> {
        if let Some(value) = self.evidence.truth(predicate, args) {
            return Some(value);
        }
        if self.closed.contains(&predicate) && !self.prior_keys.contains(&(predicate, args.to_vec())) {
            return Some(false);
        }
        None
    }

    /// True tuples plus soft-evidence tuples of every closed-world predicate.
    fn generator_tuples(&self) -> GeneratorTuples {
        let mut tuples = GeneratorTuples::new();
        for &pred in &self.closed {
            let mut seen = HashSet::new();
            let mut rows: Vec<Vec<ConstantId>> = Vec::new();
            for t in self.evidence.true_tuples(pred) {
                if seen.insert(t.clone()) {
                    rows.push(t.clone());
                }
            }
            for (p, args, _) in &self.priors {
                if *p == pred && seen.insert(args.clone()) {
                    rows.push(args.clone());
                }
            }
            tuples.insert(pred, rows);
        }
        tuples
    }

    /// Intern every query atom; evidence-fixed ones take their evidence value.
    fn expand_queries(&self, queries: &[QuerySpec], atoms: &mut AtomStore) -> Vec<AtomId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for query in queries {
            let pred = self.program.predicate(query.predicate);
            let slots: Vec<Vec<ConstantId>> = query
                .args
                .iter()
                .zip(&pred.arg_types)
                .map(|(arg, ty)| match arg {
                    Some(c) => vec![*c],
                    None => self.program.constants.domain(*ty),
                })
                .collect();
            for args in cartesian(&slots) {
                let id = atoms.intern(query.predicate, &args);
                let atom = atoms.get_mut(id);
                atom.query = true;
                if let Some(value) = self.evidence.truth(query.predicate, &args) {
                    atom.truth = Truth::from_bool(value);
                }
                if seen.insert(id) {
                    out.push(id);
                }
            }
        }
        out
    }

    fn ground_rule(
        &self,
        rule: &Rule,
        tuples: &GeneratorTuples,
        builder: &mut ClauseBuilder,
        deadline: Option<Instant>,
    ) -> GroundResult<()> {
        let mut budget = JoinBudget::new(rule.id.index(), self.config.max_groundings);
        let hard = rule.weight.is_hard();
        let weight = rule.weight.soft().unwrap_or(0.0) * rule.clause_share();

        for clause in &rule.clauses {
            let mut join = ClauseJoin::new(self.program, rule, clause, &self.closed, tuples);
            join.for_each_binding(&mut |binding| {
                budget.charge()?;
                if budget.seen() % DEADLINE_CHECK_INTERVAL == 0 {
                    check_deadline(deadline, self.config.timeout_secs)?;
                }
                builder.stats.bindings += 1;
                self.instantiate(rule, clause, binding, weight, hard, builder)
            })?;
        }
        check_deadline(deadline, self.config.timeout_secs)?;

        tracing::debug!(rule = %rule.id, bindings = budget.seen(), "rule grounded");
        Ok(())
    }

    /// Substitute one binding, normalize against evidence and emit the clause.
    fn instantiate(
        &self,
        rule: &Rule,
        clause: &[Literal],
        binding: &[ConstantId],
        weight: f64,
        hard: bool,
        builder: &mut ClauseBuilder,
    ) -> GroundResult<()> {
        let mut open: Vec<(PredicateId, Vec<ConstantId>, bool)> = Vec::with_capacity(clause.len());
        for lit in clause {
            let args: Vec<ConstantId> = lit.args.iter().map(|t| substitute(t, binding)).collect();
            match self.fixed_truth(lit.predicate, &args) {
                Some(value) if value == lit.positive => {
                    builder.stats.satisfied += 1;
                    return Ok(());
                }
                Some(_) => {}
                None => open.push((lit.predicate, args, lit.positive)),
            }
        }

        for (i, (pred, args, positive)) in open.iter().enumerate() {
            if open[i + 1..]
                .iter()
                .any(|(p, a, s)| p == pred && a == args && s != positive)
            {
                builder.stats.tautologies += 1;
                return Ok(());
            }
        }

        if open.is_empty() {
            if hard {
                return Err(GroundError::Inconsistent {
                    rule: rule.id.index(),
                    clause: self.render_binding(rule, clause, binding),
                });
            }
            builder.stats.falsified_soft += 1;
            return Ok(());
        }

        let mut literals: Vec<GroundLiteral> = open
            .iter()
            .map(|(pred, args, positive)| GroundLiteral {
                atom: builder.atoms.intern(*pred, args),
                positive: *positive,
            })
            .collect();
        literals.sort();
        literals.dedup();
        builder.add(literals, weight, hard, Some(rule.id));
        Ok(())
    }

    fn render_binding(&self, rule: &Rule, clause: &[Literal], binding: &[ConstantId]) -> String {
        clause
            .iter()
            .map(|lit| {
                let args: Vec<String> = lit
                    .args
                    .iter()
                    .map(|t| self.program.constants.resolve_label(substitute(t, binding)))
                    .collect();
                format!(
                    "{}{}({})",
                    if lit.positive { "" } else { "!" },
                    self.program.predicate(lit.predicate).name,
                    args.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join(" v ")
            + &format!("  [{}]", rule.text)
    }
}

fn check_deadline(deadline: Option<Instant>, seconds: f64) -> GroundResult<()> {
    match deadline {
        Some(d) if Instant::now() > d => Err(GroundError::Timeout { seconds }),
        _ => Ok(()),
    }
}

/// All tuples drawing one value from each slot, in lexicographic slot order.
fn cartesian(slots: &[Vec<ConstantId>]) -> Vec<Vec<ConstantId>> {
    let mut out = vec![Vec::with_capacity(slots.len())];
    for slot in slots {
        let mut next = Vec::with_capacity(out.len() * slot.len());
        for prefix in &out {
            for &c in slot {
                let mut row = prefix.clone();
                row.push(c);
                next.push(row);
            }
        }
        out = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceDb;
    use crate::mln::parser::{parse_evidence, parse_program, parse_queries};

    fn setup(program_text: &str, evidence_text: &str) -> (Program, EvidenceDb) {
        let mut prog = Program::new();
        parse_program(&mut prog, "test.mln", program_text).unwrap();
        let facts = parse_evidence(&prog, "test.db", evidence_text).unwrap();
        (prog, EvidenceDb::from_facts(facts))
    }

    fn ground_with(
        prog: &Program,
        db: &EvidenceDb,
        queries: &str,
        config: &GroundingConfig,
    ) -> GroundResult<GroundModel> {
        let queries = parse_queries(prog, "query", queries).unwrap();
        Grounder::new(prog, db, config).ground(&queries, 1)
    }

    const SMOKERS: &str = "person = { Anna, Bob }\n\
                           *friends(person, person)\n\
                           smokes(person)\n\
                           cancer(person)\n\
                           1.5 smokes(x) => cancer(x)\n\
                           1.1 friends(x, y) ^ smokes(x) => smokes(y)\n";

    #[test]
    fn rule_without_variables_yields_one_clause() {
        let (prog, db) = setup(
            "person = { Anna }\nsmokes(person)\ncancer(person)\n2.0 smokes(Anna) => cancer(Anna)\n",
            "",
        );
        let model = ground_with(&prog, &db, "cancer", &GroundingConfig::default()).unwrap();
        assert_eq!(model.clauses.len(), 1);
        assert_eq!(model.clauses[0].literals.len(), 2);
        assert_eq!(model.clauses[0].weight, 2.0);
        assert_eq!(
            model.render_clause(&prog, &model.clauses[0]),
            "cancer(Anna) v !smokes(Anna)"
        );
    }

    #[test]
    fn falsified_hard_rule_is_inconsistent() {
        let (prog, db) = setup(
            "person = { Anna }\nsmokes(person)\ncancer(person)\nsmokes(x) => cancer(x).\n",
            "smokes(Anna)\n!cancer(Anna)\n",
        );
        let err = ground_with(&prog, &db, "cancer", &GroundingConfig::default()).unwrap_err();
        match err {
            GroundError::Inconsistent { rule, clause } => {
                assert_eq!(rule, 0);
                assert!(clause.contains("cancer(Anna)"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn closed_world_prunes_unasserted_friendships() {
        let (prog, db) = setup(SMOKERS, "friends(Anna, Bob)\nsmokes(Anna)\n");
        let model = ground_with(&prog, &db, "smokes, cancer", &GroundingConfig::default()).unwrap();
        // smokes(Anna) is evidence, so the only open friendship rule grounding is
        // friends(Anna, Bob) ^ smokes(Anna) => smokes(Bob), reduced to smokes(Bob).
        let rendered: Vec<String> = model
            .clauses
            .iter()
            .map(|c| model.render_clause(&prog, c))
            .collect();
        assert!(rendered.contains(&"smokes(Bob)".to_string()));
        assert!(rendered.contains(&"cancer(Anna)".to_string()));
        assert!(rendered.contains(&"!smokes(Bob) v cancer(Bob)".to_string()));
        assert_eq!(model.clauses.len(), 3);
    }

    #[test]
    fn identical_groundings_are_merged() {
        let (prog, db) = setup(
            "person = { Anna, Bob }\nsmokes(person)\n0.5 smokes(x) v smokes(y)\n",
            "",
        );
        let model = ground_with(&prog, &db, "smokes", &GroundingConfig::default()).unwrap();
        // x=y gives two unit clauses; the two mixed bindings merge.
        assert_eq!(model.clauses.len(), 3);
        let mixed = model.clauses.iter().find(|c| c.literals.len() == 2).unwrap();
        assert_eq!(mixed.weight, 1.0);
        assert_eq!(mixed.origins.len(), 2);
        assert_eq!(model.stats.merged, 1);
    }

    #[test]
    fn tautologies_are_dropped() {
        let (prog, db) = setup(
            "person = { Anna }\nsmokes(person)\n1.0 smokes(x) v !smokes(y)\n",
            "",
        );
        let model = ground_with(&prog, &db, "smokes", &GroundingConfig::default()).unwrap();
        assert!(model.clauses.is_empty());
        assert_eq!(model.stats.tautologies, 1);
    }

    #[test]
    fn soft_evidence_becomes_a_prior_clause() {
        let (prog, db) = setup(
            "person = { Anna }\nsmokes(person)\n",
            "0.8 smokes(Anna)\n",
        );
        let model = ground_with(&prog, &db, "smokes", &GroundingConfig::default()).unwrap();
        assert_eq!(model.clauses.len(), 1);
        assert!((model.clauses[0].weight - 4.0f64.ln()).abs() < 1e-12);
        assert!(model.clauses[0].origins.is_empty());

        let config = GroundingConfig {
            soft_threshold: 0.9,
            ..GroundingConfig::default()
        };
        let model = ground_with(&prog, &db, "smokes", &config).unwrap();
        assert!(model.clauses.is_empty());
    }

    #[test]
    fn grounding_stops_at_its_time_budget() {
        let names: Vec<String> = (0..40).map(|i| format!("P{i}")).collect();
        let (prog, db) = setup(
            &format!(
                "person = {{ {} }}\nknows(person, person)\n\
                 0.5 knows(x, y), knows(y, z) => knows(x, z)\n",
                names.join(", ")
            ),
            "",
        );
        let config = GroundingConfig {
            timeout_secs: 0.000_001,
            ..GroundingConfig::default()
        };
        let err = ground_with(&prog, &db, "knows", &config).unwrap_err();
        match err {
            GroundError::Timeout { seconds } => assert_eq!(seconds, 0.000_001),
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[test]
    fn activate_all_survives_unit_propagation() {
        let (prog, db) = setup(
            "person = { Anna }\nsmokes(person)\ncancer(person)\nsmokes(Anna).\n1.0 smokes(x) v cancer(x)\n",
            "",
        );
        let config = GroundingConfig {
            activate_all: true,
            unit_propagate: true,
            ..GroundingConfig::default()
        };
        let model = ground_with(&prog, &db, "cancer", &config).unwrap();
        assert!(model.clauses.is_empty());
        assert_eq!(model.atoms.mrf_atoms().count(), 1);
    }

    #[test]
    fn activate_all_keeps_isolated_query_atoms() {
        let (prog, db) = setup("person = { Anna, Bob }\nsmokes(person)\n", "");
        let model = ground_with(&prog, &db, "smokes", &GroundingConfig::default()).unwrap();
        assert_eq!(model.atoms.mrf_atoms().count(), 0);
        assert_eq!(model.queries.len(), 2);

        let config = GroundingConfig {
            activate_all: true,
            ..GroundingConfig::default()
        };
        let model = ground_with(&prog, &db, "smokes", &config).unwrap();
        assert_eq!(model.atoms.mrf_atoms().count(), 2);
    }

    #[test]
    fn grounding_limit_is_enforced() {
        let (prog, db) = setup(SMOKERS, "");
        let config = GroundingConfig {
            max_groundings: 1,
            ..GroundingConfig::default()
        };
        let err = ground_with(&prog, &db, "cancer", &config).unwrap_err();
        assert!(matches!(err, GroundError::TooManyGroundings { rule: 0, limit: 1 }));
    }

    #[test]
    fn reweight_scales_by_clause_share() {
        let (prog, db) = setup(
            "person = { Anna }\nsmokes(person)\ncancer(person)\n2.0 smokes(x) ^ cancer(x)\n",
            "",
        );
        let model = ground_with(&prog, &db, "smokes, cancer", &GroundingConfig::default()).unwrap();
        assert_eq!(model.clauses.len(), 2);
        assert!(model.clauses.iter().all(|c| c.weight == 1.0));
        assert_eq!(model.reweight(&prog, &[4.0]), vec![2.0, 2.0]);
    }

    #[test]
    fn world_cost_counts_hard_and_soft() {
        let (prog, db) = setup(
            "person = { Anna }\nsmokes(person)\ncancer(person)\nsmokes(x) => cancer(x).\n-1.0 cancer(x)\n",
            "",
        );
        let model = ground_with(&prog, &db, "smokes, cancer", &GroundingConfig::default()).unwrap();
        let anna = prog.constants.lookup("Anna").unwrap();
        let smokes = model
            .atoms
            .lookup(prog.predicate_id("smokes").unwrap(), &[anna])
            .unwrap();
        let (hard, soft) = model.world_cost(|a| a == smokes);
        assert_eq!(hard, 1);
        assert_eq!(soft, 0.0);
        let (hard, soft) = model.world_cost(|_| true);
        assert_eq!(hard, 0);
        assert_eq!(soft, 1.0);
    }
}
