//! Evidence relations: ground atoms known true or false, plus soft priors.
//!
//! The grounder only talks to evidence through the [`EvidenceSource`] trait,
//! which is the seam where a relational store would plug in. [`EvidenceDb`]
//! is the in-memory implementation built from parsed evidence files.

use std::collections::{HashMap, HashSet};

use crate::mln::parser::EvidenceTruth;
use crate::mln::EvidenceFact;
use crate::symbol::{ConstantId, PredicateId};

/// Read access to evidence, as the grounder needs it.
pub trait EvidenceSource {
    /// Hard evidence for a ground atom: `Some(true)`/`Some(false)` if asserted.
    fn truth(&self, predicate: PredicateId, args: &[ConstantId]) -> Option<bool>;

    /// Tuples asserted true for `predicate`, in insertion order.
    fn true_tuples(&self, predicate: PredicateId) -> &[Vec<ConstantId>];

    /// Soft evidence as `(predicate, args, probability)`, in insertion order.
    fn priors(&self) -> &[(PredicateId, Vec<ConstantId>, f64)];

    /// Name of the backing schema, if the evidence came from a relational store.
    fn schema(&self) -> Option<&str> {
        None
    }
}

/// Per-predicate evidence table.
#[derive(Debug, Default, Clone)]
struct Relation {
    truth: HashMap<Vec<ConstantId>, bool>,
    true_tuples: Vec<Vec<ConstantId>>,
}

/// In-memory evidence store.
#[derive(Debug, Default, Clone)]
pub struct EvidenceDb {
    relations: HashMap<PredicateId, Relation>,
    priors: Vec<(PredicateId, Vec<ConstantId>, f64)>,
    schema: Option<String>,
    conflicts: usize,
}

impl EvidenceDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from parsed facts.
    pub fn from_facts(facts: impl IntoIterator<Item = EvidenceFact>) -> Self {
        let mut db = Self::new();
        for fact in facts {
            db.insert(fact);
        }
        db
    }

    /// Tag the store with the relational schema it stands in for.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Insert one fact. Hard evidence that flips an earlier assertion wins and
    /// is counted as a conflict.
    pub fn insert(&mut self, fact: EvidenceFact) {
        match fact.truth {
            EvidenceTruth::True => self.assert(fact.predicate, fact.args, true),
            EvidenceTruth::False => self.assert(fact.predicate, fact.args, false),
            EvidenceTruth::Prior(p) if p >= 1.0 => self.assert(fact.predicate, fact.args, true),
            EvidenceTruth::Prior(p) if p <= 0.0 => self.assert(fact.predicate, fact.args, false),
            EvidenceTruth::Prior(p) => self.priors.push((fact.predicate, fact.args, p)),
        }
    }

    /// Assert a ground atom true or false.
    pub fn assert(&mut self, predicate: PredicateId, args: Vec<ConstantId>, value: bool) {
        let rel = self.relations.entry(predicate).or_default();
        match rel.truth.insert(args.clone(), value) {
            Some(old) if old == value => return,
            Some(_) => {
                self.conflicts += 1;
                tracing::warn!(%predicate, ?args, value, "conflicting evidence, keeping the last assertion");
                if !value {
                    rel.true_tuples.retain(|t| *t != args);
                }
            }
            None => {}
        }
        if value {
            rel.true_tuples.push(args);
        }
    }

    /// Move all hard evidence of `predicates` into a separate store.
    ///
    /// Used by weight learning: the evidence on query predicates is the
    /// training truth and must not be visible to the grounder.
    pub fn split_off(&mut self, predicates: &HashSet<PredicateId>) -> EvidenceDb {
        let mut taken = EvidenceDb::new();
        for pred in predicates {
            if let Some(rel) = self.relations.remove(pred) {
                taken.relations.insert(*pred, rel);
            }
        }
        let (held, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.priors)
            .into_iter()
            .partition(|(p, _, _)| predicates.contains(p));
        self.priors = kept;
        taken.priors = held;
        taken
    }

    /// Number of hard evidence atoms.
    pub fn len(&self) -> usize {
        self.relations.values().map(|r| r.truth.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.priors.is_empty()
    }

    /// Number of contradicting assertions seen while loading.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }
}

impl EvidenceSource for EvidenceDb {
    fn truth(&self, predicate: PredicateId, args: &[ConstantId]) -> Option<bool> {
        self.relations
            .get(&predicate)
            .and_then(|rel| rel.truth.get(args).copied())
    }

    fn true_tuples(&self, predicate: PredicateId) -> &[Vec<ConstantId>] {
        self.relations
            .get(&predicate)
            .map(|rel| rel.true_tuples.as_slice())
            .unwrap_or(&[])
    }

    fn priors(&self) -> &[(PredicateId, Vec<ConstantId>, f64)] {
        &self.priors
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}
