//! First-order program model: predicates, typed variables, weighted rules.
//!
//! A [`Program`] is what the parser produces from one or more program files.
//! Every rule is already in clausal form: a rule holds one or more
//! first-order clauses (a conjunction is split into several clauses that share
//! the rule's weight equally), each a disjunction of signed literals.

pub mod lexer;
pub mod parser;

use std::collections::HashMap;

use crate::registry::ConstantStore;
use crate::symbol::{ConstantId, PredicateId, RuleId, TypeId};

pub use parser::{EvidenceFact, QuerySpec};

/// A declared predicate.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub id: PredicateId,
    pub name: String,
    /// Type of each argument slot.
    pub arg_types: Vec<TypeId>,
    /// Unasserted atoms of a closed-world predicate are false.
    pub closed_world: bool,
}

impl Predicate {
    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }
}

/// A term in a first-order literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    /// Index into the owning rule's variable table.
    Var(u32),
    Const(ConstantId),
}

/// A signed first-order literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub predicate: PredicateId,
    pub args: Vec<Term>,
    pub positive: bool,
}

impl Literal {
    pub fn negated(&self) -> Self {
        Self {
            positive: !self.positive,
            ..self.clone()
        }
    }
}

/// A rule variable and the type its slots agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub ty: TypeId,
}

/// Weight attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weight {
    Soft(f64),
    Hard,
}

impl Weight {
    pub fn is_hard(self) -> bool {
        matches!(self, Weight::Hard)
    }

    /// The soft weight, or `None` for hard rules.
    pub fn soft(self) -> Option<f64> {
        match self {
            Weight::Soft(w) => Some(w),
            Weight::Hard => None,
        }
    }
}

/// A weighted first-order rule in clausal form.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: RuleId,
    pub weight: Weight,
    /// Disjunctive clauses; more than one when the source formula was a conjunction.
    pub clauses: Vec<Vec<Literal>>,
    pub variables: Vec<Variable>,
    /// Source text, used when rendering the learned program.
    pub text: String,
}

impl Rule {
    /// Fraction of the rule weight carried by each of its clauses.
    pub fn clause_share(&self) -> f64 {
        1.0 / self.clauses.len().max(1) as f64
    }
}

/// A parsed MLN program: types, predicates, rules and the constants they mention.
#[derive(Debug, Default)]
pub struct Program {
    pub types: Vec<String>,
    type_index: HashMap<String, TypeId>,
    pub predicates: Vec<Predicate>,
    predicate_index: HashMap<String, PredicateId>,
    pub rules: Vec<Rule>,
    pub constants: ConstantStore,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create a type by name.
    pub fn intern_type(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.type_index.get(name) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(name.to_string());
        self.type_index.insert(name.to_string(), id);
        id
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.type_index.get(name).copied()
    }

    pub fn type_name(&self, id: TypeId) -> &str {
        self.types.get(id.index()).map(String::as_str).unwrap_or("?")
    }

    /// Register a predicate. Returns `None` if the name is taken.
    pub fn declare_predicate(
        &mut self,
        name: &str,
        arg_types: Vec<TypeId>,
        closed_world: bool,
    ) -> Option<PredicateId> {
        if self.predicate_index.contains_key(name) {
            return None;
        }
        let id = PredicateId(self.predicates.len() as u32);
        self.predicates.push(Predicate {
            id,
            name: name.to_string(),
            arg_types,
            closed_world,
        });
        self.predicate_index.insert(name.to_string(), id);
        Some(id)
    }

    pub fn predicate_id(&self, name: &str) -> Option<PredicateId> {
        self.predicate_index.get(name).copied()
    }

    pub fn predicate(&self, id: PredicateId) -> &Predicate {
        &self.predicates[id.index()]
    }

    /// Mark predicates closed-world by name (the `-cw` list). Unknown names are ignored
    /// with a warning.
    pub fn close_world<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            match self.predicate_index.get(name) {
                Some(id) => self.predicates[id.index()].closed_world = true,
                None => tracing::warn!(predicate = name, "closed-world predicate not declared"),
            }
        }
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    /// Render a first-order literal with the rule's variable names.
    pub fn render_literal(&self, rule: &Rule, lit: &Literal) -> String {
        let pred = self.predicate(lit.predicate);
        let args: Vec<String> = lit
            .args
            .iter()
            .map(|t| match *t {
                Term::Var(v) => rule.variables[v as usize].name.clone(),
                Term::Const(c) => self.constants.resolve_label(c),
            })
            .collect();
        format!(
            "{}{}({})",
            if lit.positive { "" } else { "!" },
            pred.name,
            args.join(", ")
        )
    }

    /// Render a rule in clausal form (`a v !b v c`, clauses joined by ` ^ `).
    pub fn render_rule_clauses(&self, rule: &Rule) -> String {
        rule.clauses
            .iter()
            .map(|clause| {
                clause
                    .iter()
                    .map(|l| self.render_literal(rule, l))
                    .collect::<Vec<_>>()
                    .join(" v ")
            })
            .collect::<Vec<_>>()
            .join(" ^ ")
    }
}
