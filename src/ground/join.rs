//! Nested-loop join that enumerates the variable bindings of one clause.
//!
//! Negative literals over closed-world predicates act as generators: the
//! clause can only be unsatisfied when such a literal's atom is true, so its
//! variables only range over the tuples asserted true (or left open by soft
//! evidence). Every other variable ranges over its full type domain.

use std::collections::{HashMap, HashSet};

use crate::error::GroundError;
use crate::mln::{Literal, Program, Rule, Term};
use crate::symbol::{ConstantId, PredicateId};

use super::GroundResult;

/// Tuples a closed-world generator literal may bind to, per predicate.
pub(crate) type GeneratorTuples = HashMap<PredicateId, Vec<Vec<ConstantId>>>;

/// Binding enumerator for a single clause of a rule.
pub(crate) struct ClauseJoin<'a> {
    clause: &'a [Literal],
    tuples: &'a GeneratorTuples,
    /// Indices into `clause` of generator literals, most selective first.
    generators: Vec<usize>,
    /// Variables not bound by any generator, with their domains.
    free: Vec<(usize, Vec<ConstantId>)>,
    binding: Vec<ConstantId>,
    bound: Vec<bool>,
}

impl<'a> ClauseJoin<'a> {
    pub fn new(
        program: &Program,
        rule: &Rule,
        clause: &'a [Literal],
        closed: &HashSet<PredicateId>,
        tuples: &'a GeneratorTuples,
    ) -> Self {
        let tuple_count = |pred: PredicateId| tuples.get(&pred).map_or(0, Vec::len);

        let mut generators: Vec<usize> = clause
            .iter()
            .enumerate()
            .filter(|(_, lit)| !lit.positive && closed.contains(&lit.predicate))
            .map(|(i, _)| i)
            .collect();
        generators.sort_by_key(|&i| tuple_count(clause[i].predicate));

        let mut generated = vec![false; rule.variables.len()];
        for &g in &generators {
            for term in &clause[g].args {
                if let Term::Var(v) = *term {
                    generated[v as usize] = true;
                }
            }
        }

        let mut used = vec![false; rule.variables.len()];
        for lit in clause {
            for term in &lit.args {
                if let Term::Var(v) = *term {
                    used[v as usize] = true;
                }
            }
        }

        let free = (0..rule.variables.len())
            .filter(|&v| used[v] && !generated[v])
            .map(|v| (v, program.constants.domain(rule.variables[v].ty)))
            .collect();

        Self {
            clause,
            tuples,
            generators,
            free,
            binding: vec![ConstantId(0); rule.variables.len()],
            bound: vec![false; rule.variables.len()],
        }
    }

    /// Call `visit` once per complete binding of the clause's variables.
    ///
    /// The slice handed to `visit` is indexed by rule variable; entries of
    /// variables the clause does not use are meaningless.
    pub fn for_each_binding(
        &mut self,
        visit: &mut dyn FnMut(&[ConstantId]) -> GroundResult<()>,
    ) -> GroundResult<()> {
        self.extend_generators(0, visit)
    }

    fn extend_generators(
        &mut self,
        depth: usize,
        visit: &mut dyn FnMut(&[ConstantId]) -> GroundResult<()>,
    ) -> GroundResult<()> {
        if depth == self.generators.len() {
            return self.extend_free(0, visit);
        }
        let clause = self.clause;
        let all_tuples = self.tuples;
        let lit = &clause[self.generators[depth]];
        let tuples = all_tuples
            .get(&lit.predicate)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut newly_bound = Vec::with_capacity(lit.args.len());
        for tuple in tuples {
            if self.unify(lit, tuple, &mut newly_bound) {
                self.extend_generators(depth + 1, visit)?;
            }
            for v in newly_bound.drain(..) {
                self.bound[v] = false;
            }
        }
        Ok(())
    }

    fn extend_free(
        &mut self,
        depth: usize,
        visit: &mut dyn FnMut(&[ConstantId]) -> GroundResult<()>,
    ) -> GroundResult<()> {
        if depth == self.free.len() {
            return visit(&self.binding);
        }
        let var = self.free[depth].0;
        for i in 0..self.free[depth].1.len() {
            self.binding[var] = self.free[depth].1[i];
            self.extend_free(depth + 1, visit)?;
        }
        Ok(())
    }

    /// Match `lit`'s arguments against `tuple`, binding unbound variables.
    /// Variables bound here are pushed to `newly_bound` so the caller can undo them.
    fn unify(&mut self, lit: &Literal, tuple: &[ConstantId], newly_bound: &mut Vec<usize>) -> bool {
        if tuple.len() != lit.args.len() {
            return false;
        }
        for (term, &value) in lit.args.iter().zip(tuple) {
            match *term {
                Term::Const(c) => {
                    if c != value {
                        return false;
                    }
                }
                Term::Var(v) => {
                    let v = v as usize;
                    if self.bound[v] {
                        if self.binding[v] != value {
                            return false;
                        }
                    } else {
                        self.bound[v] = true;
                        self.binding[v] = value;
                        newly_bound.push(v);
                    }
                }
            }
        }
        true
    }
}

/// Substitute a term under a binding.
pub(crate) fn substitute(term: &Term, binding: &[ConstantId]) -> ConstantId {
    match *term {
        Term::Const(c) => c,
        Term::Var(v) => binding[v as usize],
    }
}

/// Guard against runaway joins: counts bindings per rule.
pub(crate) struct JoinBudget {
    rule: usize,
    limit: u64,
    seen: u64,
}

impl JoinBudget {
    pub fn new(rule: usize, limit: u64) -> Self {
        Self { rule, limit, seen: 0 }
    }

    pub fn charge(&mut self) -> GroundResult<()> {
        self.seen += 1;
        if self.seen > self.limit {
            return Err(GroundError::TooManyGroundings {
                rule: self.rule,
                limit: self.limit,
            });
        }
        Ok(())
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mln::parser::parse_program;

    fn program(text: &str) -> Program {
        let mut prog = Program::new();
        parse_program(&mut prog, "test.mln", text).unwrap();
        prog
    }

    fn collect(prog: &Program, closed: &HashSet<PredicateId>, tuples: &GeneratorTuples) -> Vec<Vec<String>> {
        let rule = &prog.rules[0];
        let mut join = ClauseJoin::new(prog, rule, &rule.clauses[0], closed, tuples);
        let mut out = Vec::new();
        join.for_each_binding(&mut |b| {
            out.push(
                (0..rule.variables.len())
                    .map(|v| prog.constants.resolve_label(b[v]))
                    .collect(),
            );
            Ok(())
        })
        .unwrap();
        out
    }

    const TEXT: &str = "person = { A, B, C }\n\
                        friends(person, person)\n\
                        smokes(person)\n\
                        1.0 friends(x, y) => smokes(y)\n";

    #[test]
    fn open_world_enumerates_full_domain() {
        let prog = program(TEXT);
        let bindings = collect(&prog, &HashSet::new(), &GeneratorTuples::new());
        assert_eq!(bindings.len(), 9);
        assert_eq!(bindings[0], vec!["A", "A"]);
    }

    #[test]
    fn closed_world_generator_binds_from_true_tuples() {
        let prog = program(TEXT);
        let friends = prog.predicate_id("friends").unwrap();
        let a = prog.constants.lookup("A").unwrap();
        let c = prog.constants.lookup("C").unwrap();
        let closed: HashSet<_> = [friends].into_iter().collect();
        let mut tuples = GeneratorTuples::new();
        tuples.insert(friends, vec![vec![a, c]]);
        let bindings = collect(&prog, &closed, &tuples);
        assert_eq!(bindings, vec![vec!["A".to_string(), "C".to_string()]]);
    }

    #[test]
    fn repeated_variable_must_unify() {
        let prog = program(
            "person = { A, B }\n\
             *knows(person, person)\n\
             lonely(person)\n\
             1.0 knows(x, x) => lonely(x)\n",
        );
        let knows = prog.predicate_id("knows").unwrap();
        let a = prog.constants.lookup("A").unwrap();
        let b = prog.constants.lookup("B").unwrap();
        let closed: HashSet<_> = [knows].into_iter().collect();
        let mut tuples = GeneratorTuples::new();
        tuples.insert(knows, vec![vec![a, b], vec![b, b]]);
        assert_eq!(collect(&prog, &closed, &tuples), vec![vec!["B".to_string()]]);
    }

    #[test]
    fn budget_trips_past_limit() {
        let mut budget = JoinBudget::new(3, 2);
        assert!(budget.charge().is_ok());
        assert!(budget.charge().is_ok());
        assert!(matches!(
            budget.charge(),
            Err(GroundError::TooManyGroundings { rule: 3, limit: 2 })
        ));
    }
}
