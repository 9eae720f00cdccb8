//! Ground atom store: interns `(predicate, constants)` tuples into dense [`AtomId`]s.
//!
//! Atoms are created during grounding only. Once grounding (and unit
//! propagation) finish, the store is read-only and shared by every solver.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::mln::Program;
use crate::symbol::{AtomId, ConstantId, PredicateId};

/// Truth state of a ground atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Truth::True
        } else {
            Truth::False
        }
    }

    /// The fixed value, if any.
    pub fn value(self) -> Option<bool> {
        match self {
            Truth::True => Some(true),
            Truth::False => Some(false),
            Truth::Unknown => None,
        }
    }
}

/// A predicate applied to a tuple of constants.
#[derive(Debug, Clone)]
pub struct GroundAtom {
    pub id: AtomId,
    pub predicate: PredicateId,
    pub args: Box<[ConstantId]>,
    pub truth: Truth,
    /// Participates in at least one ground clause (or was activated explicitly).
    pub active: bool,
    /// Requested by a query.
    pub query: bool,
    /// Starting value for local search, drawn from the source seed.
    pub initial: bool,
    /// Truth was derived by unit propagation rather than given as evidence.
    pub propagated: bool,
}

/// Dense arena of ground atoms with a tuple index.
#[derive(Debug, Default)]
pub struct AtomStore {
    atoms: Vec<GroundAtom>,
    index: HashMap<(PredicateId, Box<[ConstantId]>), AtomId>,
}

impl AtomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the atom for `predicate(args)`. New atoms start unknown.
    pub fn intern(&mut self, predicate: PredicateId, args: &[ConstantId]) -> AtomId {
        if let Some(&id) = self.index.get(&(predicate, Box::from(args))) {
            return id;
        }
        let id = AtomId(self.atoms.len() as u32);
        let args: Box<[ConstantId]> = args.into();
        self.atoms.push(GroundAtom {
            id,
            predicate,
            args: args.clone(),
            truth: Truth::Unknown,
            active: false,
            query: false,
            initial: false,
            propagated: false,
        });
        self.index.insert((predicate, args), id);
        id
    }

    pub fn lookup(&self, predicate: PredicateId, args: &[ConstantId]) -> Option<AtomId> {
        self.index.get(&(predicate, Box::from(args))).copied()
    }

    pub fn get(&self, id: AtomId) -> &GroundAtom {
        &self.atoms[id.index()]
    }

    pub fn get_mut(&mut self, id: AtomId) -> &mut GroundAtom {
        &mut self.atoms[id.index()]
    }

    /// Fix an atom's truth value by propagation; it no longer takes part in the MRF.
    pub fn fix(&mut self, id: AtomId, value: bool) {
        let atom = &mut self.atoms[id.index()];
        atom.truth = Truth::from_bool(value);
        atom.active = false;
        atom.propagated = true;
    }

    pub(crate) fn clear_activity(&mut self) {
        for atom in &mut self.atoms {
            atom.active = false;
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroundAtom> {
        self.atoms.iter()
    }

    /// Unknown, active atoms: the variables of the MRF, in id order.
    pub fn mrf_atoms(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.atoms
            .iter()
            .filter(|a| a.active && a.truth == Truth::Unknown)
            .map(|a| a.id)
    }

    /// Draw every atom's initial value from `seed`, in id order.
    pub fn seed_initial(&mut self, seed: u64) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        for atom in &mut self.atoms {
            atom.initial = match atom.truth {
                Truth::True => true,
                Truth::False => false,
                Truth::Unknown => rng.gen_bool(0.5),
            };
        }
    }

    /// Render an atom as `pred(A, B)`.
    pub fn render(&self, program: &Program, id: AtomId) -> String {
        let atom = self.get(id);
        let pred = program.predicate(atom.predicate);
        let args: Vec<String> = atom
            .args
            .iter()
            .map(|&c| program.constants.resolve_label(c))
            .collect();
        format!("{}({})", pred.name, args.join(", "))
    }
}
