//! MRF partitioning: connected components of the atom-clause incidence graph.
//!
//! Two atoms are connected when some clause mentions both. Each connected atom
//! set together with the clauses inside it is an [`MrfComponent`] that can be
//! solved independently of every other component.

use std::collections::{HashMap, VecDeque};

use petgraph::unionfind::UnionFind;
use serde::Serialize;

use crate::ground::GroundModel;
use crate::symbol::{AtomId, ClauseId};

/// Whether the ground model is split into components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partitioning {
    Components,
    /// Everything in a single component.
    Disabled,
}

impl Partitioning {
    pub fn from_flag(enabled: bool) -> Self {
        if enabled {
            Partitioning::Components
        } else {
            Partitioning::Disabled
        }
    }
}

/// A connected, independently solvable piece of the MRF.
#[derive(Debug, Clone, Serialize)]
pub struct MrfComponent {
    pub id: usize,
    /// Ascending atom ids.
    pub atoms: Vec<AtomId>,
    /// Ascending clause ids.
    pub clauses: Vec<ClauseId>,
}

impl MrfComponent {
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

/// Partition the unknown, active atoms of `model` and the clauses over them.
///
/// Component ids follow first discovery while scanning atoms in id order, so
/// the result only depends on the model.
pub fn partition(model: &GroundModel, mode: Partitioning) -> Vec<MrfComponent> {
    let mrf_atoms: Vec<AtomId> = model.atoms.mrf_atoms().collect();
    if mrf_atoms.is_empty() {
        return Vec::new();
    }

    if mode == Partitioning::Disabled {
        return vec![MrfComponent {
            id: 0,
            atoms: mrf_atoms,
            clauses: model.clauses.iter().map(|c| c.id).collect(),
        }];
    }

    let mut sets = UnionFind::<usize>::new(model.atoms.len());
    for clause in &model.clauses {
        if let Some((first, rest)) = clause.literals.split_first() {
            for lit in rest {
                sets.union(first.atom.index(), lit.atom.index());
            }
        }
    }

    let mut by_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<MrfComponent> = Vec::new();
    for atom in mrf_atoms {
        let root = sets.find(atom.index());
        let id = *by_root.entry(root).or_insert_with(|| {
            components.push(MrfComponent {
                id: components.len(),
                atoms: Vec::new(),
                clauses: Vec::new(),
            });
            components.len() - 1
        });
        components[id].atoms.push(atom);
    }

    for clause in &model.clauses {
        if let Some(first) = clause.literals.first() {
            if let Some(&id) = by_root.get(&sets.find(first.atom.index())) {
                components[id].clauses.push(clause.id);
            }
        }
    }

    tracing::debug!(
        components = components.len(),
        largest = components.iter().map(MrfComponent::len).max().unwrap_or(0),
        "partitioned ground model"
    );
    components
}

/// A slice of a component used for Gauss-Seidel style sampling.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub atoms: Vec<AtomId>,
    /// Clauses whose lowest atom is in this chunk; counted by this chunk only.
    pub owned: Vec<ClauseId>,
    /// Every clause with at least one atom in this chunk.
    pub touching: Vec<ClauseId>,
}

/// Cut a component into chunks of at most `max_atoms` atoms, grown breadth-first.
pub fn split_component(model: &GroundModel, component: &MrfComponent, max_atoms: usize) -> Vec<Chunk> {
    let max_atoms = max_atoms.max(1);
    let local: HashMap<AtomId, usize> = component
        .atoms
        .iter()
        .enumerate()
        .map(|(i, a)| (*a, i))
        .collect();

    let mut occurrences: Vec<Vec<ClauseId>> = vec![Vec::new(); component.atoms.len()];
    for &cid in &component.clauses {
        for lit in &model.clauses[cid.index()].literals {
            if let Some(&i) = local.get(&lit.atom) {
                occurrences[i].push(cid);
            }
        }
    }

    let mut chunk_of: Vec<Option<usize>> = vec![None; component.atoms.len()];
    let mut chunks: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut queue: VecDeque<usize> = VecDeque::new();

    for start in 0..component.atoms.len() {
        if chunk_of[start].is_some() {
            continue;
        }
        queue.push_back(start);
        chunk_of[start] = Some(chunks.len());
        while let Some(i) = queue.pop_front() {
            if current.len() == max_atoms {
                chunks.push(std::mem::take(&mut current));
            }
            chunk_of[i] = Some(chunks.len());
            current.push(i);
            for cid in &occurrences[i] {
                for lit in &model.clauses[cid.index()].literals {
                    if let Some(&j) = local.get(&lit.atom) {
                        if chunk_of[j].is_none() {
                            // Provisional mark so the atom is queued once.
                            chunk_of[j] = Some(usize::MAX);
                            queue.push_back(j);
                        }
                    }
                }
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let mut out: Vec<Chunk> = chunks
        .iter()
        .map(|members| {
            let mut atoms: Vec<AtomId> = members.iter().map(|&i| component.atoms[i]).collect();
            atoms.sort();
            Chunk {
                atoms,
                owned: Vec::new(),
                touching: Vec::new(),
            }
        })
        .collect();

    for &cid in &component.clauses {
        let clause = &model.clauses[cid.index()];
        let mut seen: Vec<usize> = Vec::new();
        for lit in &clause.literals {
            if let Some(&i) = local.get(&lit.atom) {
                if let Some(c) = chunk_of[i] {
                    if !seen.contains(&c) {
                        seen.push(c);
                        out[c].touching.push(cid);
                    }
                }
            }
        }
        // Literals are sorted by atom id, so the first one is the lowest atom.
        if let Some(owner) = clause
            .literals
            .first()
            .and_then(|l| local.get(&l.atom))
            .and_then(|&i| chunk_of[i])
        {
            out[owner].owned.push(cid);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroundingConfig;
    use crate::evidence::EvidenceDb;
    use crate::ground::Grounder;
    use crate::mln::parser::{parse_program, parse_queries};
    use crate::mln::Program;
    use std::collections::HashSet;

    fn model(text: &str, queries: &str) -> GroundModel {
        let mut prog = Program::new();
        parse_program(&mut prog, "p.mln", text).unwrap();
        let queries = parse_queries(&prog, "q", queries).unwrap();
        let db = EvidenceDb::new();
        let config = GroundingConfig::default();
        Grounder::new(&prog, &db, &config).ground(&queries, 1).unwrap()
    }

    const PAIRS: &str = "node = { N1, N2, N3, N4, N5 }\n\
                         on(node)\n\
                         *link(node, node)\n\
                         1.0 on(N1) => on(N2)\n\
                         1.0 on(N3) => on(N4)\n\
                         0.5 on(N5)\n";

    #[test]
    fn components_partition_atoms_and_clauses() {
        let m = model(PAIRS, "on");
        let comps = partition(&m, Partitioning::Components);
        assert_eq!(comps.len(), 3);

        let mut atoms = HashSet::new();
        let mut clauses = HashSet::new();
        for c in &comps {
            for a in &c.atoms {
                assert!(atoms.insert(*a));
            }
            for cl in &c.clauses {
                assert!(clauses.insert(*cl));
                for lit in &m.clauses[cl.index()].literals {
                    assert!(c.atoms.contains(&lit.atom), "clause spans components");
                }
            }
        }
        assert_eq!(atoms.len(), m.atoms.mrf_atoms().count());
        assert_eq!(clauses.len(), m.clauses.len());
    }

    #[test]
    fn component_ids_follow_atom_order() {
        let m = model(PAIRS, "on");
        let comps = partition(&m, Partitioning::Components);
        let firsts: Vec<AtomId> = comps.iter().map(|c| c.atoms[0]).collect();
        let mut sorted = firsts.clone();
        sorted.sort();
        assert_eq!(firsts, sorted);
        assert!(comps.iter().enumerate().all(|(i, c)| c.id == i));
    }

    #[test]
    fn disabled_mode_yields_one_component() {
        let m = model(PAIRS, "on");
        let comps = partition(&m, Partitioning::Disabled);
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].atoms.len(), 5);
        assert_eq!(comps[0].clauses.len(), 3);
    }

    #[test]
    fn chunks_respect_size_and_own_each_clause_once() {
        let m = model(
            "node = { A, B, C, D, E, F, G }\n\
             on(node)\n\
             1.0 on(x) v on(y)\n",
            "on",
        );
        let comps = partition(&m, Partitioning::Components);
        assert_eq!(comps.len(), 1);
        let chunks = split_component(&m, &comps[0], 3);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.atoms.len() <= 3));

        let mut owned = HashSet::new();
        for chunk in &chunks {
            for cid in &chunk.owned {
                assert!(owned.insert(*cid));
                assert!(chunk.touching.contains(cid));
            }
        }
        assert_eq!(owned.len(), comps[0].clauses.len());
        let atom_total: usize = chunks.iter().map(|c| c.atoms.len()).sum();
        assert_eq!(atom_total, 7);
    }
}
