//! Constant store: bidirectional label ↔ id mapping plus per-type domains.
//!
//! The [`ConstantStore`] interns constant labels into dense [`ConstantId`]s
//! using two `DashMap`s, and records for every type the constants seen in an
//! argument slot of that type (its domain), in first-seen order. Labels are
//! case-sensitive: `Bob` and `bob` are different constants.

use dashmap::{DashMap, DashSet};

use crate::symbol::{AtomicIdAllocator, Constant, ConstantId, TypeId};

/// Interning store for constants.
///
/// Written during parsing and grounding; read-only once grounding finishes.
#[derive(Debug, Default)]
pub struct ConstantStore {
    /// Forward map: id → constant (source of truth).
    id_to_constant: DashMap<ConstantId, Constant>,
    /// Reverse map: label → id.
    label_to_id: DashMap<String, ConstantId>,
    /// Domain of each type, in first-seen order.
    domains: DashMap<TypeId, Vec<ConstantId>>,
    /// Membership index for `domains`.
    members: DashSet<(TypeId, ConstantId)>,
    allocator: AtomicIdAllocator,
}

impl ConstantStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `label` as a constant of type `ty`, returning its id.
    ///
    /// Interning an existing label returns the existing id and adds the
    /// constant to `ty`'s domain if it was not already a member.
    pub fn intern(&self, label: &str, ty: TypeId) -> ConstantId {
        let id = match self.label_to_id.get(label) {
            Some(existing) => *existing.value(),
            None => {
                let id = *self
                    .label_to_id
                    .entry(label.to_string())
                    .or_insert_with(|| ConstantId(self.allocator.next_raw()))
                    .value();
                self.id_to_constant.entry(id).or_insert_with(|| Constant {
                    id,
                    type_tag: ty,
                    label: label.to_string(),
                });
                id
            }
        };
        self.add_to_domain(ty, id);
        id
    }

    /// Add an existing constant to a type's domain.
    pub fn add_to_domain(&self, ty: TypeId, id: ConstantId) {
        if self.members.insert((ty, id)) {
            self.domains.entry(ty).or_default().push(id);
        }
    }

    /// Look up a constant id by label.
    pub fn lookup(&self, label: &str) -> Option<ConstantId> {
        self.label_to_id.get(label).map(|r| *r.value())
    }

    /// Look up a constant by id.
    pub fn get(&self, id: ConstantId) -> Option<Constant> {
        self.id_to_constant.get(&id).map(|r| r.value().clone())
    }

    /// The domain of a type, in first-seen order.
    pub fn domain(&self, ty: TypeId) -> Vec<ConstantId> {
        self.domains
            .get(&ty)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Whether `id` is a member of `ty`'s domain.
    pub fn in_domain(&self, ty: TypeId, id: ConstantId) -> bool {
        self.members.contains(&(ty, id))
    }

    /// Resolve a constant to its label, falling back to `const:{id}`.
    pub fn resolve_label(&self, id: ConstantId) -> String {
        self.id_to_constant
            .get(&id)
            .map(|c| c.label.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Number of interned constants.
    pub fn len(&self) -> usize {
        self.id_to_constant.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.id_to_constant.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let store = ConstantStore::new();
        let a = store.intern("Alice", TypeId(0));
        let b = store.intern("Bob", TypeId(0));
        assert_ne!(a, b);
        assert_eq!(store.intern("Alice", TypeId(0)), a);
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("Bob"), Some(b));
        assert_eq!(store.resolve_label(a), "Alice");
    }

    #[test]
    fn domains_keep_first_seen_order_per_type() {
        let store = ConstantStore::new();
        let bob = store.intern("Bob", TypeId(0));
        let alice = store.intern("Alice", TypeId(0));
        let paris = store.intern("Paris", TypeId(1));
        // Bob also lives in type 1 now, after Paris.
        store.intern("Bob", TypeId(1));

        assert_eq!(store.domain(TypeId(0)), vec![bob, alice]);
        assert_eq!(store.domain(TypeId(1)), vec![paris, bob]);
        assert!(store.in_domain(TypeId(1), bob));
        assert!(!store.in_domain(TypeId(0), paris));
        // The type tag stays the first type seen.
        assert_eq!(store.get(bob).unwrap().type_tag, TypeId(0));
    }

    #[test]
    fn labels_are_case_sensitive() {
        let store = ConstantStore::new();
        let upper = store.intern("Bob", TypeId(0));
        let lower = store.intern("bob", TypeId(0));
        assert_ne!(upper, lower);
    }

    #[test]
    fn unknown_domain_is_empty() {
        let store = ConstantStore::new();
        assert!(store.domain(TypeId(3)).is_empty());
        assert!(store.is_empty());
    }
}
