//! Core identifier types for the mln-forge pipeline.
//!
//! Constants, types, predicates, rules and ground atoms are all identified by
//! dense integer ids so that downstream stages can index plain `Vec`s instead
//! of hashing. The [`AtomicIdAllocator`] hands out ids in allocation order.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! dense_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// The id as a `usize` index.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

dense_id!(
    /// Interned constant (an element of some type's domain).
    ConstantId,
    "const"
);
dense_id!(
    /// Argument type of a predicate slot (e.g. `person`).
    TypeId,
    "type"
);
dense_id!(
    /// Declared predicate.
    PredicateId,
    "pred"
);
dense_id!(
    /// Source rule of the program; provenance for ground clauses and the key of
    /// the learned weight table.
    RuleId,
    "rule"
);
dense_id!(
    /// Ground atom: a predicate applied to a tuple of constants.
    AtomId,
    "atom"
);
dense_id!(
    /// Ground clause in the clause arena.
    ClauseId,
    "clause"
);

/// An interned constant with its type tag.
///
/// The type tag is the first type the constant was seen with; the constant may
/// belong to further domains (see [`ConstantStore::domain`](crate::registry::ConstantStore::domain)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    pub id: ConstantId,
    pub type_tag: TypeId,
    pub label: String,
}

/// Thread-safe dense id allocator.
///
/// Produces monotonically increasing ids starting from 0.
#[derive(Debug, Default)]
pub struct AtomicIdAllocator {
    next: AtomicU32,
}

impl AtomicIdAllocator {
    /// Create a new allocator that starts from 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next raw id.
    pub fn next_raw(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}
