//! Dependency Graph
//!
//! The graph maps (target identity, dependency key) to the set of
//! computations subscribed to that key. Subscriber sets are shared: the
//! graph holds them for trigger lookup, and every member computation keeps
//! the same `Arc` in its own subscription list so it can detach from all of
//! its sets in one pass before re-running.
//!
//! Two reserved keys exist beyond ordinary property/index/entry keys:
//! `Iterate` is subscribed by enumeration reads and invalidated by key
//! adds/removes, and `Length` plays the same role for ordered lists.
//! `CellValue` is the fixed key of boxed and derived cells.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::value::{TargetId, Value};

use super::computation::ComputationId;

/// A dependency key scoped to one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A record field.
    Prop(Arc<str>),
    /// A list position.
    Index(usize),
    /// A map key or set member.
    Entry(Value),
    /// Reserved enumeration marker; invalidated by any key add/remove.
    Iterate,
    /// Reserved length marker for ordered lists.
    Length,
    /// The single slot of a boxed or derived cell.
    CellValue,
}

/// What kind of change a trigger reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// An existing key's value was replaced.
    Set,
    /// A new key came into existence.
    Add,
    /// An existing key was removed.
    Remove,
    /// The whole container was emptied.
    Clear,
}

/// A shared subscriber set for one (target, key) pair.
///
/// Membership order is insertion order, so triggers visit subscribers in
/// the order they first subscribed.
pub(crate) type DepSet = Arc<RwLock<IndexSet<ComputationId>>>;

/// Storage for all dependency edges of one runtime.
pub(crate) struct DepGraph {
    targets: RwLock<HashMap<TargetId, HashMap<DepKey, DepSet>>>,
}

impl DepGraph {
    pub(crate) fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the subscriber set for (target, key).
    pub(crate) fn set_for(&self, target: TargetId, key: DepKey) -> DepSet {
        let mut targets = self.targets.write().expect("graph lock poisoned");
        let keys = targets.entry(target).or_default();
        Arc::clone(
            keys.entry(key)
                .or_insert_with(|| Arc::new(RwLock::new(IndexSet::new()))),
        )
    }

    /// Select the subscriber sets a change contributes to.
    ///
    /// CLEAR invalidates everything under the target. ADD and REMOVE are
    /// structural: they invalidate the key itself plus the enumeration
    /// marker (the length marker when the key is a list index). SET touches
    /// only the key's own set.
    pub(crate) fn contributing(
        &self,
        target: TargetId,
        key: &DepKey,
        change: ChangeKind,
    ) -> SmallVec<[DepSet; 2]> {
        let targets = self.targets.read().expect("graph lock poisoned");
        let mut sets = SmallVec::new();
        let Some(keys) = targets.get(&target) else {
            return sets;
        };
        match change {
            ChangeKind::Clear => {
                sets.extend(keys.values().cloned());
            }
            ChangeKind::Add | ChangeKind::Remove => {
                if let Some(set) = keys.get(key) {
                    sets.push(Arc::clone(set));
                }
                let marker = if matches!(key, DepKey::Index(_)) {
                    DepKey::Length
                } else {
                    DepKey::Iterate
                };
                if let Some(set) = keys.get(&marker) {
                    sets.push(Arc::clone(set));
                }
            }
            ChangeKind::Set => {
                if let Some(set) = keys.get(key) {
                    sets.push(Arc::clone(set));
                }
            }
        }
        sets
    }

    /// Drop empty subscriber sets under a target. Called opportunistically;
    /// correctness never depends on it.
    pub(crate) fn sweep(&self, target: TargetId) {
        let mut targets = self.targets.write().expect("graph lock poisoned");
        if let Some(keys) = targets.get_mut(&target) {
            keys.retain(|_, set| !set.read().expect("subscriber set lock poisoned").is_empty());
            if keys.is_empty() {
                targets.remove(&target);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, target: TargetId, key: &DepKey) -> usize {
        let targets = self.targets.read().expect("graph lock poisoned");
        targets
            .get(&target)
            .and_then(|keys| keys.get(key))
            .map(|set| set.read().expect("subscriber set lock poisoned").len())
            .unwrap_or(0)
    }
}
