//! Interception Layer
//!
//! A Handle is a facade over exactly one structured raw value. It holds no
//! data of its own: every operation resolves against the raw container, and
//! the handle's job is to record read dependencies and fire triggers around
//! the raw access.
//!
//! Five operations are intercepted: read, write, delete, presence, and
//! enumeration. Reads lazily wrap structured results (read-only reads
//! produce read-only wrappers) and auto-unwrap boxed cells; writes unwrap
//! incoming values so a raw container never stores a wrapper, redirect
//! writes landing on a cell-valued field into the cell, and compare old and
//! new with an equality that treats NaN-over-NaN as unchanged.
//!
//! The read-only variant rejects every mutation with a diagnostic and a
//! success-shaped `Rejected` outcome unless the runtime's internal unlock
//! flag is set.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::warn;

use crate::reactive::{ChangeKind, DepKey, Runtime};
use crate::value::{Structured, TargetId, Value};

use super::registry::unwrap;

/// An access key into a wrapped container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A record field name.
    Prop(Arc<str>),
    /// A list position.
    Index(usize),
    /// A map key or set member.
    Entry(Value),
}

impl Key {
    pub fn prop(name: impl Into<Arc<str>>) -> Self {
        Key::Prop(name.into())
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Prop(Arc::from(name))
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::Entry(value)
    }
}

impl From<&Key> for DepKey {
    fn from(key: &Key) -> Self {
        match key {
            Key::Prop(name) => DepKey::Prop(Arc::clone(name)),
            Key::Index(index) => DepKey::Index(*index),
            Key::Entry(value) => DepKey::Entry(value.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(name) => write!(f, "{}", name),
            Key::Index(index) => write!(f, "{}", index),
            Key::Entry(value) => write!(f, "{:?}", value),
        }
    }
}

/// What a mutation through a handle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new key came into existence.
    Added,
    /// An existing key's value was replaced.
    Changed,
    /// The stored value already matched.
    Unchanged,
    /// The key existed and is gone.
    Removed,
    /// There was nothing to remove.
    Missing,
    /// The target is read-only and locked; nothing happened.
    Rejected,
}

pub(crate) struct HandleInner {
    pub(crate) runtime: Runtime,
    pub(crate) target: Structured,
    pub(crate) readonly: bool,
}

/// A reactive wrapper over one structured raw value.
///
/// Cloning shares the wrapper; equality between handle values is wrapper
/// identity.
#[derive(Clone)]
pub struct Handle(pub(crate) Arc<HandleInner>);

impl Handle {
    pub(crate) fn new(runtime: Runtime, target: Structured, readonly: bool) -> Self {
        Self(Arc::new(HandleInner {
            runtime,
            target,
            readonly,
        }))
    }

    pub fn is_readonly(&self) -> bool {
        self.0.readonly
    }

    pub fn target_id(&self) -> TargetId {
        self.0.target.id()
    }

    pub(crate) fn target(&self) -> &Structured {
        &self.0.target
    }

    /// The raw value this handle wraps.
    pub fn raw_value(&self) -> Value {
        self.0.target.to_value()
    }

    /// Read the value at `key`, recording a dependency for the active
    /// computation.
    ///
    /// Structured results come back wrapped; a boxed cell stored at the key
    /// comes back as its current slot value instead (the cell records its
    /// own dependency, this read records none on the key).
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        let resolved = self.raw_get(&key);

        if let Some(Value::Cell(cell)) = &resolved {
            return cell.get();
        }

        self.0.runtime.track(self.target_id(), DepKey::from(&key));
        match resolved {
            Some(value) if value.is_structured() => {
                if self.0.readonly {
                    self.0.runtime.wrap_readonly(value)
                } else {
                    self.0.runtime.wrap(value)
                }
            }
            Some(value) => value,
            None => Value::Null,
        }
    }

    pub(crate) fn raw_get(&self, key: &Key) -> Option<Value> {
        match (&self.0.target, key) {
            (Structured::Record(record), Key::Prop(name)) => record.get(name),
            (Structured::List(list), Key::Index(index)) => list.get(*index),
            (Structured::Map(map), Key::Entry(entry)) => map.get(entry),
            (Structured::Set(set), Key::Entry(entry)) => {
                if set.contains(entry) {
                    Some(entry.clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Write `value` at `key`.
    ///
    /// The value is unwrapped to raw form first; a raw container never
    /// stores a wrapper. If the key currently holds a boxed cell and the
    /// incoming value is not itself a cell, the write mutates the cell's
    /// slot instead of replacing the cell.
    pub fn set(&self, key: impl Into<Key>, value: Value) -> Result<WriteOutcome, crate::error::ReactiveError> {
        let key = key.into();
        if self.rejects_mutation("set", &key) {
            return Ok(WriteOutcome::Rejected);
        }

        let value = unwrap(value);
        let existing = self.raw_get(&key);
        if let Some(Value::Cell(cell)) = &existing {
            if !matches!(value, Value::Cell(_)) {
                cell.set(value)?;
                return Ok(WriteOutcome::Changed);
            }
        }

        let outcome = match (&self.0.target, &key) {
            (Structured::Record(record), Key::Prop(name)) => {
                let old = record.insert(Arc::clone(name), value.clone());
                classify(old, &value)
            }
            (Structured::List(list), Key::Index(index)) => {
                if *index < list.len() {
                    let old = list.set(*index, value.clone());
                    classify(old, &value)
                } else {
                    list.pad_and_push(*index, value.clone());
                    WriteOutcome::Added
                }
            }
            (Structured::Map(map), Key::Entry(entry)) => {
                let old = map.insert(entry.clone(), value.clone());
                classify(old, &value)
            }
            (Structured::Set(set), Key::Entry(entry)) => {
                if set.insert(entry.clone()) {
                    WriteOutcome::Added
                } else {
                    WriteOutcome::Unchanged
                }
            }
            _ => WriteOutcome::Unchanged,
        };

        match outcome {
            WriteOutcome::Added => {
                self.0
                    .runtime
                    .trigger(self.target_id(), DepKey::from(&key), ChangeKind::Add);
            }
            WriteOutcome::Changed => {
                self.0
                    .runtime
                    .trigger(self.target_id(), DepKey::from(&key), ChangeKind::Set);
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Remove the value at `key` if present.
    pub fn remove(&self, key: impl Into<Key>) -> WriteOutcome {
        let key = key.into();
        if self.rejects_mutation("delete", &key) {
            return WriteOutcome::Rejected;
        }

        let removed = match (&self.0.target, &key) {
            (Structured::Record(record), Key::Prop(name)) => record.remove(name).is_some(),
            (Structured::List(list), Key::Index(index)) => list.remove(*index).is_some(),
            (Structured::Map(map), Key::Entry(entry)) => map.remove(entry).is_some(),
            (Structured::Set(set), Key::Entry(entry)) => set.remove(entry),
            _ => false,
        };

        if removed {
            self.0
                .runtime
                .trigger(self.target_id(), DepKey::from(&key), ChangeKind::Remove);
            WriteOutcome::Removed
        } else {
            WriteOutcome::Missing
        }
    }

    /// Presence check, recording a dependency on the key.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.0.runtime.track(self.target_id(), DepKey::from(&key));
        match (&self.0.target, &key) {
            (Structured::Record(record), Key::Prop(name)) => record.contains_key(name),
            (Structured::List(list), Key::Index(index)) => *index < list.len(),
            (Structured::Map(map), Key::Entry(entry)) => map.contains_key(entry),
            (Structured::Set(set), Key::Entry(entry)) => set.contains(entry),
            _ => false,
        }
    }

    /// Own keys of the wrapped container, recording a dependency on the
    /// enumeration marker (the length marker for lists). Enumeration is
    /// invalidated by key adds and removes, not by value changes.
    pub fn keys(&self) -> Vec<Key> {
        self.0.runtime.track(self.target_id(), self.iteration_marker());
        match &self.0.target {
            Structured::Record(record) => record.keys().into_iter().map(Key::Prop).collect(),
            Structured::List(list) => (0..list.len()).map(Key::Index).collect(),
            Structured::Map(map) => map.keys().into_iter().map(Key::Entry).collect(),
            Structured::Set(set) => set.members().into_iter().map(Key::Entry).collect(),
        }
    }

    /// Number of keys/items, tracked like [`Handle::keys`].
    pub fn len(&self) -> usize {
        self.0.runtime.track(self.target_id(), self.iteration_marker());
        match &self.0.target {
            Structured::Record(record) => record.len(),
            Structured::List(list) => list.len(),
            Structured::Map(map) => map.len(),
            Structured::Set(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the container, invalidating every subscriber under the target.
    pub fn clear(&self) -> WriteOutcome {
        if self.0.readonly && !self.0.runtime.readonly_unlocked() {
            warn!("clear operation failed: target is readonly.");
            return WriteOutcome::Rejected;
        }

        let had_entries = match &self.0.target {
            Structured::Record(record) => !record.is_empty(),
            Structured::List(list) => !list.is_empty(),
            Structured::Map(map) => !map.is_empty(),
            Structured::Set(set) => !set.is_empty(),
        };
        match &self.0.target {
            Structured::Record(record) => record.clear(),
            Structured::List(list) => list.clear(),
            Structured::Map(map) => map.clear(),
            Structured::Set(set) => set.clear(),
        }

        if had_entries {
            self.0
                .runtime
                .trigger(self.target_id(), self.iteration_marker(), ChangeKind::Clear);
            WriteOutcome::Changed
        } else {
            WriteOutcome::Unchanged
        }
    }

    fn iteration_marker(&self) -> DepKey {
        if self.0.target.is_list() {
            DepKey::Length
        } else {
            DepKey::Iterate
        }
    }

    fn rejects_mutation(&self, operation: &str, key: &Key) -> bool {
        if self.0.readonly && !self.0.runtime.readonly_unlocked() {
            warn!(
                "{} operation on key \"{}\" failed: target is readonly.",
                operation, key
            );
            true
        } else {
            false
        }
    }

    pub(crate) fn identity_hash<H: Hasher>(&self, state: &mut H) {
        self.target_id().hash(state);
        self.0.readonly.hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.readonly {
            write!(f, "readonly({:?})", self.0.target)
        } else {
            write!(f, "handle({:?})", self.0.target)
        }
    }
}

fn classify(old: Option<Value>, new: &Value) -> WriteOutcome {
    match old {
        None => WriteOutcome::Added,
        Some(old) if old == *new => WriteOutcome::Unchanged,
        Some(_) => WriteOutcome::Changed,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
