//! Identity Registry
//!
//! Bidirectional, non-owning association between raw structured values and
//! their wrappers. The registry guarantees one wrapper per (raw, variant)
//! pair: wrapping the same raw value twice yields the same handle, and a
//! raw value can have at most one mutable and one read-only wrapper alive
//! at a time.
//!
//! All tables hold weak references keyed by target id. The engine never
//! extends a value's lifetime: when every external reference to a wrapper
//! is gone, its entry is dead and gets swept once the table outgrows a
//! watermark.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::warn;

use crate::reactive::Runtime;
use crate::value::{Structured, TargetId, Value, WeakStructured};

use super::handle::{Handle, HandleInner};

/// A weak-valued table with watermark-based sweeping of dead entries.
struct WeakTable<V> {
    entries: RwLock<HashMap<TargetId, V>>,
    watermark: AtomicUsize,
}

impl<V> WeakTable<V> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            watermark: AtomicUsize::new(64),
        }
    }

    fn insert(&self, id: TargetId, value: V, alive: impl Fn(&V) -> bool) {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.len() >= self.watermark.load(Ordering::Relaxed) {
            entries.retain(|_, v| alive(v));
            self.watermark
                .store((entries.len() * 2).max(64), Ordering::Relaxed);
        }
        entries.insert(id, value);
    }

    fn get(&self, id: TargetId) -> Option<V>
    where
        V: Clone,
    {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned()
    }

    fn contains(&self, id: TargetId) -> bool {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .contains_key(&id)
    }
}

/// Per-runtime wrapper identity state.
pub(crate) struct IdentityRegistry {
    mutable: WeakTable<Weak<HandleInner>>,
    readonly: WeakTable<Weak<HandleInner>>,
    nonreactive: WeakTable<WeakStructured>,
    readonly_marked: WeakTable<WeakStructured>,
}

impl IdentityRegistry {
    pub(crate) fn new() -> Self {
        Self {
            mutable: WeakTable::new(),
            readonly: WeakTable::new(),
            nonreactive: WeakTable::new(),
            readonly_marked: WeakTable::new(),
        }
    }
}

impl Runtime {
    /// Wrap a structured value in a mutable reactive handle.
    ///
    /// Non-structured values pass through unchanged: opaque built-ins
    /// (instants, patterns, pending handles) and values previously marked
    /// non-reactive silently, everything else with a diagnostic. Wrapping
    /// an existing handle of either variant returns it unchanged.
    pub fn wrap(&self, value: Value) -> Value {
        match value {
            Value::Handle(handle) => Value::Handle(handle),
            other => self.wrap_target(other, false),
        }
    }

    /// Wrap a structured value in a read-only reactive handle.
    ///
    /// A read-only handle over an already mutable-wrapped raw value is a
    /// distinct wrapper over the same raw value.
    pub fn wrap_readonly(&self, value: Value) -> Value {
        match value {
            Value::Handle(handle) if handle.is_readonly() => Value::Handle(handle),
            Value::Handle(handle) => {
                let raw = handle.raw_value();
                self.wrap_target(raw, true)
            }
            other => self.wrap_target(other, true),
        }
    }

    fn wrap_target(&self, value: Value, readonly: bool) -> Value {
        // Cells are already reactive; nothing to do and nothing to warn
        // about.
        if matches!(value, Value::Cell(_)) {
            return value;
        }
        let Some(target) = value.as_structured() else {
            match &value {
                Value::Instant(_) | Value::Pattern(_) | Value::Pending(_) => {}
                other => warn!("value cannot be made reactive: {:?}", other),
            }
            return value;
        };

        let registry = &self.inner.registry;
        let id = target.id();
        if registry.nonreactive.contains(id) {
            return value;
        }
        let readonly = readonly || registry.readonly_marked.contains(id);
        let table = if readonly {
            &registry.readonly
        } else {
            &registry.mutable
        };

        if let Some(existing) = table.get(id).and_then(|weak| weak.upgrade()) {
            return Value::Handle(Handle(existing));
        }

        let handle = Handle::new(self.clone(), target, readonly);
        table.insert(id, Arc::downgrade(&handle.0), |weak| {
            weak.strong_count() > 0
        });
        Value::Handle(handle)
    }

    /// Exempt a structured value from wrapping. Returns the input.
    ///
    /// Accepts either the raw value or a handle over it; later `wrap` calls
    /// on the raw value become silent no-ops.
    pub fn mark_nonreactive(&self, value: Value) -> Value {
        if let Some(target) = mark_target(&value) {
            self.inner
                .registry
                .nonreactive
                .insert(target.id(), target.downgrade(), WeakStructured::is_alive);
        }
        value
    }

    /// Force later `wrap` calls on a structured value to produce the
    /// read-only variant. Returns the input.
    pub fn mark_readonly(&self, value: Value) -> Value {
        if let Some(target) = mark_target(&value) {
            self.inner
                .registry
                .readonly_marked
                .insert(target.id(), target.downgrade(), WeakStructured::is_alive);
        }
        value
    }
}

fn mark_target(value: &Value) -> Option<Structured> {
    match value {
        Value::Handle(handle) => Some(handle.target().clone()),
        other => other.as_structured(),
    }
}

/// Recover the raw value behind a handle; any other value passes through.
pub fn unwrap(value: Value) -> Value {
    match value {
        Value::Handle(handle) => handle.raw_value(),
        other => other,
    }
}

pub fn is_wrapped(value: &Value) -> bool {
    matches!(value, Value::Handle(_))
}

pub fn is_readonly(value: &Value) -> bool {
    matches!(value, Value::Handle(handle) if handle.is_readonly())
}
