//! Derived Values
//!
//! A derived cell memoizes a getter behind a deferred, derived-flagged
//! computation and a dirty flag that starts true.
//!
//! # How Derived Values Work
//!
//! 1. Nothing computes at construction time; the first read runs the
//!    getter, caches its result, and clears the dirty flag.
//!
//! 2. When a dependency of the getter changes, the derived computation is
//!    not re-run. Its scheduler sets the dirty flag and notifies
//!    subscribers on the cell's own key.
//!
//! 3. The next read sees the dirty flag and recomputes; reads on a clean
//!    cell return the cache. Every read records the reader's dependency on
//!    the cell's key, clean or not.
//!
//! Because the derived computation carries the derived flag, triggers
//! process it before any ordinary observer, so an observer re-running in
//! the same cycle never sees a stale cached value.
//!
//! Writing through a derived cell requires a setter; the setter is trusted
//! to mutate state that re-dirties the cell through normal graph triggers,
//! so cache and dirty flag are left untouched by the write itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tracing::error;

use crate::error::ReactiveError;
use crate::value::{TargetId, Value};

use super::cell::{Cell, CellInner, CellKind};
use super::computation::{Computation, ComputationOptions};
use super::graph::{ChangeKind, DepKey};
use super::runtime::Runtime;

pub(crate) type SetterFn = dyn Fn(Value) + Send + Sync;

pub(crate) struct DerivedState {
    dirty: AtomicBool,
    cached: RwLock<Value>,
    computation: OnceLock<Computation>,
    setter: Option<Box<SetterFn>>,
}

impl DerivedState {
    pub(crate) fn read(&self, id: TargetId, runtime: &Runtime, track: bool) -> Value {
        if track {
            runtime.track(id, DepKey::CellValue);
        }
        if self.dirty.load(Ordering::SeqCst) {
            let computation = self
                .computation
                .get()
                .expect("derived computation installed");
            if runtime.stack_contains(computation.id()) {
                panic!("derived value depends on itself");
            }
            let value = computation.run();
            *self.cached.write().expect("derived cache lock poisoned") = value;
            self.dirty.store(false, Ordering::SeqCst);
        }
        self.cached
            .read()
            .expect("derived cache lock poisoned")
            .clone()
    }

    pub(crate) fn write(&self, value: Value) -> Result<(), ReactiveError> {
        match &self.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                error!("cannot write to a derived value that has no setter");
                Err(ReactiveError::MissingSetter)
            }
        }
    }
}

impl Runtime {
    /// Create a read-only derived value from a getter.
    pub fn derive<G>(&self, getter: G) -> Cell
    where
        G: Fn() -> Value + Send + Sync + 'static,
    {
        self.derive_inner(Box::new(getter), None)
    }

    /// Create a read-write derived value from a getter and a setter.
    pub fn derive_writable<G, S>(&self, getter: G, setter: S) -> Cell
    where
        G: Fn() -> Value + Send + Sync + 'static,
        S: Fn(Value) + Send + Sync + 'static,
    {
        self.derive_inner(Box::new(getter), Some(Box::new(setter)))
    }

    fn derive_inner(
        &self,
        getter: Box<dyn Fn() -> Value + Send + Sync>,
        setter: Option<Box<SetterFn>>,
    ) -> Cell {
        let cell = Cell(Arc::new(CellInner {
            id: TargetId::new(),
            runtime: self.clone(),
            kind: CellKind::Derived(DerivedState {
                dirty: AtomicBool::new(true),
                cached: RwLock::new(Value::Null),
                computation: OnceLock::new(),
                setter,
            }),
        }));

        // The scheduler marks the cell dirty and notifies its subscribers
        // instead of recomputing; recomputation waits for the next read.
        let weak = Arc::downgrade(&cell.0);
        let runtime = self.clone();
        let computation = self.create_computation(
            move || getter(),
            ComputationOptions {
                deferred: true,
                derived: true,
                scheduler: Some(Box::new(move |_computation| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let CellKind::Derived(state) = &inner.kind else {
                        return;
                    };
                    if !state.dirty.swap(true, Ordering::SeqCst) {
                        runtime.trigger(inner.id, DepKey::CellValue, ChangeKind::Set);
                    }
                })),
                ..ComputationOptions::default()
            },
        );

        match &cell.0.kind {
            CellKind::Derived(state) => state
                .computation
                .set(computation)
                .expect("derived computation installed twice"),
            _ => unreachable!("derive_inner builds a derived cell"),
        }
        cell
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
