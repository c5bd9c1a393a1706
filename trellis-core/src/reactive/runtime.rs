//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects wrappers, cells,
//! derived values, and computations. It owns the dependency graph, the
//! active-execution stack, and the identity registries, and it schedules
//! re-runs when tracked state changes.
//!
//! # How It Works
//!
//! 1. Wrapping a value registers nothing by itself; edges appear only when
//!    a computation reads through a wrapper or cell.
//!
//! 2. When a read happens while a computation is on the execution stack,
//!    the runtime records the dependency (target identity, key) for it.
//!
//! 3. When a write happens, the runtime:
//!    a. Selects the subscriber sets the change contributes to
//!    b. Partitions the subscribers into derived and ordinary computations
//!    c. Invokes every derived computation before any ordinary one
//!    d. Hands each computation to its scheduler when one is set
//!
//! # One Runtime Per Graph
//!
//! The runtime is an explicit, cheaply-cloneable context object rather than
//! a process-wide singleton. Independent runtimes have fully independent
//! graphs and registries, which keeps isolated test runs trivially
//! possible. All access is assumed to happen on one logical thread; a host
//! with real parallelism must serialize calls into a runtime itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::observe::registry::IdentityRegistry;
use crate::value::{TargetId, Value};

use super::computation::{
    Computation, ComputationId, ComputationInner, ComputationOptions, TrackEvent, TriggerEvent,
};
use super::graph::{ChangeKind, DepGraph, DepKey};

pub(crate) struct RuntimeInner {
    pub(crate) graph: DepGraph,
    pub(crate) registry: IdentityRegistry,
    stack: RwLock<Vec<Arc<ComputationInner>>>,
    computations: RwLock<HashMap<ComputationId, Weak<ComputationInner>>>,
    computations_watermark: AtomicUsize,
    paused: AtomicBool,
    unlocked: AtomicBool,
}

/// A reactive runtime: one dependency graph plus its identity registries.
///
/// Cloning is cheap and yields another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                graph: DepGraph::new(),
                registry: IdentityRegistry::new(),
                stack: RwLock::new(Vec::new()),
                computations: RwLock::new(HashMap::new()),
                computations_watermark: AtomicUsize::new(64),
                paused: AtomicBool::new(false),
                unlocked: AtomicBool::new(false),
            }),
        }
    }

    /// Register a computation with this runtime.
    ///
    /// The function runs immediately unless `options.deferred` is set.
    pub fn create_computation<F>(&self, f: F, options: ComputationOptions) -> Computation
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let ComputationOptions {
            deferred,
            derived,
            scheduler,
            on_track,
            on_trigger,
            on_stop,
        } = options;

        let inner = Arc::new(ComputationInner {
            id: ComputationId::new(),
            runtime: self.clone(),
            func: Box::new(f),
            derived,
            active: AtomicBool::new(true),
            deps: RwLock::new(SmallVec::new()),
            scheduler,
            on_track,
            on_trigger,
            on_stop,
            run_count: AtomicUsize::new(0),
        });
        self.register_computation(&inner);

        let computation = Computation(inner);
        if !deferred {
            computation.run();
        }
        computation
    }

    fn register_computation(&self, inner: &Arc<ComputationInner>) {
        let mut registry = self
            .inner
            .computations
            .write()
            .expect("computation registry lock poisoned");

        // The registry holds weak references only; sweep dead entries once
        // the table outgrows its watermark.
        if registry.len() >= self.inner.computations_watermark.load(Ordering::Relaxed) {
            registry.retain(|_, weak| weak.strong_count() > 0);
            self.inner
                .computations_watermark
                .store((registry.len() * 2).max(64), Ordering::Relaxed);
        }

        registry.insert(inner.id, Arc::downgrade(inner));
    }

    pub(crate) fn unregister_computation(&self, id: ComputationId) {
        self.inner
            .computations
            .write()
            .expect("computation registry lock poisoned")
            .remove(&id);
    }

    // ------------------------------------------------------------------
    // Execution stack
    // ------------------------------------------------------------------

    pub(crate) fn push_active(&self, computation: Arc<ComputationInner>) {
        self.inner
            .stack
            .write()
            .expect("stack lock poisoned")
            .push(computation);
    }

    pub(crate) fn pop_active(&self) -> Option<Arc<ComputationInner>> {
        self.inner.stack.write().expect("stack lock poisoned").pop()
    }

    pub(crate) fn active_computation(&self) -> Option<Arc<ComputationInner>> {
        self.inner
            .stack
            .read()
            .expect("stack lock poisoned")
            .last()
            .cloned()
    }

    pub(crate) fn stack_contains(&self, id: ComputationId) -> bool {
        self.inner
            .stack
            .read()
            .expect("stack lock poisoned")
            .iter()
            .any(|c| c.id == id)
    }

    /// Whether a read right now would record a dependency.
    pub fn is_tracking(&self) -> bool {
        !self.inner.paused.load(Ordering::SeqCst) && self.active_computation().is_some()
    }

    // ------------------------------------------------------------------
    // Track / trigger
    // ------------------------------------------------------------------

    /// Record that the active computation read (target, key).
    ///
    /// No-op when tracking is paused or no computation is running.
    /// Membership is idempotent; the `on_track` hook fires only on
    /// first-time addition.
    pub(crate) fn track(&self, target: TargetId, key: DepKey) {
        if self.inner.paused.load(Ordering::SeqCst) {
            return;
        }
        let Some(active) = self.active_computation() else {
            return;
        };

        let dep = self.inner.graph.set_for(target, key.clone());
        let inserted = dep
            .write()
            .expect("subscriber set lock poisoned")
            .insert(active.id);
        if inserted {
            active
                .deps
                .write()
                .expect("deps lock poisoned")
                .push(Arc::clone(&dep));
            if let Some(hook) = &active.on_track {
                hook(&TrackEvent { target, key });
            }
        }
    }

    /// Notify everything subscribed to (target, key) of a change.
    ///
    /// Derived computations are invoked before ordinary ones, so an
    /// ordinary observer can never read a stale cached derived value
    /// mid-cycle. Each invocation is direct unless the computation carries
    /// a scheduler, in which case the handle is passed over and nothing
    /// else happens here.
    pub(crate) fn trigger(&self, target: TargetId, key: DepKey, change: ChangeKind) {
        let sets = self.inner.graph.contributing(target, &key, change);
        if sets.is_empty() {
            return;
        }

        let mut seen: IndexSet<ComputationId> = IndexSet::new();
        for set in &sets {
            for id in set.read().expect("subscriber set lock poisoned").iter() {
                seen.insert(*id);
            }
        }
        if seen.is_empty() {
            self.inner.graph.sweep(target);
            return;
        }

        let mut derived: Vec<Arc<ComputationInner>> = Vec::new();
        let mut ordinary: Vec<Arc<ComputationInner>> = Vec::new();
        let mut dead: SmallVec<[ComputationId; 4]> = SmallVec::new();
        {
            let registry = self
                .inner
                .computations
                .read()
                .expect("computation registry lock poisoned");
            for id in &seen {
                match registry.get(id).and_then(Weak::upgrade) {
                    Some(computation) if computation.derived => derived.push(computation),
                    Some(computation) => ordinary.push(computation),
                    None => dead.push(*id),
                }
            }
        }

        // Subscribers whose computation was dropped without a stop() can
        // never run again; drop their membership while we are here.
        if !dead.is_empty() {
            for set in &sets {
                let mut set = set.write().expect("subscriber set lock poisoned");
                for id in &dead {
                    set.shift_remove(id);
                }
            }
        }

        for computation in derived.into_iter().chain(ordinary) {
            self.invoke(computation, target, &key, change);
        }
    }

    fn invoke(
        &self,
        computation: Arc<ComputationInner>,
        target: TargetId,
        key: &DepKey,
        change: ChangeKind,
    ) {
        if let Some(hook) = &computation.on_trigger {
            hook(&TriggerEvent {
                target,
                key: key.clone(),
                change,
            });
        }
        let computation = Computation(computation);
        match &computation.0.scheduler {
            Some(scheduler) => scheduler(&computation),
            None => {
                computation.run();
            }
        }
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    /// Stop recording dependencies until [`Runtime::resume_tracking`].
    ///
    /// A plain flag, not a counter; nested callers save and restore via
    /// [`Runtime::tracking_paused`].
    pub fn pause_tracking(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume_tracking(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
    }

    pub fn tracking_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Whether writes through read-only handles are currently admitted.
    pub(crate) fn readonly_unlocked(&self) -> bool {
        self.inner.unlocked.load(Ordering::SeqCst)
    }

    /// Admit writes through read-only handles. Reserved for controlled
    /// internal resets by the host; not part of the supported surface.
    #[doc(hidden)]
    pub fn set_readonly_unlocked(&self, unlocked: bool) {
        self.inner.unlocked.store(unlocked, Ordering::SeqCst);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
