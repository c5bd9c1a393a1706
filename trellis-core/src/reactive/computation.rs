//! Computations
//!
//! A Computation is a registered function that the runtime re-runs (or
//! hands to a scheduler) whenever one of its recorded dependencies changes.
//!
//! # How Computations Work
//!
//! 1. When created, the computation runs immediately unless deferred,
//!    establishing its initial subscriptions.
//!
//! 2. Every re-run first detaches the computation from every subscriber set
//!    it belongs to, then re-subscribes from scratch while the function
//!    executes. Subscriptions that a run no longer exercises disappear, so
//!    the graph never accumulates ghost edges.
//!
//! 3. Stopping is terminal: the computation detaches from everything and
//!    never re-subscribes. Invoking a stopped computation directly still
//!    runs the function, it just tracks nothing.
//!
//! # Scheduling
//!
//! A computation may carry a scheduler callback. When one is set, triggers
//! hand the computation to the scheduler instead of running it; deferral or
//! batching policy belongs entirely to the scheduler. Derived values use
//! this hook to mark themselves dirty instead of recomputing eagerly.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use smallvec::SmallVec;

use crate::value::{TargetId, Value};

use super::context::TrackScope;
use super::graph::{ChangeKind, DepKey, DepSet};
use super::runtime::Runtime;

/// Unique identifier for a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Generate a new unique computation ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComputationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Dependency-recording notification passed to the `on_track` hook.
#[derive(Debug, Clone)]
pub struct TrackEvent {
    pub target: TargetId,
    pub key: DepKey,
}

/// Invalidation notification passed to the `on_trigger` hook.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub target: TargetId,
    pub key: DepKey,
    pub change: ChangeKind,
}

pub type SchedulerFn = dyn Fn(&Computation) + Send + Sync;
pub type TrackHookFn = dyn Fn(&TrackEvent) + Send + Sync;
pub type TriggerHookFn = dyn Fn(&TriggerEvent) + Send + Sync;
pub type StopHookFn = dyn Fn() + Send + Sync;

/// Options accepted by [`Runtime::create_computation`].
///
/// The hooks are diagnostic only: `on_track` fires on first-time
/// subscription to a dependency key, `on_trigger` fires when an
/// invalidation reaches the computation, `on_stop` fires once when the
/// computation is stopped.
#[derive(Default)]
pub struct ComputationOptions {
    /// Skip the initial run.
    pub deferred: bool,
    /// Process this computation ahead of ordinary ones during triggers.
    pub derived: bool,
    /// Receives the computation instead of a direct re-run.
    pub scheduler: Option<Box<SchedulerFn>>,
    pub on_track: Option<Box<TrackHookFn>>,
    pub on_trigger: Option<Box<TriggerHookFn>>,
    pub on_stop: Option<Box<StopHookFn>>,
}

pub(crate) struct ComputationInner {
    pub(crate) id: ComputationId,
    pub(crate) runtime: Runtime,
    pub(crate) func: Box<dyn Fn() -> Value + Send + Sync>,
    pub(crate) derived: bool,
    pub(crate) active: AtomicBool,
    /// Subscriber sets this computation currently belongs to, in
    /// subscription order. Detaching walks this list once.
    pub(crate) deps: RwLock<SmallVec<[DepSet; 4]>>,
    pub(crate) scheduler: Option<Box<SchedulerFn>>,
    pub(crate) on_track: Option<Box<TrackHookFn>>,
    pub(crate) on_trigger: Option<Box<TriggerHookFn>>,
    pub(crate) on_stop: Option<Box<StopHookFn>>,
    pub(crate) run_count: AtomicUsize,
}

/// A registered computation. Cloning shares the underlying state.
#[derive(Clone)]
pub struct Computation(pub(crate) Arc<ComputationInner>);

impl Computation {
    pub fn id(&self) -> ComputationId {
        self.0.id
    }

    pub fn is_active(&self) -> bool {
        self.0.active.load(Ordering::SeqCst)
    }

    pub fn is_derived(&self) -> bool {
        self.0.derived
    }

    /// Number of times the function has been invoked.
    pub fn run_count(&self) -> usize {
        self.0.run_count.load(Ordering::SeqCst)
    }

    /// Number of subscriber sets this computation currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.0.deps.read().expect("deps lock poisoned").len()
    }

    /// Run the computation's function, re-establishing its subscriptions.
    ///
    /// If the computation is already on the active-execution stack (direct
    /// self-recursion), the function is re-invoked without detaching or
    /// re-registering. A stopped computation runs its function without any
    /// tracking at all.
    pub fn run(&self) -> Value {
        let inner = &self.0;
        inner.run_count.fetch_add(1, Ordering::SeqCst);

        if !inner.active.load(Ordering::SeqCst) {
            return (inner.func)();
        }
        if inner.runtime.stack_contains(inner.id) {
            return (inner.func)();
        }

        // Detach before re-subscribing so subscriptions the new run does
        // not exercise are gone afterwards.
        self.detach();

        let _scope = TrackScope::enter(&inner.runtime, Arc::clone(inner));
        (inner.func)()
    }

    /// Remove this computation from every subscriber set it belongs to.
    pub(crate) fn detach(&self) {
        let mut deps = self.0.deps.write().expect("deps lock poisoned");
        for dep in deps.drain(..) {
            dep.write()
                .expect("subscriber set lock poisoned")
                .shift_remove(&self.0.id);
        }
    }

    /// Stop the computation permanently.
    ///
    /// Severs every subscription, fires the `on_stop` hook, and disables
    /// future auto re-subscription. Idempotent.
    pub fn stop(&self) {
        if self.0.active.swap(false, Ordering::SeqCst) {
            self.detach();
            if let Some(hook) = &self.0.on_stop {
                hook();
            }
            self.0.runtime.unregister_computation(self.0.id);
        }
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.0.id)
            .field("active", &self.is_active())
            .field("derived", &self.0.derived)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
