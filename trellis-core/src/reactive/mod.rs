//! Reactive Core
//!
//! This module implements the dependency graph, the effect runtime, and the
//! value layers built on top of them: computations, boxed cells, and
//! derived values.
//!
//! # Concepts
//!
//! ## Computations
//!
//! A Computation is a registered function. While it runs, every read it
//! performs through a wrapper or cell subscribes it to what it read; when
//! any of that state changes, the computation re-runs (or is handed to its
//! scheduler). Subscriptions are re-derived from scratch on every run, so
//! reads a run no longer performs stop triggering it.
//!
//! ## Cells
//!
//! A Cell is single-slot reactive storage for values that wrapping cannot
//! observe, primitives in particular. Field cells project one record field
//! through its source wrapper.
//!
//! ## Derived Values
//!
//! A derived value is a memoized computation exposed as a readable cell.
//! It recomputes lazily on the next read after invalidation, and triggers
//! process derived computations before ordinary ones so observers never
//! see a stale cached value mid-cycle.
//!
//! # Implementation Notes
//!
//! All coordination state lives on an explicit [`Runtime`] object rather
//! than in process-wide globals, so independent graphs can coexist in one
//! process. The active computation is tracked on an explicit execution
//! stack with a drop guard, which keeps the bookkeeping correct across
//! nesting and panics.

mod cell;
mod computation;
mod context;
mod derived;
mod graph;
mod runtime;

pub use cell::{cells_from_record, is_cell, Cell};
pub use computation::{
    Computation, ComputationId, ComputationOptions, SchedulerFn, StopHookFn, TrackEvent,
    TrackHookFn, TriggerEvent, TriggerHookFn,
};
pub use graph::{ChangeKind, DepKey};
pub use runtime::Runtime;
