//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis fine-grained
//! reactive state engine. It implements:
//!
//! - An identity registry for wrapped values
//! - An interception layer that observes reads, writes, deletes, and
//!   enumeration on structured values
//! - A dependency graph and effect-scheduling runtime
//! - Derived (memoized) values and boxed cells built on top
//!
//! Dependency discovery is automatic: computations subscribe to exactly
//! the state they read, with no explicit subscribe or unsubscribe calls,
//! and stale subscriptions are pruned on every re-run. The core is
//! UI-agnostic; rendering, components, and batching schedulers live with
//! the host.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: dynamic value model shared by everything else
//! - `observe`: identity registry and the intercepting wrapper handles
//! - `reactive`: dependency graph, computations, cells, derived values
//! - `error`: the hard errors surfaced to callers
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::{ComputationOptions, Runtime};
//! use trellis_core::value::Value;
//!
//! let runtime = Runtime::new();
//! let state = runtime.wrap(Value::record([("count", Value::number(0.0))]));
//! let handle = state.as_handle().expect("records wrap").clone();
//!
//! let doubled = {
//!     let handle = handle.clone();
//!     runtime.derive(move || {
//!         Value::number(handle.get("count").as_number().unwrap_or(0.0) * 2.0)
//!     })
//! };
//!
//! let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
//! let observer = {
//!     let seen = seen.clone();
//!     let doubled = doubled.clone();
//!     runtime.create_computation(
//!         move || {
//!             let value = doubled.get();
//!             seen.lock().unwrap().push(value.as_number().unwrap_or(0.0));
//!             value
//!         },
//!         ComputationOptions::default(),
//!     )
//! };
//!
//! handle.set("count", Value::number(3.0)).expect("mutable write");
//! assert_eq!(seen.lock().unwrap().as_slice(), &[0.0, 6.0]);
//! observer.stop();
//! ```

pub mod error;
pub mod observe;
pub mod reactive;
pub mod value;
