//! Tracking Scope
//!
//! While a computation runs, it sits on the runtime's active-execution
//! stack; reads performed anywhere below it subscribe it to what they read.
//! The stack is explicit state on the runtime (not the host call stack), so
//! nesting works across any call shape, and the guard here makes the pop
//! unconditional: a panic inside a computation body unwinds through the
//! guard and still leaves the stack balanced.

use std::sync::Arc;

use super::computation::{ComputationId, ComputationInner};
use super::runtime::Runtime;

/// Guard that pops the active-execution stack when dropped.
pub(crate) struct TrackScope {
    runtime: Runtime,
    id: ComputationId,
}

impl TrackScope {
    /// Push a computation onto the runtime's active-execution stack.
    ///
    /// The computation stays active until the returned guard is dropped.
    pub(crate) fn enter(runtime: &Runtime, computation: Arc<ComputationInner>) -> Self {
        let id = computation.id;
        runtime.push_active(computation);
        Self {
            runtime: runtime.clone(),
            id,
        }
    }
}

impl Drop for TrackScope {
    fn drop(&mut self) {
        let popped = self.runtime.pop_active();

        // Catch mismatched push/pop pairs early.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.id, self.id,
                "track scope mismatch: expected {:?}, got {:?}",
                self.id, entry.id
            );
        }
    }
}
