//! Error types surfaced by the reactive engine.
//!
//! Most failure modes are absorbed: wrapping an unsupported value and
//! mutating a locked read-only handle are diagnostic-only no-ops. The
//! variants here are the failures that genuinely reach the caller.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReactiveError {
    /// Write attempted on a derived value that was built without a setter.
    #[error("cannot write to a derived value that has no setter")]
    MissingSetter,
}
