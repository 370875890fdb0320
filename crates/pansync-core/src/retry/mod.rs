//! Retry policy.
//!
//! Classifies engine errors (transient network/remote failures vs integrity,
//! precondition, and remote-state errors) and applies a fixed attempt count
//! with a fixed delay, shared by single remote calls and slice pools.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_remote};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
