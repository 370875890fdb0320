//! Named-step sequencer with cooperative stop and resume.
//!
//! A runner executes its steps in order, remembering which ones completed so
//! that a later `run()` after a stop or failure resumes at the first
//! unfinished step. Status transitions are published on a watch channel.

mod runner;

pub use runner::{StatusChange, Step, StepFuture, StepRunner, StepStatus};

#[cfg(test)]
mod tests;
