//! Task lifecycle: claim, setup, run, teardown, rollback, final state.
//!
//! - `outcome`: the closed result of a run
//! - `hooks`: per-kind setup/run/teardown/rollback steps
//! - `engine`: drives a task through its lifecycle and persists the result

mod engine;
mod hooks;
mod outcome;

pub use engine::Engine;
pub use outcome::RunOutcome;
