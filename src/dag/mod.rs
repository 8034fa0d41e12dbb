// src/dag/mod.rs

//! Pipeline graph resolution and scheduling predicates.
//!
//! - [`graph`] resolves the input and output pipes of each step.
//! - [`scheduler`] answers which step may start, which output volume may be
//!   reclaimed, and what the terminal outcome of a run is.

pub mod graph;
pub mod scheduler;

pub use graph::PipeGraph;
pub use scheduler::Scheduler;
