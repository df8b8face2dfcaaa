//! Resilience subsystem.
//!
//! # Design Decisions
//! - Gates fail loudly and block; bookkeeping fails quietly and never blocks
//! - Side effects that must not influence the response run detached
//!   through `best_effort`

pub mod best_effort;
