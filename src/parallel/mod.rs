//! Parallel parsing pipeline.
//!
//! # Module structure
//!
//! - `chunks`: stream data, pieces of work, and the forward/backward
//!   one-step-behind chunk generators
//! - `worker`: per-worker state and chunk processing
//! - `runner`: worker threads over bounded channels with in-order delivery

pub(crate) mod chunks;
pub(crate) mod runner;
pub(crate) mod worker;
