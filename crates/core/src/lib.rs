//! Domain types for the generation-task orchestration engine.
//!
//! Everything in this crate is pure data and pure logic: request
//! validation, the task lifecycle state machine, the bounded FIFO queue,
//! job profiles and progress estimation. No I/O happens here.

pub mod error;
pub mod job_profile;
pub mod progress;
pub mod queue;
pub mod request;
pub mod task;
pub mod types;
