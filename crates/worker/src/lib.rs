//! Generation worker: configuration and request intake for the
//! `tunegen-worker` binary.

pub mod config;
pub mod intake;

pub use config::{ConfigError, LogFormat, WorkerConfig};
