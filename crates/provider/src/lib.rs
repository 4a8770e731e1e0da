//! Generation provider client library.
//!
//! Defines the logical provider contract ([`client::ProviderClient`]),
//! the status normalization rules applied to poll responses, an HTTP
//! implementation over [`reqwest`], and the backoff math used between
//! status checks after transient faults.

pub mod api;
pub mod backoff;
pub mod client;
pub mod status;

pub use api::HttpProviderClient;
pub use client::{
    CreatedJob, JobStatusReport, JobSubmission, ProviderClient, ProviderError, ResultItem,
};
pub use status::{interpret, normalize_status, NormalizedStatus, StatusVerdict};
