// crates/core/src/lib.rs
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod mapping;
pub mod types;
pub mod wire;

pub use client::{Artifact, HttpBackend, JobBackend, ManualParams, SubmitRequest, Upload};
pub use config::{Config, ErrorPolicy, PollingConfig};
pub use error::*;
pub use job::{Job, Rejection, Transition};
pub use types::*;
pub use wire::{JobUpdate, StatusPayload, WireStatus};
