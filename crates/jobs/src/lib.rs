// crates/jobs/src/lib.rs
//! Client-side tracking of long-running backend jobs.
//!
//! Provides:
//! - `JobTracker`: owns one job slot per track, submits, polls and publishes
//! - `PollPolicy`: interval, timeout and per-track error handling
//! - `TrackerEvent` / `TrackerSnapshot`: what observers see
//! - `ArtifactView`: dependent view that fetches artifacts on completion

pub mod policy;
mod poller;
pub mod tracker;
pub mod types;
pub mod views;

pub use policy::PollPolicy;
pub use tracker::JobTracker;
pub use types::{CompletedJob, TrackerEvent, TrackerSnapshot};
pub use views::{ArtifactFetch, ArtifactView};
