// crates/cli/src/progress.rs
//! Terminal progress bar driven by tracker events.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use posboard_core::{Job, JobStatus};
use posboard_jobs::TrackerEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

const TEMPLATE: &str = "  {spinner} [{bar:30}] {pos:>3}% {msg}";

pub struct JobProgress {
    bar: ProgressBar,
    job: Job,
}

impl JobProgress {
    pub fn new(job: Job) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self::with_bar(bar, job)
    }

    fn with_bar(bar: ProgressBar, job: Job) -> Self {
        bar.set_message(job.message.clone());
        Self { bar, job }
    }

    /// Apply one event. Returns true once the followed job is finished or no
    /// longer tracked.
    pub fn apply(&mut self, event: &TrackerEvent) -> bool {
        match event {
            TrackerEvent::Updated { job } if job.id == self.job.id => {
                self.update(job);
                false
            }
            TrackerEvent::Completed { job } if job.id == self.job.id => {
                self.update(job);
                self.bar.finish_and_clear();
                true
            }
            TrackerEvent::Failed { job, .. } if job.id == self.job.id => {
                self.bar.abandon_with_message(format!("failed: {}", job.message));
                true
            }
            TrackerEvent::Superseded { id, .. } | TrackerEvent::Stopped { id, .. }
                if *id == self.job.id =>
            {
                self.bar.abandon_with_message("stopped");
                true
            }
            _ => false,
        }
    }

    fn update(&mut self, job: &Job) {
        if let Some(progress) = job.progress {
            self.bar.set_position(u64::from(progress));
        }
        let message = match (&job.current_step, job.status) {
            (Some(step), JobStatus::Processing) => format!("{}: {step}", job.message),
            _ => job.message.clone(),
        };
        self.bar.set_message(message);
        self.job = job.clone();
    }
}

/// Render progress for `job` until it finishes or the tracker goes away.
pub async fn follow(mut events: broadcast::Receiver<TrackerEvent>, job: Job) {
    let mut progress = JobProgress::new(job);
    loop {
        match events.recv().await {
            Ok(event) => {
                if progress.apply(&event) {
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "progress display lagged"),
            Err(RecvError::Closed) => {
                progress.bar.abandon();
                return;
            }
        }
    }
}
