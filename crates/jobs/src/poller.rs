// crates/jobs/src/poller.rs
//! Fixed-interval status polling for one job.

use std::sync::Arc;

use posboard_core::{FailureCause, JobId, Track};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::policy::{ErrorVerdict, FailureCounter};
use crate::tracker::{PollOutcome, Shared};

pub(crate) struct PollTask {
    pub(crate) shared: Arc<Shared>,
    pub(crate) track: Track,
    pub(crate) id: JobId,
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
}

/// Poll until the job is terminal, superseded, or `token` is cancelled.
///
/// Each request is awaited before the next tick and missed ticks are skipped,
/// so a job never has two status requests in flight.
pub(crate) async fn run(task: PollTask) {
    let span = info_span!("poll", job_id = %task.id, track = %task.track, generation = task.generation);
    poll_loop(task).instrument(span).await
}

async fn poll_loop(task: PollTask) {
    let PollTask {
        shared,
        track,
        id,
        generation,
        token,
    } = task;
    let policy = shared.policy.clone();

    let started = Instant::now();
    let mut ticker = time::interval_at(started + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures = FailureCounter::new(policy.on_error(track));
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("polling cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        if seq == 0 && !shared.mark_processing(track, generation) {
            return;
        }

        if let Some(limit) = policy.timeout {
            if started.elapsed() >= limit {
                shared.fail(
                    track,
                    generation,
                    FailureCause::TimedOut,
                    format!("no terminal status after {}s", limit.as_secs()),
                    None,
                );
                return;
            }
        }

        seq += 1;
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(seq, "polling cancelled with a request in flight");
                return;
            }
            outcome = poll_once(&shared, track, &id, generation, seq, &mut failures) => outcome,
        };

        match outcome {
            PollOutcome::Continue | PollOutcome::Stale => {}
            PollOutcome::Finished | PollOutcome::Superseded => return,
        }
    }
}

/// One status request, applied under the forward-only rule.
async fn poll_once(
    shared: &Shared,
    track: Track,
    id: &JobId,
    generation: u64,
    seq: u64,
    failures: &mut FailureCounter,
) -> PollOutcome {
    match shared.backend.status(track, id).await {
        Ok(payload) => {
            failures.reset();
            debug!(seq, status = ?payload.status, "status polled");
            shared.apply_poll(track, generation, seq, payload.into_update(track, id))
        }
        Err(err) if err.is_session_expired() => shared.fail(
            track,
            generation,
            FailureCause::SessionExpired,
            err.user_message(),
            err.status(),
        ),
        Err(err) => match failures.record() {
            ErrorVerdict::Retry { consecutive } => {
                warn!(seq, consecutive, error = %err, "status poll failed, retrying");
                PollOutcome::Continue
            }
            ErrorVerdict::GiveUp => shared.fail(
                track,
                generation,
                FailureCause::Transport,
                err.to_string(),
                err.status(),
            ),
        },
    }
}
