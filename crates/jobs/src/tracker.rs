// crates/jobs/src/tracker.rs
//! Owner of the per-track job records.

use std::sync::{Arc, Mutex, MutexGuard};

use posboard_core::{
    FailureCause, Job, JobBackend, JobError, JobId, JobStatus, JobUpdate, Rejection,
    SubmitRequest, Track, Transition,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::policy::PollPolicy;
use crate::poller::{self, PollTask};
use crate::types::{CompletedJob, TrackerEvent, TrackerSnapshot};

/// Tracks at most one live job per track and decides which track is visible.
///
/// The tracker owns every [`Job`] record. Observers get immutable snapshots
/// through [`JobTracker::subscribe`], [`JobTracker::watch_view`] and
/// [`JobTracker::watch_completed`]; nothing outside the tracker mutates a job.
///
/// Dropping the tracker cancels all poll tasks.
pub struct JobTracker {
    shared: Arc<Shared>,
}

impl JobTracker {
    /// Create a tracker. Must be used inside a tokio runtime because starting
    /// a job spawns its poll task.
    pub fn new(backend: Arc<dyn JobBackend>, policy: PollPolicy) -> Self {
        Self {
            shared: Arc::new(Shared::new(backend, policy)),
        }
    }

    /// Submit a job and start tracking it (`startJob`).
    ///
    /// A failed submission creates no job and leaves both tracks untouched;
    /// the backend's message is returned verbatim inside
    /// [`JobError::Submission`].
    pub async fn start_job(&self, request: SubmitRequest) -> Result<Job, JobError> {
        let track = request.track();
        let id = self.shared.backend.submit(&request).await.map_err(|e| {
            warn!(%track, error = %e, "submission rejected");
            JobError::Submission(e)
        })?;
        Ok(self.start_tracking(track, id))
    }

    /// Track a job whose id the backend already returned.
    ///
    /// The same track's previous job is superseded (its polling stops) and the
    /// other track's record is kept but hidden.
    pub fn start_tracking(&self, track: Track, id: JobId) -> Job {
        let token = self.shared.root.child_token();
        let (job, generation) = self.shared.install(track, id.clone(), token.clone());
        info!(%track, job_id = %id, generation, "tracking job");

        tokio::spawn(poller::run(PollTask {
            shared: Arc::clone(&self.shared),
            track,
            id,
            generation,
            token,
        }));
        job
    }

    /// Stop polling `track` (`stopTracking`). The record stays in place.
    /// Returns false when nothing was being polled.
    pub fn stop_tracking(&self, track: Track) -> bool {
        self.shared.stop(track)
    }

    /// Make `track` the visible panel again and return its last known state.
    pub fn show(&self, track: Track) -> Option<Job> {
        self.shared.show(track)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.shared.watch_view.borrow().clone()
    }

    pub fn job(&self, track: Track) -> Option<Job> {
        self.snapshot().job(track).cloned()
    }

    pub fn visible_job(&self) -> Option<Job> {
        self.snapshot().visible_job().cloned()
    }

    /// Every lifecycle event, in apply order.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.shared.events.subscribe()
    }

    /// Latest snapshot of both tracks.
    pub fn watch_view(&self) -> watch::Receiver<TrackerSnapshot> {
        self.shared.watch_view.subscribe()
    }

    /// Most recently completed job, for dependent views.
    pub fn watch_completed(&self) -> watch::Receiver<Option<CompletedJob>> {
        self.shared.watch_completed.subscribe()
    }

    pub fn backend(&self) -> Arc<dyn JobBackend> {
        Arc::clone(&self.shared.backend)
    }

    /// A token cancelled when the tracker shuts down, for tasks that should
    /// not outlive it.
    pub fn child_token(&self) -> CancellationToken {
        self.shared.root.child_token()
    }

    /// Wait until job `id` on `track` reaches a terminal state.
    ///
    /// Returns the completed job, or the failure as a [`JobError`]. If the job
    /// is superseded or stops being tracked first, returns
    /// [`JobError::NotTracked`].
    pub async fn wait_for(&self, track: Track, id: &JobId) -> Result<Job, JobError> {
        let mut view = self.watch_view();
        loop {
            view.mark_unchanged();
            let Some((job, polling)) = self.shared.tracked(track, id) else {
                return Err(JobError::NotTracked(track));
            };
            match job.status {
                JobStatus::Completed => return Ok(job),
                JobStatus::Failed if job.failure == Some(FailureCause::TimedOut) => {
                    return Err(JobError::TimedOut { id: job.id })
                }
                JobStatus::Failed => {
                    return Err(JobError::JobFailed {
                        id: job.id,
                        message: job.message,
                    })
                }
                JobStatus::Pending | JobStatus::Processing if !polling => {
                    return Err(JobError::NotTracked(track));
                }
                JobStatus::Pending | JobStatus::Processing => {}
            }
            if view.changed().await.is_err() {
                return Err(JobError::NotTracked(track));
            }
        }
    }

    /// Cancel every poll task. Records remain readable.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.shared.root.cancel();
    }
}

/// Result of feeding one poll result into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    /// Job still live; keep polling.
    Continue,
    /// Older than an already applied poll; ignored.
    Stale,
    /// Job reached a terminal state.
    Finished,
    /// A newer job took over the track; this poll loop is obsolete.
    Superseded,
}

#[derive(Default)]
struct TrackSlot {
    job: Option<Job>,
    /// Tracker-wide generation of `job`. Results for any other generation are
    /// discarded.
    generation: u64,
    /// Highest poll sequence applied to `job`.
    last_seq: u64,
    /// Present while `job` is being polled.
    token: Option<CancellationToken>,
}

#[derive(Default)]
struct TrackerState {
    auto: TrackSlot,
    manual: TrackSlot,
    visible: Option<Track>,
    next_generation: u64,
}

impl TrackerState {
    fn slot(&self, track: Track) -> &TrackSlot {
        match track {
            Track::Auto => &self.auto,
            Track::Manual => &self.manual,
        }
    }

    fn slot_mut(&mut self, track: Track) -> &mut TrackSlot {
        match track {
            Track::Auto => &mut self.auto,
            Track::Manual => &mut self.manual,
        }
    }

    fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            visible: self.visible,
            auto: self.auto.job.clone(),
            manual: self.manual.job.clone(),
        }
    }
}

/// State shared between the tracker handle and its poll tasks.
pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn JobBackend>,
    pub(crate) policy: PollPolicy,
    state: Mutex<TrackerState>,
    events: broadcast::Sender<TrackerEvent>,
    watch_view: watch::Sender<TrackerSnapshot>,
    watch_completed: watch::Sender<Option<CompletedJob>>,
    root: CancellationToken,
}

impl Shared {
    pub(crate) fn new(backend: Arc<dyn JobBackend>, policy: PollPolicy) -> Self {
        let (events, _) = broadcast::channel(256);
        let (watch_view, _) = watch::channel(TrackerSnapshot::default());
        let (watch_completed, _) = watch::channel(None);
        Self {
            backend,
            policy,
            state: Mutex::new(TrackerState::default()),
            events,
            watch_view,
            watch_completed,
            root: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("tracker state mutex poisoned, continuing with inner state");
                poisoned.into_inner()
            }
        }
    }

    /// Publish the view and emit `event` while still holding the lock so
    /// observers see changes in apply order.
    fn publish(&self, state: &TrackerState, event: Option<TrackerEvent>) {
        self.watch_view.send_replace(state.snapshot());
        if let Some(event) = event {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    fn install(&self, track: Track, id: JobId, token: CancellationToken) -> (Job, u64) {
        let job = Job::submitted(track, id);
        let mut state = self.lock();
        state.next_generation += 1;
        let generation = state.next_generation;

        let slot = state.slot_mut(track);
        let superseded = match (slot.token.take(), slot.job.as_ref()) {
            (Some(old_token), Some(old)) => {
                old_token.cancel();
                debug!(%track, job_id = %old.id, "superseding job");
                Some(old.id.clone())
            }
            (Some(old_token), None) => {
                old_token.cancel();
                None
            }
            _ => None,
        };
        slot.job = Some(job.clone());
        slot.generation = generation;
        slot.last_seq = 0;
        slot.token = Some(token);
        state.visible = Some(track);

        if let Some(old_id) = superseded {
            let _ = self.events.send(TrackerEvent::Superseded { track, id: old_id });
        }
        self.publish(&state, Some(TrackerEvent::Started { job: job.clone() }));
        (job, generation)
    }

    fn stop(&self, track: Track) -> bool {
        let mut state = self.lock();
        let slot = state.slot_mut(track);
        let Some(token) = slot.token.take() else {
            return false;
        };
        token.cancel();
        let event = slot
            .job
            .as_ref()
            .filter(|job| job.status.is_live())
            .map(|job| TrackerEvent::Stopped {
                track,
                id: job.id.clone(),
            });
        self.publish(&state, event);
        true
    }

    fn show(&self, track: Track) -> Option<Job> {
        let mut state = self.lock();
        let job = state.slot(track).job.clone()?;
        if state.visible != Some(track) {
            state.visible = Some(track);
            self.publish(&state, Some(TrackerEvent::Shown { track }));
        }
        Some(job)
    }

    fn shutdown(&self) {
        let mut state = self.lock();
        for track in Track::ALL {
            let slot = state.slot_mut(track);
            if let Some(token) = slot.token.take() {
                token.cancel();
                if let Some(job) = slot.job.as_ref().filter(|j| j.status.is_live()) {
                    let _ = self.events.send(TrackerEvent::Stopped {
                        track,
                        id: job.id.clone(),
                    });
                }
            }
        }
        self.root.cancel();
        self.publish(&state, None);
    }

    /// Job `id` on `track` and whether it is still polled, read under one
    /// lock so a terminal status is never paired with a stale token.
    pub(crate) fn tracked(&self, track: Track, id: &JobId) -> Option<(Job, bool)> {
        let state = self.lock();
        let slot = state.slot(track);
        let job = slot.job.as_ref().filter(|j| &j.id == id)?;
        Some((job.clone(), slot.token.is_some()))
    }

    /// `Pending -> Processing` as the first poll starts. Returns false if the
    /// generation was superseded.
    pub(crate) fn mark_processing(&self, track: Track, generation: u64) -> bool {
        let mut state = self.lock();
        let slot = state.slot_mut(track);
        if slot.generation != generation {
            return false;
        }
        let Some(job) = slot.job.as_mut() else {
            return false;
        };
        if job.begin_processing() {
            let event = TrackerEvent::Updated { job: job.clone() };
            self.publish(&state, Some(event));
        }
        true
    }

    /// Apply the result of poll number `seq` for `generation`.
    pub(crate) fn apply_poll(
        &self,
        track: Track,
        generation: u64,
        seq: u64,
        update: JobUpdate,
    ) -> PollOutcome {
        let mut state = self.lock();
        let slot = state.slot_mut(track);
        if slot.generation != generation {
            return PollOutcome::Superseded;
        }
        if seq <= slot.last_seq {
            debug!(%track, seq, last_seq = slot.last_seq, "discarding stale poll result");
            return PollOutcome::Stale;
        }
        slot.last_seq = seq;
        let Some(job) = slot.job.as_mut() else {
            return PollOutcome::Superseded;
        };

        let (outcome, event) = match job.apply(update) {
            Ok(Transition::Advanced { to: JobStatus::Completed, .. }) => {
                info!(%track, job_id = %job.id, refs = job.result_refs.len(), "job completed");
                self.watch_completed
                    .send_replace(Some(CompletedJob::from_job(job)));
                (PollOutcome::Finished, TrackerEvent::Completed { job: job.clone() })
            }
            Ok(Transition::Advanced { to: JobStatus::Failed, .. }) => {
                warn!(%track, job_id = %job.id, message = %job.message, "job failed on backend");
                (
                    PollOutcome::Finished,
                    TrackerEvent::Failed {
                        job: job.clone(),
                        http_status: None,
                    },
                )
            }
            Ok(_) => (PollOutcome::Continue, TrackerEvent::Updated { job: job.clone() }),
            Err(Rejection::Terminal(status)) => {
                debug!(%track, job_id = %job.id, %status, "update after terminal state ignored");
                return PollOutcome::Finished;
            }
            Err(Rejection::Regressed { current, proposed }) => {
                warn!(%track, job_id = %job.id, %current, %proposed, "backward status update ignored");
                return PollOutcome::Continue;
            }
        };

        if outcome == PollOutcome::Finished {
            if let Some(token) = slot.token.take() {
                token.cancel();
            }
        }
        self.publish(&state, Some(event));
        outcome
    }

    /// Fail the job from the client side (transport, timeout, 401).
    pub(crate) fn fail(
        &self,
        track: Track,
        generation: u64,
        cause: FailureCause,
        message: String,
        http_status: Option<u16>,
    ) -> PollOutcome {
        let mut state = self.lock();
        let slot = state.slot_mut(track);
        if slot.generation != generation {
            return PollOutcome::Superseded;
        }
        let Some(job) = slot.job.as_mut() else {
            return PollOutcome::Superseded;
        };
        if job.fail(cause, message).is_err() {
            return PollOutcome::Finished;
        }
        warn!(%track, job_id = %job.id, ?cause, message = %job.message, "job failed");
        let event = TrackerEvent::Failed {
            job: job.clone(),
            http_status,
        };
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
        self.publish(&state, Some(event));
        PollOutcome::Finished
    }
}
