#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use posboard_core::{
    ApiError, Artifact, ArtifactKind, ArtifactRef, JobBackend, JobId, ManualParams,
    StatusPayload, SubmitRequest, Track, Upload, WireStatus,
};
use posboard_jobs::{JobTracker, PollPolicy, TrackerEvent};
use tokio::sync::broadcast;

/// In-memory backend that replays scripted answers.
///
/// Each job id has its own queue of status answers; once the queue is empty
/// the job reports `processing` forever.
#[derive(Default)]
pub struct ScriptedBackend {
    submissions: Mutex<VecDeque<Result<JobId, ApiError>>>,
    scripts: Mutex<HashMap<JobId, VecDeque<Result<StatusPayload, ApiError>>>>,
    polls: Mutex<Vec<JobId>>,
    fetches: Mutex<Vec<(ArtifactKind, ArtifactRef)>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accept(&self, id: &str) {
        self.submissions
            .lock()
            .unwrap()
            .push_back(Ok(JobId::new(id)));
    }

    pub fn reject(&self, err: ApiError) {
        self.submissions.lock().unwrap().push_back(Err(err));
    }

    pub fn script(&self, id: &str, answers: Vec<Result<StatusPayload, ApiError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(JobId::new(id), answers.into_iter().collect());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn polls_for(&self, id: &str) -> usize {
        self.polls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == id)
            .count()
    }

    pub fn total_polls(&self) -> usize {
        self.polls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> Vec<(ArtifactKind, ArtifactRef)> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobBackend for ScriptedBackend {
    async fn submit(&self, _request: &SubmitRequest) -> Result<JobId, ApiError> {
        self.submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::http(500, "no submission scripted")))
    }

    async fn status(&self, _track: Track, id: &JobId) -> Result<StatusPayload, ApiError> {
        self.polls.lock().unwrap().push(id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let answer = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(processing(None)));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }

    async fn artifact(&self, kind: ArtifactKind, handle: &ArtifactRef) -> Result<Artifact, ApiError> {
        self.fetches.lock().unwrap().push((kind, handle.clone()));
        Ok(Artifact {
            kind,
            handle: handle.clone(),
            content_type: Some("text/csv".into()),
            bytes: Bytes::from(format!("{kind}:{handle}")),
        })
    }
}

pub fn processing(progress: Option<f64>) -> StatusPayload {
    StatusPayload {
        progress,
        message: Some("running".into()),
        ..StatusPayload::with_status(WireStatus::Processing)
    }
}

pub fn completed() -> StatusPayload {
    StatusPayload {
        message: Some("done".into()),
        ..StatusPayload::with_status(WireStatus::Completed)
    }
}

pub fn transport_error() -> ApiError {
    ApiError::Transport("connection reset by peer".into())
}

pub fn auto_request() -> SubmitRequest {
    SubmitRequest::Auto {
        upload: Upload::new("pos.csv", "a,b\n".as_bytes().to_vec()),
    }
}

pub fn manual_request() -> SubmitRequest {
    SubmitRequest::Manual {
        upload: Upload::new("pos.csv", "a,b\n".as_bytes().to_vec()),
        params: ManualParams::default(),
    }
}

pub fn tracker(backend: &Arc<ScriptedBackend>) -> JobTracker {
    tracker_with(backend, PollPolicy::default())
}

pub fn tracker_with(backend: &Arc<ScriptedBackend>, policy: PollPolicy) -> JobTracker {
    let backend: Arc<dyn JobBackend> = backend.clone();
    JobTracker::new(backend, policy)
}

/// Next event matching `pred`, collecting everything seen on the way.
pub async fn next_event(
    rx: &mut broadcast::Receiver<TrackerEvent>,
    seen: &mut Vec<TrackerEvent>,
    pred: impl Fn(&TrackerEvent) -> bool,
) -> TrackerEvent {
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            seen.push(event.clone());
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for tracker event")
}

pub fn is_terminal(event: &TrackerEvent) -> bool {
    matches!(
        event,
        TrackerEvent::Completed { .. } | TrackerEvent::Failed { .. }
    )
}
