// crates/cli/src/commands.rs
//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use posboard_core::config::Config;
use posboard_core::mapping::{missing_required, ColumnMapping};
use posboard_core::{
    ApiError, ArtifactKind, ArtifactRef, FailureCause, HttpBackend, Job, JobBackend, JobError,
    JobId, ManualParams, SubmitRequest, Track, Upload,
};
use posboard_jobs::{ArtifactView, JobTracker, PollPolicy};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::output::save_artifact;
use crate::progress;
use crate::RunArgs;

/// Build the client and log in when credentials are configured.
async fn connect(config: &Config) -> Result<HttpBackend> {
    let backend = HttpBackend::new(&config.backend)?;
    if let Some((username, password)) = config.credentials() {
        backend.login(username, password).await?;
        info!(%username, base_url = %backend.base_url(), "logged in");
    }
    Ok(backend)
}

async fn disconnect(config: &Config, backend: &HttpBackend) {
    if config.credentials().is_some() {
        if let Err(e) = backend.logout().await {
            warn!(error = %e, "logout failed");
        }
    }
}

pub async fn inspect(config: &Config, file: &Path) -> Result<()> {
    let backend = connect(config).await?;
    let upload = Upload::from_path(file).await?;
    let preview = backend.inspect(&upload).await?;

    match preview.row_count {
        Some(rows) => println!("{}: {rows} rows", upload.file_name),
        None => println!("{}", upload.file_name),
    }
    if let Some(message) = preview.message.as_deref().filter(|m| !m.is_empty()) {
        println!("  {message}");
    }
    println!("columns:");
    for column in &preview.columns {
        println!("  {column}");
    }

    let mapping = backend.suggest_mapping_or_fallback(&preview.columns).await;
    print_mapping(&mapping);

    disconnect(config, &backend).await;
    Ok(())
}

fn print_mapping(mapping: &ColumnMapping) {
    println!("suggested mapping:");
    for (source, target) in mapping.iter() {
        println!("  {source} -> {target}");
    }
    let missing = missing_required(mapping);
    if !missing.is_empty() {
        println!("missing required targets: {}", missing.join(", "));
    }
}

/// Mapping from `--map`, or the backend's suggestion when none was given.
async fn resolve_mapping(
    backend: &HttpBackend,
    upload: &Upload,
    pairs: &[(String, String)],
) -> Result<ColumnMapping> {
    if !pairs.is_empty() {
        let mut mapping = ColumnMapping::new();
        for (source, target) in pairs {
            mapping.assign(source.clone(), target.clone());
        }
        return Ok(mapping);
    }
    let preview = backend.inspect(upload).await?;
    let mapping = backend.suggest_mapping_or_fallback(&preview.columns).await;
    for (source, target) in mapping.iter() {
        eprintln!("  mapping {source} -> {target}");
    }
    Ok(mapping)
}

pub async fn run(config: &Config, args: RunArgs) -> Result<()> {
    let started = Instant::now();
    let backend = Arc::new(connect(config).await?);
    let upload = Upload::from_path(&args.file).await?;

    let request = if args.manual {
        let column_mapping = resolve_mapping(&backend, &upload, &args.map).await?;
        let missing = missing_required(&column_mapping);
        if !missing.is_empty() {
            return Err(JobError::IncompleteMapping(missing).into());
        }
        SubmitRequest::Manual {
            upload,
            params: ManualParams {
                column_mapping,
                min_support: args.min_support,
                max_len: args.max_len,
            },
        }
    } else {
        SubmitRequest::Auto { upload }
    };
    let track = request.track();

    let job_backend: Arc<dyn JobBackend> = backend.clone();
    let tracker = JobTracker::new(job_backend, PollPolicy::from(&config.polling));

    let kinds = if args.artifacts.is_empty() {
        ArtifactKind::ALL.to_vec()
    } else {
        args.artifacts.clone()
    };
    let (tx, mut fetched) = mpsc::channel(kinds.len());
    for kind in &kinds {
        ArtifactView::new(*kind, tracker.backend()).spawn(
            tracker.watch_completed(),
            tx.clone(),
            tracker.child_token(),
        );
    }
    drop(tx);

    let events = tracker.subscribe();
    let job = tracker.start_job(request).await?;
    eprintln!("  \u{2192} submitted {track} job {}", job.id);
    let ui = tokio::spawn(progress::follow(events, job.clone()));

    let outcome = tokio::select! {
        outcome = tracker.wait_for(track, &job.id) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracker.shutdown();
            Err(JobError::NotTracked(track))
        }
    };
    // The progress task exits on the terminal event or when the tracker stops.
    let _ = ui.await;

    let done = match outcome {
        Ok(done) => done,
        Err(e) => {
            tracker.shutdown();
            disconnect(config, &backend).await;
            return Err(job_error(&tracker, track, e));
        }
    };
    print_summary(&done, started);

    let expected = kinds
        .iter()
        .filter(|k| done.result_refs.contains_key(k))
        .count();
    let mut saved = 0;
    while saved < expected {
        let Some(fetch) = fetched.recv().await else {
            break;
        };
        saved += 1;
        match fetch.result {
            Ok(artifact) => {
                let path = save_artifact(&args.out, &artifact).await?;
                eprintln!("  \u{2713} {} \u{2192} {}", fetch.kind, path.display());
            }
            Err(e) => eprintln!("  \u{2717} {}: {}", fetch.kind, e.user_message()),
        }
    }

    tracker.shutdown();
    disconnect(config, &backend).await;
    Ok(())
}

/// Surface a 401 during polling as an `ApiError` so the caller can prompt for
/// a new login.
fn job_error(tracker: &JobTracker, track: Track, err: JobError) -> anyhow::Error {
    match tracker.job(track) {
        Some(job) if job.failure == Some(FailureCause::SessionExpired) => {
            ApiError::http(401, job.message).into()
        }
        _ => err.into(),
    }
}

fn print_summary(job: &Job, started: Instant) {
    eprintln!(
        "  \u{2713} {} job {} completed in {:.1}s",
        job.track,
        job.id,
        started.elapsed().as_secs_f64()
    );
    if let Some(secs) = job.processing_time_secs {
        println!("processing time: {secs:.2}s");
    }
    if let Some(summary) = job.summary {
        println!(
            "rules: {}  nodes: {}  edges: {}",
            summary.rules_count, summary.nodes_count, summary.edges_count
        );
    }
    for (kind, handle) in &job.result_refs {
        println!("{kind}: {handle}");
    }
}

pub async fn status(config: &Config, id: &str, manual: bool) -> Result<()> {
    let backend = connect(config).await?;
    let track = if manual { Track::Manual } else { Track::Auto };
    let payload = backend.status(track, &JobId::new(id)).await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    disconnect(config, &backend).await;
    Ok(())
}

pub async fn fetch(
    config: &Config,
    id: &str,
    kind: ArtifactKind,
    file: Option<String>,
    out: &Path,
) -> Result<()> {
    let backend = connect(config).await?;
    let handle = match file {
        Some(name) => ArtifactRef::File(name),
        None => ArtifactRef::Keyed(JobId::new(id)),
    };
    let artifact = backend
        .artifact(kind, &handle)
        .await
        .with_context(|| format!("downloading {kind} for {id}"))?;
    let path = save_artifact(out, &artifact).await?;
    eprintln!(
        "  \u{2713} {kind} ({} bytes) \u{2192} {}",
        artifact.bytes.len(),
        path.display()
    );
    disconnect(config, &backend).await;
    Ok(())
}
