// crates/cli/src/output.rs
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use posboard_core::Artifact;

/// Write `artifact` into `dir`, creating it if needed. Only the final
/// component of a backend-provided name is used.
pub async fn save_artifact(dir: &Path, artifact: &Artifact) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(file_name(&artifact.suggested_file_name(), artifact));
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn file_name(suggested: &str, artifact: &Artifact) -> String {
    Path::new(suggested)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_result.csv", artifact.kind))
}
