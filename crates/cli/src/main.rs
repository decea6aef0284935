// crates/cli/src/main.rs
//! `posboard`: submit POS uploads to the analytics backend and follow the job.

mod commands;
mod output;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use posboard_core::config::Config;
use posboard_core::mapping::{DEFAULT_MAX_LEN, DEFAULT_MIN_SUPPORT};
use posboard_core::{ApiError, ArtifactKind};
use posboard_observability::LogOptions;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: $POSBOARD_CONFIG or <config dir>/posboard/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend base URL, overrides the config file
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Log to stderr as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Also write JSON logs to this file, rolled daily
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show an upload's columns and the suggested column mapping
    Inspect {
        /// CSV or Excel file
        file: PathBuf,
    },
    /// Submit an upload, follow the job and download its artifacts
    Run(RunArgs),
    /// Fetch one status report for a job and print it as JSON
    Status {
        id: String,
        /// The job runs on the manual track
        #[arg(long)]
        manual: bool,
    },
    /// Download one artifact of a finished job
    Fetch {
        id: String,
        /// pos, clustering, network or radar
        kind: ArtifactKind,
        /// Download by backend file name instead of job id
        #[arg(long, value_name = "NAME")]
        file: Option<String>,
        #[arg(long, default_value = ".", value_name = "DIR")]
        out: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
pub(crate) struct RunArgs {
    /// CSV or Excel file
    file: PathBuf,

    /// Use the manual track (association analysis with an explicit column mapping)
    #[arg(long)]
    manual: bool,

    /// Column mapping entry; repeat for each target. Without any, the mapping
    /// is suggested by the backend.
    #[arg(long = "map", value_name = "SRC=TARGET", value_parser = parse_mapping_pair)]
    map: Vec<(String, String)>,

    #[arg(long, default_value_t = DEFAULT_MIN_SUPPORT)]
    min_support: f64,

    #[arg(long, default_value_t = DEFAULT_MAX_LEN)]
    max_len: u32,

    /// Directory for downloaded artifacts
    #[arg(long, default_value = ".", value_name = "DIR")]
    out: PathBuf,

    /// Artifacts to download; repeatable. Defaults to every available kind.
    #[arg(long = "artifact", value_name = "KIND")]
    artifacts: Vec<ArtifactKind>,
}

/// `SRC=TARGET`. Splits on the last `=` so source columns may contain one.
fn parse_mapping_pair(raw: &str) -> Result<(String, String), String> {
    let (source, target) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected SRC=TARGET, got {raw:?}"))?;
    let (source, target) = (source.trim(), target.trim());
    if source.is_empty() || target.is_empty() {
        return Err(format!("expected SRC=TARGET, got {raw:?}"));
    }
    Ok((source.to_string(), target.to_string()))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = &args.base_url {
        config.backend.base_url = url.clone();
        config.validate()?;
    }
    Ok(config)
}

/// True when any error in the chain is a 401 from the backend.
fn is_session_expired(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<ApiError>())
        .any(ApiError::is_session_expired)
}

async fn dispatch(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    match args.command {
        Command::Inspect { file } => commands::inspect(&config, &file).await,
        Command::Run(run) => commands::run(&config, run).await,
        Command::Status { id, manual } => commands::status(&config, &id, manual).await,
        Command::Fetch {
            id,
            kind,
            file,
            out,
        } => commands::fetch(&config, &id, kind, file, &out).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match posboard_observability::init(&LogOptions {
        json: args.json_logs,
        log_file: args.log_file.clone(),
        default_filter: None,
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("  \u{2717} {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match dispatch(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("  \u{2717} {e}");
            let top = e.to_string();
            for cause in e.chain().skip(1) {
                let cause = cause.to_string();
                if !top.contains(&cause) {
                    eprintln!("    caused by: {cause}");
                }
            }
            if is_session_expired(&e) {
                eprintln!("    session expired, log in again (set backend.username / backend.password)");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posboard_core::JobError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_mapping_pair() {
        assert_eq!(
            parse_mapping_pair("card_no=カード番号").unwrap(),
            ("card_no".to_string(), "カード番号".to_string())
        );
        assert_eq!(
            parse_mapping_pair(" a=b = 利用金額 ").unwrap(),
            ("a=b".to_string(), "利用金額".to_string())
        );
        assert!(parse_mapping_pair("no-separator").is_err());
        assert!(parse_mapping_pair("=target").is_err());
    }

    #[test]
    fn test_run_args_parse() {
        let args = Args::try_parse_from([
            "posboard",
            "--base-url",
            "http://backend:5000",
            "run",
            "pos.csv",
            "--manual",
            "--map",
            "card=カード番号",
            "--map",
            "date=利用日時",
            "--artifact",
            "network",
            "--artifact",
            "cluster",
        ])
        .unwrap();
        assert_eq!(args.base_url.as_deref(), Some("http://backend:5000"));
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert!(run.manual);
        assert_eq!(run.map.len(), 2);
        assert_eq!(run.min_support, DEFAULT_MIN_SUPPORT);
        assert_eq!(run.max_len, DEFAULT_MAX_LEN);
        assert_eq!(
            run.artifacts,
            vec![ArtifactKind::Network, ArtifactKind::Clustering]
        );
    }

    #[test]
    fn test_fetch_rejects_unknown_kind() {
        assert!(Args::try_parse_from(["posboard", "fetch", "p1", "heatmap"]).is_err());
    }

    #[test]
    fn test_session_expired_is_found_in_chain() {
        let err = anyhow::Error::new(JobError::Submission(ApiError::http(401, "login required")));
        assert!(is_session_expired(&err));

        let err = anyhow::Error::new(ApiError::http(500, "boom")).context("fetching status");
        assert!(!is_session_expired(&err));
    }
}
