use posboard_observability::{init, LogOptions};

// One test per binary: the global subscriber can only be installed once.
#[test]
fn test_init_writes_json_to_rolling_file() {
    let dir = tempfile::tempdir().unwrap();
    let opts = LogOptions {
        json: true,
        log_file: Some(dir.path().join("logs").join("posboard.log")),
        default_filter: Some("warn".into()),
    };

    let guard = init(&opts).unwrap();
    assert!(guard.is_some());
    tracing::warn!(job_id = "m1", "poll gave up");
    drop(guard);

    assert!(init(&LogOptions::default()).is_err(), "second init must fail");

    let entries: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1);
    let name = entries[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("posboard.log"), "{name}");

    let contents = std::fs::read_to_string(&entries[0]).unwrap();
    assert!(contents.contains("poll gave up"));
    assert!(contents.contains("\"job_id\":\"m1\""));
}
