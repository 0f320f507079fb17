use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use histo_supervisor::events::{EventSink, NullEventSink, SupervisorEvent, VecEventSink};
use histo_supervisor::supervisor::{supervise, SupervisorConfig, WorkerTiming};
use histo_supervisor::SupervisorError;

fn config(out_dir: PathBuf) -> SupervisorConfig {
    SupervisorConfig {
        out_dir,
        timing: WorkerTiming {
            base_delay: Duration::ZERO,
            stagger: Duration::from_millis(5),
            marker_timeout: Duration::from_secs(30),
        },
        poll_interval: Duration::from_millis(10),
        worker_program: Some(PathBuf::from(env!("CARGO_BIN_EXE_histo-supervisor"))),
        ..SupervisorConfig::default()
    }
}

#[test]
fn report_lists_artifacts_by_worker() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let a = tmp.path().join("a.txt");
    let b = tmp.path().join("b.txt");
    fs::write(&a, "aaaa").unwrap();
    fs::write(&b, "BBb").unwrap();
    let inputs: Vec<OsString> = vec![a.into(), "SIG".into(), b.into()];

    let sink = Arc::new(VecEventSink::new());
    let report = supervise(&config(tmp.path().to_path_buf()), &inputs, sink.clone())
        .expect("supervise");

    assert_eq!((report.workers, report.reaped), (3, 3));
    assert_eq!(report.interrupted, 1);
    assert_eq!(report.input_failures, 0);
    assert_eq!(report.malformed_payloads, 0);
    assert_eq!(report.missing_records, 0);

    let mut by_index: Vec<_> = report.artifacts.iter().map(|r| r.index).collect();
    by_index.sort_unstable();
    assert_eq!(by_index, vec![0, 2]);
    for record in &report.artifacts {
        let name = record.path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("file{}.hist", record.pid));
        let text = fs::read_to_string(&record.path).unwrap();
        let expected = if record.index == 0 { "a=4" } else { "b=3" };
        assert!(text.lines().any(|l| l == expected), "{text}");
    }

    assert_eq!(sink.count_type("spawned"), 3);
    assert_eq!(sink.count_type("artifact"), 2);
    assert_eq!(sink.count_type("summary"), 1);
}

#[test]
fn artifact_failure_returns_error() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let a = tmp.path().join("a.txt");
    fs::write(&a, "abc").unwrap();

    let err = supervise(
        &config(tmp.path().join("missing-dir")),
        &[a.into()],
        Arc::new(NullEventSink),
    )
    .unwrap_err();
    assert!(matches!(err, SupervisorError::ArtifactOpen { .. }));
    assert_eq!(err.exit_code(), 1);
}

/// Stalls on every exit event, like a stderr reader that stopped draining.
struct StallingSink {
    stall: Duration,
}

impl EventSink for StallingSink {
    fn emit(&self, event: SupervisorEvent<'_>) {
        if matches!(event, SupervisorEvent::WorkerExited { .. }) {
            std::thread::sleep(self.stall);
        }
    }

    fn flush(&self) {}
}

#[test]
fn artifact_failure_after_last_reap_is_not_lost() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let a = tmp.path().join("a.txt");
    fs::write(&a, "abc").unwrap();

    // The reap is counted before the exit event; the poll loop observes
    // completion while the artifact write is still pending.
    let err = supervise(
        &config(tmp.path().join("missing-dir")),
        &[a.into()],
        Arc::new(StallingSink {
            stall: Duration::from_millis(200),
        }),
    )
    .unwrap_err();
    assert!(
        matches!(err, SupervisorError::ArtifactOpen { .. }),
        "unexpected error: {err}"
    );
}
