use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const BINARY: &str = env!("CARGO_BIN_EXE_histo-supervisor");

/// Millisecond timings so scenarios finish quickly. The marker timeout stays
/// long: an interrupted marker worker must not run into it.
const FAST: [&str; 4] = [
    "--base-delay-ms=0",
    "--stagger-ms=10",
    "--marker-timeout-ms=30000",
    "--poll-ms=10",
];

fn run(out_dir: &Path, inputs: &[&std::ffi::OsStr]) -> Output {
    Command::new(BINARY)
        .arg(format!("--out-dir={}", out_dir.display()))
        .args(FAST)
        .arg("--event-format=jsonl")
        .arg("--")
        .args(inputs)
        .output()
        .expect("run histo-supervisor")
}

fn artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .expect("read out dir")
        .map(|e| e.expect("dir entry").path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy();
            name.starts_with("file") && name.ends_with(".hist")
        })
        .collect();
    found.sort();
    found
}

fn read_histogram(path: &Path) -> BTreeMap<char, u64> {
    fs::read_to_string(path)
        .expect("read artifact")
        .lines()
        .map(|line| {
            let (letter, count) = line.split_once('=').expect("letter=count");
            (letter.chars().next().unwrap(), count.parse().unwrap())
        })
        .collect()
}

/// Parses the final `key=value` stats line from stderr.
fn stats(output: &Output) -> BTreeMap<String, u64> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("workers="))
        .unwrap_or_else(|| panic!("no stats line in stderr: {stderr}"));
    line.split_whitespace()
        .map(|kv| {
            let (k, v) = kv.split_once('=').unwrap();
            (k.to_string(), v.parse().unwrap())
        })
        .collect()
}

#[test]
fn single_file_produces_one_artifact() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let input = tmp.path().join("hello.txt");
    fs::write(&input, "Hello World").unwrap();
    let out = tmp.path().join("out");
    fs::create_dir(&out).unwrap();

    let output = run(&out, &[input.as_os_str()]);
    assert!(
        output.status.success(),
        "supervisor failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let found = artifacts(&out);
    assert_eq!(found.len(), 1);
    let hist = read_histogram(&found[0]);
    assert_eq!(hist.len(), 26);
    let expected = [('h', 1), ('e', 1), ('l', 3), ('o', 2), ('w', 1), ('r', 1), ('d', 1)];
    for (letter, count) in hist {
        let want = expected
            .iter()
            .find(|(l, _)| *l == letter)
            .map_or(0, |(_, c)| *c);
        assert_eq!(count, want, "bucket {letter}");
    }

    let s = stats(&output);
    assert_eq!(s["workers"], 1);
    assert_eq!(s["reaped"], 1);
    assert_eq!(s["artifacts"], 1);
}

#[test]
fn no_arguments_is_an_error() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let output = run(tmp.path(), &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no input files provided"), "stderr={stderr}");
    assert!(stderr.contains("usage:"));
    assert!(artifacts(tmp.path()).is_empty());
}

#[test]
fn marker_worker_is_interrupted() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let output = run(tmp.path(), &["SIG".as_ref()]);
    assert!(
        output.status.success(),
        "supervisor failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(artifacts(tmp.path()).is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("\"type\":\"interrupt\""), "stderr={stderr}");
    assert!(stderr.contains("\"type\":\"signaled\""), "stderr={stderr}");
    let s = stats(&output);
    assert_eq!(s["workers"], 1);
    assert_eq!(s["reaped"], 1);
    assert_eq!(s["interrupted"], 1);
    assert_eq!(s["abnormal"], 0);
}

#[test]
fn missing_file_does_not_fail_the_run() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let good = tmp.path().join("good.txt");
    fs::write(&good, "abc").unwrap();
    let missing = tmp.path().join("missing.txt");
    let out = tmp.path().join("out");
    fs::create_dir(&out).unwrap();

    let output = run(&out, &[missing.as_os_str(), good.as_os_str()]);
    assert!(
        output.status.success(),
        "supervisor failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let found = artifacts(&out);
    assert_eq!(found.len(), 1);
    let hist = read_histogram(&found[0]);
    assert_eq!((hist[&'a'], hist[&'b'], hist[&'c']), (1, 1, 1));

    let s = stats(&output);
    assert_eq!(s["workers"], 2);
    assert_eq!(s["reaped"], 2);
    assert_eq!(s["input_failures"], 1);
}

#[test]
fn too_many_inputs_spawns_nothing() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let input = tmp.path().join("a.txt");
    fs::write(&input, "a").unwrap();
    let inputs = vec![input.as_os_str(); 101];

    let output = run(tmp.path(), &inputs);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("too many input files provided: 101 (maximum allowed is 100)"),
        "stderr={stderr}"
    );
    assert!(!stderr.contains("\"type\":\"spawned\""));
    assert!(artifacts(tmp.path()).is_empty());
}

#[test]
fn mixed_batch_reaps_every_worker() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let mut inputs = Vec::new();
    for i in 0..6 {
        let path = tmp.path().join(format!("in{i}.txt"));
        fs::write(&path, "z".repeat(i + 1)).unwrap();
        inputs.push(path.into_os_string());
    }
    inputs.push("SIG".into());
    inputs.push(tmp.path().join("nope.txt").into_os_string());
    let out = tmp.path().join("out");
    fs::create_dir(&out).unwrap();

    let refs: Vec<&std::ffi::OsStr> = inputs.iter().map(|s| s.as_os_str()).collect();
    let output = run(&out, &refs);
    assert!(
        output.status.success(),
        "supervisor failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let s = stats(&output);
    assert_eq!(s["workers"], 8);
    assert_eq!(s["reaped"], 8);
    assert_eq!(s["artifacts"], 6);
    assert_eq!(s["input_failures"], 1);
    assert_eq!(s["interrupted"], 1);

    let mut z_counts: Vec<u64> = artifacts(&out)
        .iter()
        .map(|p| read_histogram(p)[&'z'])
        .collect();
    z_counts.sort_unstable();
    assert_eq!(z_counts, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn unwritable_out_dir_is_fatal() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let input = tmp.path().join("a.txt");
    fs::write(&input, "abc").unwrap();
    let out = tmp.path().join("does-not-exist");

    let output = run(&out, &[input.as_os_str()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("opening artifact"), "stderr={stderr}");
    assert!(!stderr.lines().any(|l| l.starts_with("workers=")));
}

#[test]
fn help_exits_zero() {
    let output = Command::new(BINARY).arg("--help").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--out-dir"));
}

#[test]
fn unknown_flag_is_rejected() {
    let output = Command::new(BINARY)
        .args(["--frobnicate", "a.txt"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown flag: --frobnicate"));
}

#[test]
fn malformed_worker_invocation_has_its_own_status() {
    let output = Command::new(BINARY)
        .args(["__worker", "--index=0", "--", "a.txt"])
        .output()
        .unwrap();
    // No --marker: the invocation is rejected before any work.
    assert_eq!(output.status.code(), Some(3));
}
