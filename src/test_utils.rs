//! Shared helpers for unit tests.

use std::fs;
use std::path::{Path, PathBuf};

pub fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
}

fn is_ci() -> bool {
    std::env::var_os("CI").is_some()
}

/// Property-test case count: `PROPTEST_CASES` if set, `default` on CI, and a
/// handful locally.
pub fn proptest_cases(default: u32) -> u32 {
    if let Some(value) = env_u32("PROPTEST_CASES") {
        return value.max(1);
    }
    if is_ci() {
        return default.max(1);
    }
    default.clamp(1, 16)
}

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_input(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write test input");
    path
}
