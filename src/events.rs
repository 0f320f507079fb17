//! Structured supervisor events, encoders, and sinks.
//!
//! # Architecture
//!
//! The controller, the reaper and every worker process report progress as
//! [`SupervisorEvent`] values through an [`EventSink`]. The sink owns the
//! encoding ([`TextEncoder`] for humans, [`JsonlEncoder`] for machines) and
//! writes each encoded event with a single `write_all` under a mutex, so
//! lines from the reaper thread and the spawn loop never interleave at the
//! byte level.
//!
//! Workers inherit the controller's stderr, so their events land in the same
//! stream; ordering across processes is whatever the OS produces.

use std::io::{self, ErrorKind, Write};
use std::sync::{Arc, Mutex};

// ============================================================================
// Event types
// ============================================================================

/// Structured event emitted during a supervised run.
///
/// Variants borrow paths and messages; the sink serializes immediately.
#[derive(Debug)]
pub enum SupervisorEvent<'a> {
    /// Controller accepted its inputs and is about to spawn.
    Starting { inputs: usize },
    /// A worker process was spawned for `input`.
    WorkerSpawned {
        index: usize,
        pid: u32,
        input: &'a [u8],
    },
    /// The controller interrupted a marker worker.
    InterruptSent { index: usize, pid: u32 },
    /// Worker-side progress (`opening`, `sent`, `done`, `awaiting-interrupt`, `timeout`).
    WorkerStage {
        index: usize,
        pid: u32,
        stage: &'static str,
        input: &'a [u8],
    },
    /// The reaper observed a worker exit with a status code.
    WorkerExited {
        index: Option<usize>,
        pid: u32,
        code: i32,
    },
    /// The reaper observed a worker killed by a signal.
    WorkerSignaled {
        index: Option<usize>,
        pid: u32,
        signal: i32,
    },
    /// One reaper wakeup drained `drained` exit notices.
    ReapBatch { drained: usize },
    /// A histogram was persisted.
    ArtifactWritten {
        index: usize,
        pid: u32,
        path: &'a [u8],
    },
    /// Free-form diagnostic (inconsistencies, malformed payloads, errors).
    Diagnostic {
        level: &'static str,
        pid: Option<u32>,
        message: &'a str,
    },
    /// Final counters for the run.
    Summary(SummaryEvent),
}

/// Final summary emitted once every worker has been reaped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SummaryEvent {
    pub workers: u64,
    pub reaped: u64,
    pub artifacts: u64,
    pub input_failures: u64,
    pub interrupted: u64,
    pub abnormal: u64,
    pub elapsed_ms: u64,
}

/// Output event format selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventFormat {
    /// One human-readable line per event (default).
    #[default]
    Text,
    /// One JSON object per line.
    Jsonl,
}

impl EventFormat {
    /// Parses the `--event-format` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "jsonl" => Some(Self::Jsonl),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Thread-safe sink for supervisor events.
///
/// Called from the spawn loop and the reaper thread concurrently.
pub trait EventSink: Send + Sync {
    /// Serialize and write a single event.
    fn emit(&self, event: SupervisorEvent<'_>);
    /// Flush any buffered output.
    fn flush(&self);
}

/// Encodes a [`SupervisorEvent`] into bytes, newline included.
pub trait EventEncoder: Send + Sync {
    fn encode(&self, event: &SupervisorEvent<'_>, buf: &mut Vec<u8>);
}

// ============================================================================
// Text encoder
// ============================================================================

/// Human-readable encoder used for interactive runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextEncoder;

impl EventEncoder for TextEncoder {
    fn encode(&self, event: &SupervisorEvent<'_>, buf: &mut Vec<u8>) {
        // Writes into a Vec cannot fail.
        let _ = write_text(event, buf);
        buf.push(b'\n');
    }
}

fn write_text(event: &SupervisorEvent<'_>, buf: &mut Vec<u8>) -> io::Result<()> {
    match event {
        SupervisorEvent::Starting { inputs } => {
            write!(buf, "starting supervisor with {inputs} input(s)")
        }
        SupervisorEvent::WorkerSpawned { index, pid, input } => write!(
            buf,
            "spawned worker {index} (pid {pid}) for {}",
            String::from_utf8_lossy(input)
        ),
        SupervisorEvent::InterruptSent { index, pid } => {
            write!(buf, "sent SIGINT to worker {index} (pid {pid})")
        }
        SupervisorEvent::WorkerStage {
            index,
            pid,
            stage,
            input,
        } => write!(
            buf,
            "worker {index} (pid {pid}) {stage}: {}",
            String::from_utf8_lossy(input)
        ),
        SupervisorEvent::WorkerExited { index, pid, code } => {
            write!(buf, "reaped pid {pid}")?;
            write_index_suffix(*index, buf)?;
            write!(buf, " exit status {code}")
        }
        SupervisorEvent::WorkerSignaled { index, pid, signal } => {
            write!(buf, "reaped pid {pid}")?;
            write_index_suffix(*index, buf)?;
            write!(buf, " terminated by signal {signal}")
        }
        SupervisorEvent::ReapBatch { drained } => {
            write!(buf, "reaper drained {drained} exit notice(s)")
        }
        SupervisorEvent::ArtifactWritten { index, pid, path } => write!(
            buf,
            "histogram from worker {index} (pid {pid}) saved to {}",
            String::from_utf8_lossy(path)
        ),
        SupervisorEvent::Diagnostic {
            level,
            pid,
            message,
        } => match pid {
            Some(pid) => write!(buf, "{level}: pid {pid}: {message}"),
            None => write!(buf, "{level}: {message}"),
        },
        SupervisorEvent::Summary(s) => write!(
            buf,
            "all workers finished: workers={} reaped={} artifacts={} input_failures={} interrupted={} abnormal={} elapsed_ms={}",
            s.workers,
            s.reaped,
            s.artifacts,
            s.input_failures,
            s.interrupted,
            s.abnormal,
            s.elapsed_ms
        ),
    }
}

fn write_index_suffix(index: Option<usize>, buf: &mut Vec<u8>) -> io::Result<()> {
    match index {
        Some(i) => write!(buf, " (worker {i})"),
        None => Ok(()),
    }
}

// ============================================================================
// JSONL encoder
// ============================================================================

/// JSONL encoder: one JSON object per line, no serde.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonlEncoder;

impl EventEncoder for JsonlEncoder {
    fn encode(&self, event: &SupervisorEvent<'_>, buf: &mut Vec<u8>) {
        match event {
            SupervisorEvent::Starting { inputs } => {
                buf.extend_from_slice(b"{\"type\":\"starting\",\"inputs\":");
                write_u64(*inputs as u64, buf);
            }
            SupervisorEvent::WorkerSpawned { index, pid, input } => {
                buf.extend_from_slice(b"{\"type\":\"spawned\"");
                write_worker(Some(*index), *pid, buf);
                buf.extend_from_slice(b",\"input\":\"");
                write_json_bytes(input, buf);
                buf.push(b'"');
            }
            SupervisorEvent::InterruptSent { index, pid } => {
                buf.extend_from_slice(b"{\"type\":\"interrupt\"");
                write_worker(Some(*index), *pid, buf);
            }
            SupervisorEvent::WorkerStage {
                index,
                pid,
                stage,
                input,
            } => {
                buf.extend_from_slice(b"{\"type\":\"worker\"");
                write_worker(Some(*index), *pid, buf);
                buf.extend_from_slice(b",\"stage\":\"");
                write_json_str(stage, buf);
                buf.extend_from_slice(b"\",\"input\":\"");
                write_json_bytes(input, buf);
                buf.push(b'"');
            }
            SupervisorEvent::WorkerExited { index, pid, code } => {
                buf.extend_from_slice(b"{\"type\":\"exited\"");
                write_worker(*index, *pid, buf);
                buf.extend_from_slice(b",\"code\":");
                write_i64(*code as i64, buf);
            }
            SupervisorEvent::WorkerSignaled { index, pid, signal } => {
                buf.extend_from_slice(b"{\"type\":\"signaled\"");
                write_worker(*index, *pid, buf);
                buf.extend_from_slice(b",\"signal\":");
                write_i64(*signal as i64, buf);
            }
            SupervisorEvent::ReapBatch { drained } => {
                buf.extend_from_slice(b"{\"type\":\"reap_batch\",\"drained\":");
                write_u64(*drained as u64, buf);
            }
            SupervisorEvent::ArtifactWritten { index, pid, path } => {
                buf.extend_from_slice(b"{\"type\":\"artifact\"");
                write_worker(Some(*index), *pid, buf);
                buf.extend_from_slice(b",\"path\":\"");
                write_json_bytes(path, buf);
                buf.push(b'"');
            }
            SupervisorEvent::Diagnostic {
                level,
                pid,
                message,
            } => {
                buf.extend_from_slice(b"{\"type\":\"diagnostic\",\"level\":\"");
                write_json_str(level, buf);
                buf.push(b'"');
                if let Some(pid) = pid {
                    buf.extend_from_slice(b",\"pid\":");
                    write_u64(*pid as u64, buf);
                }
                buf.extend_from_slice(b",\"message\":\"");
                write_json_str(message, buf);
                buf.push(b'"');
            }
            SupervisorEvent::Summary(s) => {
                buf.extend_from_slice(b"{\"type\":\"summary\",\"workers\":");
                write_u64(s.workers, buf);
                buf.extend_from_slice(b",\"reaped\":");
                write_u64(s.reaped, buf);
                buf.extend_from_slice(b",\"artifacts\":");
                write_u64(s.artifacts, buf);
                buf.extend_from_slice(b",\"input_failures\":");
                write_u64(s.input_failures, buf);
                buf.extend_from_slice(b",\"interrupted\":");
                write_u64(s.interrupted, buf);
                buf.extend_from_slice(b",\"abnormal\":");
                write_u64(s.abnormal, buf);
                buf.extend_from_slice(b",\"elapsed_ms\":");
                write_u64(s.elapsed_ms, buf);
            }
        }
        buf.extend_from_slice(b"}\n");
    }
}

fn write_worker(index: Option<usize>, pid: u32, buf: &mut Vec<u8>) {
    if let Some(index) = index {
        buf.extend_from_slice(b",\"index\":");
        write_u64(index as u64, buf);
    }
    buf.extend_from_slice(b",\"pid\":");
    write_u64(pid as u64, buf);
}

// ============================================================================
// JSON primitives (no serde)
// ============================================================================

fn write_u64(n: u64, buf: &mut Vec<u8>) {
    if n == 0 {
        buf.push(b'0');
        return;
    }
    let start = buf.len();
    let mut v = n;
    while v > 0 {
        buf.push(b'0' + (v % 10) as u8);
        v /= 10;
    }
    buf[start..].reverse();
}

fn write_i64(n: i64, buf: &mut Vec<u8>) {
    if n < 0 {
        buf.push(b'-');
    }
    write_u64(n.unsigned_abs(), buf);
}

fn write_json_str(s: &str, buf: &mut Vec<u8>) {
    for byte in s.bytes() {
        match byte {
            b'"' => buf.extend_from_slice(b"\\\""),
            b'\\' => buf.extend_from_slice(b"\\\\"),
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            b'\t' => buf.extend_from_slice(b"\\t"),
            0x00..=0x1f => {
                buf.extend_from_slice(b"\\u00");
                buf.push(HEX_DIGITS[(byte >> 4) as usize]);
                buf.push(HEX_DIGITS[(byte & 0xf) as usize]);
            }
            _ => buf.push(byte),
        }
    }
}

/// Writes raw path bytes as a JSON string; invalid UTF-8 becomes U+FFFD.
fn write_json_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    write_json_str(&String::from_utf8_lossy(bytes), buf);
}

const HEX_DIGITS: [u8; 16] = *b"0123456789abcdef";

// ============================================================================
// Sinks
// ============================================================================

/// Writer-backed sink; one `write_all` per event.
///
/// Unbuffered on purpose for stderr: a fatal exit must not lose the lines
/// that explain it.
pub struct StreamEventSink<W: Write + Send> {
    writer: Mutex<W>,
    encoder: Box<dyn EventEncoder>,
}

impl<W: Write + Send> StreamEventSink<W> {
    pub fn new(writer: W, format: EventFormat) -> Self {
        Self {
            writer: Mutex::new(writer),
            encoder: encoder_for(format),
        }
    }
}

impl<W: Write + Send> EventSink for StreamEventSink<W> {
    fn emit(&self, event: SupervisorEvent<'_>) {
        let mut buf = Vec::with_capacity(128);
        self.encoder.encode(&event, &mut buf);
        let mut writer = self.writer.lock().expect("event sink mutex poisoned");
        if let Err(e) = writer.write_all(&buf) {
            if e.kind() == ErrorKind::BrokenPipe {
                return;
            }
            panic!("event sink write failed: {}", e);
        }
    }

    fn flush(&self) {
        let mut writer = self.writer.lock().expect("event sink mutex poisoned");
        if let Err(e) = writer.flush() {
            if e.kind() == ErrorKind::BrokenPipe {
                return;
            }
            panic!("event sink flush failed: {}", e);
        }
    }
}

fn encoder_for(format: EventFormat) -> Box<dyn EventEncoder> {
    match format {
        EventFormat::Text => Box::new(TextEncoder),
        EventFormat::Jsonl => Box::new(JsonlEncoder),
    }
}

/// Builds the default stderr sink for `format`.
pub fn stderr_sink(format: EventFormat) -> Arc<dyn EventSink> {
    Arc::new(StreamEventSink::new(io::stderr(), format))
}

/// Discards all events.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: SupervisorEvent<'_>) {}
    fn flush(&self) {}
}

/// Collects JSONL-encoded events in memory (for testing).
pub struct VecEventSink {
    buf: Mutex<Vec<u8>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            buf: Mutex::new(Vec::new()),
        }
    }

    /// Accumulated output as text, one JSON object per line.
    pub fn text(&self) -> String {
        let buf = self.buf.lock().expect("vec event sink mutex poisoned");
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Number of captured lines whose `type` is `kind`.
    pub fn count_type(&self, kind: &str) -> usize {
        let needle = format!("\"type\":\"{kind}\"");
        self.text().lines().filter(|l| l.contains(&needle)).count()
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn emit(&self, event: SupervisorEvent<'_>) {
        let mut tmp = Vec::with_capacity(128);
        JsonlEncoder.encode(&event, &mut tmp);
        let mut buf = self.buf.lock().expect("vec event sink mutex poisoned");
        buf.extend_from_slice(&tmp);
    }

    fn flush(&self) {}
}
