//! Call transcripts in JSON-lines format.
//!
//! A transcript is a header line (JSON object) followed by one line per
//! event, each a JSON array `[time, kind, data]` where `time` is the offset
//! from the start of the recording in seconds.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use callprobe_core::{CallFailure, CallId, Result, Utterance};

use crate::observer::CallObserver;

/// Transcript format version written in the header.
pub const TRANSCRIPT_VERSION: u8 = 1;

/// Transcript header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptHeader {
    /// Format version
    pub version: u8,
    /// Call the transcript belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
    /// RFC 3339 timestamp of recording start
    pub started_at: String,
}

/// Kind of a transcript event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The call was placed; data is the dialog URI
    Call,
    /// The session spoke; data is the rendered utterance
    Heard,
    /// The driver spoke
    Said,
    /// The driver keyed DTMF digits
    Digits,
    /// The driver hung up
    Hangup,
    /// An operation failed; data is the cause
    Failure,
}

/// A single transcript event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// Offset from start in seconds
    pub time: f64,
    /// What happened
    pub kind: EventKind,
    /// Event payload
    pub data: String,
}

#[derive(Debug)]
struct Inner {
    call_id: Option<CallId>,
    started_at: String,
    start_time: Instant,
    events: Vec<TranscriptEvent>,
}

/// Records what happened on a call.
///
/// Register it with [`Call::add_observer`](crate::Call::add_observer) and
/// save it once the call is over.
///
/// # Example
///
/// ```
/// use callprobe_core::CallId;
/// use callprobe_session::{CallObserver, EventKind, TranscriptRecorder};
///
/// let recorder = TranscriptRecorder::new();
/// let call = CallId::new();
/// recorder.call_placed(call, "file:hello.vxml");
/// recorder.input_sent(call, "yes");
///
/// let transcript = recorder.to_json_lines().unwrap();
/// assert_eq!(transcript.lines().count(), 3);
/// assert_eq!(recorder.events()[1].kind, EventKind::Said);
/// ```
#[derive(Debug)]
pub struct TranscriptRecorder {
    inner: Mutex<Inner>,
}

impl Default for TranscriptRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptRecorder {
    /// Create an empty recorder starting now.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                call_id: None,
                started_at: Utc::now().to_rfc3339(),
                start_time: Instant::now(),
                events: Vec::new(),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event.
    pub fn record(&self, kind: EventKind, data: impl Into<String>) {
        let mut inner = self.inner();
        let time = inner.start_time.elapsed().as_secs_f64();
        inner.events.push(TranscriptEvent {
            time,
            kind,
            data: data.into(),
        });
    }

    /// Call the transcript was recorded for, once known.
    pub fn call_id(&self) -> Option<CallId> {
        self.inner().call_id
    }

    /// Get the number of recorded events.
    pub fn event_count(&self) -> usize {
        self.inner().events.len()
    }

    /// Recorded events, in order.
    pub fn events(&self) -> Vec<TranscriptEvent> {
        self.inner().events.clone()
    }

    /// Offset of the last event in seconds.
    pub fn duration(&self) -> f64 {
        self.inner().events.last().map(|e| e.time).unwrap_or(0.0)
    }

    fn header(&self) -> TranscriptHeader {
        let inner = self.inner();
        TranscriptHeader {
            version: TRANSCRIPT_VERSION,
            call_id: inner.call_id,
            started_at: inner.started_at.clone(),
        }
    }

    /// Save the transcript to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        self.save_to_writer(&mut file)
    }

    /// Write the transcript to `writer`.
    pub fn save_to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        serde_json::to_writer(&mut *writer, &self.header())?;
        writeln!(writer)?;

        for event in self.events() {
            let line = serde_json::json!([event.time, event.kind, event.data]);
            serde_json::to_writer(&mut *writer, &line)?;
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Render the transcript as a string.
    pub fn to_json_lines(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.save_to_writer(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }

    /// Load a transcript from a file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse().map_err(Into::into)
    }
}

impl FromStr for TranscriptRecorder {
    type Err = io::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |e: serde_json::Error| io::Error::new(io::ErrorKind::InvalidData, e);
        let mut lines = content.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Empty transcript"))?;
        let header: TranscriptHeader = serde_json::from_str(header_line).map_err(invalid)?;

        let mut events = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let (time, kind, data): (f64, EventKind, String) =
                serde_json::from_str(line).map_err(invalid)?;
            events.push(TranscriptEvent { time, kind, data });
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                call_id: header.call_id,
                started_at: header.started_at,
                start_time: Instant::now(),
                events,
            }),
        })
    }
}

impl CallObserver for TranscriptRecorder {
    fn call_placed(&self, call: CallId, uri: &str) {
        self.inner().call_id = Some(call);
        self.record(EventKind::Call, uri);
    }

    fn utterance_heard(&self, _call: CallId, utterance: &Utterance) {
        self.record(EventKind::Heard, utterance.to_string());
    }

    fn input_sent(&self, _call: CallId, text: &str) {
        self.record(EventKind::Said, text);
    }

    fn digits_entered(&self, _call: CallId, digits: &str) {
        self.record(EventKind::Digits, digits);
    }

    fn hung_up(&self, _call: CallId) {
        self.record(EventKind::Hangup, "");
    }

    fn failed(&self, _call: CallId, failure: &CallFailure) {
        self.record(EventKind::Failure, failure.cause().to_string());
    }
}
