//! Finished test submissions and the audit trail.
//!
//! Handlers write through the [`RecordSink`] trait.  Two sinks ship with the
//! crate: [`MemoryRecordSink`] keeps everything in process and can list it
//! back, [`JsonlRecordSink`] appends one JSON object per line to a
//! size-rotated file.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::position::Position;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    QuestionGenerated,
    FallbackServed,
    AdmissionRejected,
    ProviderFailed,
    Submission,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub actor: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, actor: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            actor: actor.into(),
            description: description.into(),
            details: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Body accepted by the submission endpoint.  Field names follow the
/// client's camelCase; the older snake_case names are accepted too.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default, alias = "choice_score")]
    pub choice_score: Option<u32>,
    #[serde(default, alias = "total_choice")]
    pub total_choice: Option<u32>,
    #[serde(default, alias = "personality_analysis")]
    pub personality_analysis: Option<Value>,
    #[serde(default, alias = "avg_response_time")]
    pub avg_response_time: Option<f64>,
    #[serde(default, alias = "answer_change_count")]
    pub answer_change_count: Option<u32>,
    #[serde(default, alias = "behavior_pattern")]
    pub behavior_pattern: Option<String>,
    #[serde(default)]
    pub answers: Option<Value>,
    #[serde(default, alias = "challenge_answers")]
    pub challenge_answers: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: String,
    pub choice_score: u32,
    pub total_choice: u32,
    pub personality_analysis: Value,
    pub avg_response_time: f64,
    pub answer_change_count: u32,
    pub behavior_pattern: Option<String>,
    pub answers: Value,
    pub challenge_answers: Value,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Build a record from a checked input.  `name` must already be known to
    /// be present and non-empty.
    pub fn from_input(input: SubmissionInput, name: String, position: Position) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email: input.email.unwrap_or_default(),
            phone: input.phone.filter(|p| !p.trim().is_empty()),
            position: position.code().to_string(),
            choice_score: input.choice_score.unwrap_or(0),
            total_choice: input.total_choice.unwrap_or(0),
            personality_analysis: input.personality_analysis.unwrap_or(Value::Null),
            avg_response_time: input.avg_response_time.unwrap_or(0.0),
            answer_change_count: input.answer_change_count.unwrap_or(0),
            behavior_pattern: input.behavior_pattern,
            answers: input.answers.unwrap_or(Value::Null),
            challenge_answers: input.challenge_answers.unwrap_or(Value::Null),
            created_at: Utc::now(),
        }
    }
}

pub trait RecordSink: Send + Sync {
    fn record_submission(&self, record: &SubmissionRecord) -> Result<(), RecordError>;
    fn append_audit(&self, entry: &AuditEntry) -> Result<(), RecordError>;
}

/// In-process sink.  Listings are returned newest first.
#[derive(Default)]
pub struct MemoryRecordSink {
    submissions: Mutex<Vec<SubmissionRecord>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MemoryRecordSink {
    pub fn submission(&self, id: Uuid) -> Option<SubmissionRecord> {
        lock(&self.submissions).iter().find(|r| r.id == id).cloned()
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        lock(&self.submissions).iter().rev().cloned().collect()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        lock(&self.audit).iter().rev().cloned().collect()
    }

    pub fn audit_entries_for(&self, action: AuditAction) -> Vec<AuditEntry> {
        lock(&self.audit)
            .iter()
            .rev()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl RecordSink for MemoryRecordSink {
    fn record_submission(&self, record: &SubmissionRecord) -> Result<(), RecordError> {
        lock(&self.submissions).push(record.clone());
        Ok(())
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), RecordError> {
        lock(&self.audit).push(entry.clone());
        Ok(())
    }
}

/// Size-based rotating append-only file.  Backups are named `<path>.1`
/// through `<path>.<keep>` (with a `.gz` suffix when compressing), `.1`
/// being the most recent.
pub struct RotatingWriter {
    path: PathBuf,
    file: fs::File,
    max_bytes: Option<u64>,
    keep: usize,
    compress: bool,
}

impl RotatingWriter {
    pub fn open(
        path: impl AsRef<Path>,
        max_bytes: Option<u64>,
        keep: usize,
        compress: bool,
    ) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            max_bytes,
            keep,
            compress,
        })
    }

    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if let Some(limit) = self.max_bytes {
            if self.current_size().is_some_and(|sz| sz >= limit) {
                self.rotate()?;
            }
        }
        writeln!(self.file, "{}", line)
    }

    pub fn current_size(&self) -> Option<u64> {
        self.path.metadata().ok().map(|m| m.len())
    }

    pub fn backup_path(&self, idx: usize) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{idx}"));
        if self.compress {
            name.push(".gz");
        }
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        if self.keep > 0 {
            for idx in (1..self.keep).rev() {
                let from = self.backup_path(idx);
                if from.exists() {
                    fs::rename(&from, self.backup_path(idx + 1))?;
                }
            }
            let mut plain = OsString::from(self.path.as_os_str());
            plain.push(".1");
            let plain = PathBuf::from(plain);
            fs::rename(&self.path, &plain)?;
            if self.compress {
                let data = fs::read(&plain)?;
                let mut gz = GzEncoder::new(Vec::new(), Compression::default());
                gz.write_all(&data)?;
                fs::write(self.backup_path(1), gz.finish()?)?;
                fs::remove_file(&plain)?;
            }
        }
        self.file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        tracing::debug!(path = %self.path.display(), keep = self.keep, "record file rotated");
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JsonlLine<'a> {
    Submission { record: &'a SubmissionRecord },
    Audit { entry: &'a AuditEntry },
}

/// Counters a [`JsonlRecordSink`] updates for the metrics endpoint.
#[derive(Clone, Default)]
pub struct SinkCounters {
    pub lines_total: Arc<AtomicU64>,
    pub write_errors_total: Arc<AtomicU64>,
    pub file_size_bytes: Arc<AtomicU64>,
}

/// Appends `{"kind": "submission" | "audit", ...}` lines to a rotating file.
pub struct JsonlRecordSink {
    writer: Mutex<RotatingWriter>,
    counters: SinkCounters,
}

impl JsonlRecordSink {
    pub fn new(writer: RotatingWriter, counters: SinkCounters) -> Self {
        Self {
            writer: Mutex::new(writer),
            counters,
        }
    }

    fn write(&self, line: &JsonlLine<'_>) -> Result<(), RecordError> {
        let text = serde_json::to_string(line)?;
        let mut writer = lock(&self.writer);
        match writer.write_line(&text) {
            Ok(()) => {
                self.counters.lines_total.fetch_add(1, Ordering::Relaxed);
                if let Some(sz) = writer.current_size() {
                    self.counters.file_size_bytes.store(sz, Ordering::Relaxed);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to write record line");
                self.counters
                    .write_errors_total
                    .fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }
}

impl RecordSink for JsonlRecordSink {
    fn record_submission(&self, record: &SubmissionRecord) -> Result<(), RecordError> {
        self.write(&JsonlLine::Submission { record })
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), RecordError> {
        self.write(&JsonlLine::Audit { entry })
    }
}
