use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::domain::layout::DetectedLayout;
use crate::domain::outcome::{FileStatus, SheetStatus, SkipReason};
use crate::domain::summary::SummaryDrift;

pub const MEMORY_LOG_CAPACITY: usize = 100;

/// Per-file pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStage {
    Opened,
    Detecting,
    Normalizing,
    Deduplicating,
    Committed,
    Summarized,
}

/// Progress reported by the pipeline. Reporting goes through an injected
/// observer only; the pipeline keeps no global state.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionEvent {
    RunStarted { run_id: String, files: usize },
    Stage { path: PathBuf, stage: FileStage },
    SheetDetected { path: PathBuf, sheet: String, layout: DetectedLayout },
    SheetSkipped { path: PathBuf, sheet: String, status: SheetStatus },
    RowSkipped { path: PathBuf, sheet: String, row: usize, reason: SkipReason },
    BatchRetried { path: PathBuf, error: String },
    FileFinished { path: PathBuf, status: FileStatus, inserted: u64, duplicates: u64 },
    SummaryDrift { drift: SummaryDrift },
    RunFinished { run_id: String, inserted: u64, duplicates: u64, skipped: u64, errors: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "DEBUG",
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
        }
    }
}

impl IngestionEvent {
    pub fn level(&self) -> EventLevel {
        match self {
            IngestionEvent::RowSkipped { .. } | IngestionEvent::Stage { .. } => EventLevel::Debug,
            IngestionEvent::SheetSkipped { status, .. } => match status {
                SheetStatus::FormatUndetected => EventLevel::Warn,
                _ => EventLevel::Info,
            },
            IngestionEvent::BatchRetried { .. } | IngestionEvent::SummaryDrift { .. } => {
                EventLevel::Warn
            }
            IngestionEvent::FileFinished { status, .. } => match status {
                FileStatus::Failed { .. } | FileStatus::Aborted => EventLevel::Warn,
                _ => EventLevel::Info,
            },
            _ => EventLevel::Info,
        }
    }
}

impl fmt::Display for IngestionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestionEvent::RunStarted { run_id, files } => {
                write!(f, "Run {} started with {} file(s)", run_id, files)
            }
            IngestionEvent::Stage { path, stage } => {
                write!(f, "{}: {:?}", path.display(), stage)
            }
            IngestionEvent::SheetDetected { path, sheet, layout } => write!(
                f,
                "{} [{}]: layout {} ({})",
                path.display(),
                sheet,
                layout.name,
                if layout.is_positional() { "positional" } else { "keywords" }
            ),
            IngestionEvent::SheetSkipped { path, sheet, status } => {
                write!(f, "{} [{}]: skipped ({:?})", path.display(), sheet, status)
            }
            IngestionEvent::RowSkipped { path, sheet, row, reason } => write!(
                f,
                "{} [{}] row {}: skipped ({:?})",
                path.display(),
                sheet,
                row + 1,
                reason
            ),
            IngestionEvent::BatchRetried { path, error } => {
                write!(f, "{}: retrying batch after {}", path.display(), error)
            }
            IngestionEvent::FileFinished { path, status, inserted, duplicates } => write!(
                f,
                "{}: {:?} (inserted {}, duplicates {})",
                path.display(),
                status,
                inserted,
                duplicates
            ),
            IngestionEvent::SummaryDrift { drift } => write!(
                f,
                "Summary drift {} {} {}: stored {} actual {}",
                drift.key.dimension,
                drift.key.value,
                drift.key.age_category,
                drift.stored,
                drift.actual
            ),
            IngestionEvent::RunFinished { run_id, inserted, duplicates, skipped, errors } => write!(
                f,
                "Run {} finished: inserted {}, duplicates {}, skipped {}, errors {}",
                run_id, inserted, duplicates, skipped, errors
            ),
        }
    }
}

pub trait IngestionObserver: Send + Sync {
    fn on_event(&self, event: &IngestionEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_event(&self, event: &IngestionEvent) {
        match event {
            IngestionEvent::RunStarted { run_id, files } => {
                tracing::info!(run_id = %run_id, files = *files, "Ingestion run started");
            }
            IngestionEvent::Stage { path, stage } => {
                tracing::debug!(file = %path.display(), stage = ?stage, "File stage");
            }
            IngestionEvent::SheetDetected { path, sheet, layout } => {
                tracing::info!(
                    file = %path.display(),
                    sheet = %sheet,
                    layout = %layout.name,
                    positional = layout.is_positional(),
                    "Sheet layout detected"
                );
            }
            IngestionEvent::SheetSkipped { path, sheet, status } => match status {
                SheetStatus::FormatUndetected => tracing::warn!(
                    file = %path.display(),
                    sheet = %sheet,
                    "Sheet format undetected, skipped"
                ),
                _ => tracing::info!(file = %path.display(), sheet = %sheet, "Empty sheet skipped"),
            },
            IngestionEvent::RowSkipped { path, sheet, row, reason } => {
                tracing::debug!(
                    file = %path.display(),
                    sheet = %sheet,
                    row = *row + 1,
                    reason = ?reason,
                    "Row skipped"
                );
            }
            IngestionEvent::BatchRetried { path, error } => {
                tracing::warn!(file = %path.display(), error = %error, "Retrying batch");
            }
            IngestionEvent::FileFinished { .. } => match event.level() {
                EventLevel::Warn => tracing::warn!("{}", event),
                _ => tracing::info!("{}", event),
            },
            IngestionEvent::SummaryDrift { .. } => tracing::warn!("{}", event),
            IngestionEvent::RunFinished { .. } => tracing::info!("{}", event),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

/// Keeps the most recent events in memory for embedding hosts and tests
#[derive(Debug)]
pub struct MemoryLogObserver {
    source: String,
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl Default for MemoryLogObserver {
    fn default() -> Self {
        Self::new("INGEST", MEMORY_LOG_CAPACITY)
    }
}

impl MemoryLogObserver {
    pub fn new(source: impl Into<String>, capacity: usize) -> Self {
        Self {
            source: source.into(),
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add_log(&self, level: &str, message: &str) -> LogEntry {
        let entry = LogEntry {
            time: Local::now().format("%H:%M:%S").to_string(),
            level: level.to_string(),
            source: self.source.clone(),
            message: message.to_string(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(entry.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
        entry
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl IngestionObserver for MemoryLogObserver {
    fn on_event(&self, event: &IngestionEvent) {
        self.add_log(event.level().as_str(), &event.to_string());
    }
}

/// Sends every event to each inner observer in order
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl FanoutObserver {
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl IngestionObserver for FanoutObserver {
    fn on_event(&self, event: &IngestionEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}
