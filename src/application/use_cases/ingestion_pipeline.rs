use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::application::use_cases::aggregation::AggregationEngine;
use crate::application::use_cases::column_mapper::ColumnMapper;
use crate::application::use_cases::deduplication::DeduplicationStore;
use crate::application::use_cases::field_extractors::current_year;
use crate::application::use_cases::format_detector::{Detection, FormatDetector};
use crate::application::use_cases::ingestion_observer::{
    FileStage, IngestionEvent, IngestionObserver, TracingObserver,
};
use crate::application::use_cases::layout_rules::LayoutRules;
use crate::application::use_cases::record_normalizer::RecordNormalizer;
use crate::application::use_cases::summary_materializer::SummaryMaterializer;
use crate::domain::error::{AppError, Result};
use crate::domain::outcome::{
    Admission, FileOutcome, FileStatus, RunOutcome, SheetOutcome, SheetStatus, SummaryStatus,
};
use crate::domain::pensioner::PensionerRecord;
use crate::domain::pincode::PincodeDirectory;
use crate::domain::settings::Settings;
use crate::domain::sheet::{row_is_blank, RawSheet};
use crate::infrastructure::db::pension::repository::{
    LoadHistoryEntry, PensionRepository, LOAD_STATUS_ABORTED, LOAD_STATUS_COMPLETED,
    LOAD_STATUS_FAILED, LOAD_STATUS_UNCHANGED,
};
use crate::infrastructure::spreadsheet::{fingerprint_file, read_pincode_directory, read_source};

/// One sheet after detection and normalization, waiting to be written
struct PreparedSheet {
    outcome: SheetOutcome,
    records: Vec<PensionerRecord>,
}

/// What a file worker hands back to the run
struct FileResult {
    outcome: FileOutcome,
    accepted: AggregationEngine,
}

/// Loads pensioner files into the fact table and rebuilds the summaries.
///
/// Files are processed by a bounded pool of workers. Rows of one sheet are
/// handled in order with the layout decided once from its header. Records
/// are written in batches; the summary tables are rebuilt once after every
/// worker has finished.
#[derive(Clone)]
pub struct IngestionPipeline {
    repository: Arc<PensionRepository>,
    store: Arc<dyn DeduplicationStore>,
    rules: Arc<LayoutRules>,
    settings: Arc<Settings>,
    observer: Arc<dyn IngestionObserver>,
    directory: Option<Arc<PincodeDirectory>>,
}

impl IngestionPipeline {
    pub fn new(repository: Arc<PensionRepository>, settings: Settings, rules: LayoutRules) -> Self {
        Self {
            store: repository.clone(),
            repository,
            rules: Arc::new(rules),
            settings: Arc::new(settings),
            observer: Arc::new(TracingObserver),
            directory: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the key store used for admission. Load history and
    /// summaries still go to the repository.
    pub fn with_store(mut self, store: Arc<dyn DeduplicationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_directory(mut self, directory: Arc<PincodeDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Import the configured pincode directory CSV (if any) and use the
    /// stored directory for location lookups.
    pub async fn load_directory(mut self) -> Result<Self> {
        if let Some(path) = self.settings.ingestion.pincode_directory.clone() {
            let entries = tokio::task::spawn_blocking(move || read_pincode_directory(&path))
                .await
                .map_err(|e| AppError::Internal(format!("Directory reader panicked: {}", e)))??;
            let written = self.repository.upsert_pincodes(&entries).await?;
            tracing::info!(entries = written, "Pincode directory imported");
        }

        let directory = self.repository.load_pincode_directory().await?;
        if !directory.is_empty() {
            tracing::info!(entries = directory.len(), "Pincode directory loaded");
            self.directory = Some(Arc::new(directory));
        }
        Ok(self)
    }

    pub async fn run(&self, files: &[PathBuf]) -> Result<RunOutcome> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.run_with_shutdown(files, shutdown_rx).await
    }

    /// Run over `files`. Setting the watch value to `true` stops each worker
    /// before its next batch; batches already committed stay committed.
    pub async fn run_with_shutdown(
        &self,
        files: &[PathBuf],
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.observer.on_event(&IngestionEvent::RunStarted {
            run_id: run_id.clone(),
            files: files.len(),
        });

        let semaphore = Arc::new(Semaphore::new(self.settings.ingestion.max_workers.max(1)));
        let mut workers = JoinSet::new();
        for (index, path) in files.iter().cloned().enumerate() {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            let shutdown = shutdown.clone();
            let run_id = run_id.clone();
            workers.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => pipeline.process_file(&run_id, path, shutdown).await,
                    Err(e) => FileResult {
                        outcome: FileOutcome::new(
                            path,
                            FileStatus::Failed {
                                reason: format!("Worker pool closed: {}", e),
                            },
                        ),
                        accepted: AggregationEngine::new(),
                    },
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<FileOutcome>> = vec![None; files.len()];
        let mut accepted = AggregationEngine::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => {
                    accepted.merge(result.accepted);
                    slots[index] = Some(result.outcome);
                }
                Err(e) => tracing::error!(error = %e, "File worker panicked"),
            }
        }

        let outcomes: Vec<FileOutcome> = slots
            .into_iter()
            .zip(files)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| {
                    FileOutcome::new(
                        path.clone(),
                        FileStatus::Failed {
                            reason: "Worker panicked".to_string(),
                        },
                    )
                })
            })
            .collect();

        // Barrier: every worker has committed or given up.
        let summary = if outcomes.is_empty() {
            SummaryStatus::NotRun
        } else {
            self.materialize(&run_id, &outcomes).await
        };

        let mut outcome = RunOutcome::from_files(run_id, outcomes);
        outcome.run_buckets = accepted.buckets();
        outcome.summary = summary;

        self.observer.on_event(&IngestionEvent::RunFinished {
            run_id: outcome.run_id.clone(),
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
            skipped: outcome.skipped,
            errors: outcome.errors,
        });
        Ok(outcome)
    }

    async fn materialize(&self, run_id: &str, outcomes: &[FileOutcome]) -> SummaryStatus {
        let materializer = SummaryMaterializer::new(self.repository.clone())
            .with_verification(self.settings.ingestion.verify_summaries);

        match materializer.materialize(run_id).await {
            Ok(report) => {
                for drift in &report.drift {
                    self.observer.on_event(&IngestionEvent::SummaryDrift {
                        drift: drift.clone(),
                    });
                }
                for file in outcomes.iter().filter(|f| f.status == FileStatus::Completed) {
                    self.stage(&file.path, FileStage::Summarized);
                }
                SummaryStatus::Materialized(report)
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Summary materialization failed");
                SummaryStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn process_file(
        &self,
        run_id: &str,
        path: PathBuf,
        shutdown: watch::Receiver<bool>,
    ) -> FileResult {
        let started_at = Utc::now();
        let mut accepted = AggregationEngine::new();

        let (outcome, fingerprint) = if *shutdown.borrow() {
            (FileOutcome::new(path.clone(), FileStatus::Aborted), None)
        } else {
            self.stage(&path, FileStage::Opened);
            match self.load_file(run_id, &path, &shutdown, &mut accepted).await {
                Ok(loaded) => loaded,
                Err(e) => (
                    FileOutcome::new(
                        path.clone(),
                        FileStatus::Failed {
                            reason: e.to_string(),
                        },
                    ),
                    None,
                ),
            }
        };

        if outcome.status == FileStatus::Completed {
            self.stage(&path, FileStage::Committed);
        }
        self.record_history(run_id, &outcome, fingerprint, started_at)
            .await;

        self.observer.on_event(&IngestionEvent::FileFinished {
            path,
            status: outcome.status.clone(),
            inserted: outcome.inserted(),
            duplicates: outcome.duplicates(),
        });

        FileResult { outcome, accepted }
    }

    /// Errors returned here fail the whole file before anything was written.
    /// Write failures after that are folded into the outcome.
    async fn load_file(
        &self,
        run_id: &str,
        path: &Path,
        shutdown: &watch::Receiver<bool>,
        accepted: &mut AggregationEngine,
    ) -> Result<(FileOutcome, Option<String>)> {
        let fingerprint = {
            let path = path.to_path_buf();
            join_blocking(tokio::task::spawn_blocking(move || fingerprint_file(&path)).await)?
        };

        if self.settings.ingestion.skip_unchanged_files
            && self.repository.fingerprint_completed(&fingerprint).await?
        {
            return Ok((
                FileOutcome::new(path.to_path_buf(), FileStatus::Unchanged),
                Some(fingerprint),
            ));
        }

        let prepared = {
            let pipeline = self.clone();
            let path = path.to_path_buf();
            join_blocking(
                tokio::task::spawn_blocking(move || -> Result<Vec<PreparedSheet>> {
                    let sheets = read_source(&path)?;
                    Ok(pipeline.prepare_sheets(&path, sheets))
                })
                .await,
            )?
        };

        let mut outcome = FileOutcome::new(path.to_path_buf(), FileStatus::Completed);
        for sheet in prepared {
            if outcome.status != FileStatus::Completed {
                let PreparedSheet {
                    outcome: mut sheet_outcome,
                    records,
                } = sheet;
                sheet_outcome.not_attempted = records.len() as u64;
                outcome.sheets.push(sheet_outcome);
                continue;
            }
            let status = self
                .write_sheet(run_id, path, sheet, shutdown, accepted, &mut outcome)
                .await;
            outcome.status = status;
        }

        Ok((outcome, Some(fingerprint)))
    }

    /// Detect, map and normalize every sheet of a file. Runs on a blocking
    /// thread.
    fn prepare_sheets(&self, path: &Path, sheets: Vec<RawSheet>) -> Vec<PreparedSheet> {
        let reference_year = self
            .settings
            .ingestion
            .reference_year
            .unwrap_or_else(current_year);
        let source_file = path.display().to_string();
        let detector = FormatDetector::new(&self.rules, &self.settings.ingestion);
        let mapper = ColumnMapper::new(&self.rules, &self.settings.ingestion);

        let mut prepared = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            self.stage(path, FileStage::Detecting);

            let layout = match detector.detect(&sheet.rows) {
                Detection::Detected(layout) => layout,
                Detection::Empty => {
                    prepared.push(self.skip_sheet(path, &sheet.name, SheetStatus::Empty));
                    continue;
                }
                Detection::Unknown { .. } => {
                    prepared.push(self.skip_sheet(
                        path,
                        &sheet.name,
                        SheetStatus::FormatUndetected,
                    ));
                    continue;
                }
            };

            let mapping = match mapper.map(&layout, &sheet.rows) {
                Ok(mapping) => mapping,
                Err(e) => {
                    tracing::warn!(file = %path.display(), sheet = %sheet.name, error = %e, "Column mapping failed");
                    prepared.push(self.skip_sheet(
                        path,
                        &sheet.name,
                        SheetStatus::FormatUndetected,
                    ));
                    continue;
                }
            };
            self.observer.on_event(&IngestionEvent::SheetDetected {
                path: path.to_path_buf(),
                sheet: sheet.name.clone(),
                layout: layout.clone(),
            });

            self.stage(path, FileStage::Normalizing);
            let normalizer = RecordNormalizer::new(
                &mapping,
                &self.settings.normalization,
                reference_year,
                &source_file,
                &sheet.name,
            )
            .with_directory(self.directory.as_deref());

            let mut outcome = SheetOutcome::new(
                sheet.name.clone(),
                SheetStatus::Processed {
                    layout: layout.name.clone(),
                    positional_mapping: mapping.positional,
                },
            );
            let mut records = Vec::new();
            for (index, row) in sheet.rows.iter().enumerate().skip(mapping.data_start) {
                if row_is_blank(row) {
                    continue;
                }
                match normalizer.normalize(row) {
                    Ok((record, gaps)) => {
                        outcome.unparsed_pincodes += u64::from(gaps.pincode);
                        outcome.unparsed_birth_years += u64::from(gaps.birth_year);
                        records.push(record);
                    }
                    Err(reason) => {
                        outcome.skipped += 1;
                        self.observer.on_event(&IngestionEvent::RowSkipped {
                            path: path.to_path_buf(),
                            sheet: sheet.name.clone(),
                            row: index,
                            reason,
                        });
                    }
                }
            }

            prepared.push(PreparedSheet { outcome, records });
        }
        prepared
    }

    fn skip_sheet(&self, path: &Path, sheet: &str, status: SheetStatus) -> PreparedSheet {
        self.observer.on_event(&IngestionEvent::SheetSkipped {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
            status: status.clone(),
        });
        PreparedSheet {
            outcome: SheetOutcome::new(sheet, status),
            records: Vec::new(),
        }
    }

    /// Flush one sheet's records in batches. Returns the file status after
    /// the sheet: still `Completed` unless a batch failed or shutdown was
    /// requested.
    async fn write_sheet(
        &self,
        run_id: &str,
        path: &Path,
        sheet: PreparedSheet,
        shutdown: &watch::Receiver<bool>,
        accepted: &mut AggregationEngine,
        file: &mut FileOutcome,
    ) -> FileStatus {
        let PreparedSheet {
            mut outcome,
            records,
        } = sheet;

        if !records.is_empty() {
            self.stage(path, FileStage::Deduplicating);
        }

        let mut status = FileStatus::Completed;
        let mut attempted = 0usize;
        for batch in records.chunks(self.settings.ingestion.batch_size.max(1)) {
            if *shutdown.borrow() {
                tracing::info!(file = %path.display(), sheet = %outcome.sheet, "Shutdown requested, stopping file");
                status = FileStatus::Aborted;
                break;
            }

            attempted += batch.len();
            match self.flush_batch(run_id, path, batch).await {
                Ok(admissions) => {
                    for (record, admission) in batch.iter().zip(admissions) {
                        match admission {
                            Admission::Accepted => {
                                outcome.inserted += 1;
                                accepted.add(record);
                            }
                            Admission::Duplicate => outcome.duplicates += 1,
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        file = %path.display(),
                        sheet = %outcome.sheet,
                        rows = batch.len(),
                        error = %e,
                        "Batch write failed"
                    );
                    outcome.errors += batch.len() as u64;
                    status = FileStatus::Failed {
                        reason: e.to_string(),
                    };
                    break;
                }
            }
        }

        outcome.not_attempted = (records.len() - attempted) as u64;
        file.sheets.push(outcome);
        status
    }

    /// Write a batch, retrying once after a transient failure
    async fn flush_batch(
        &self,
        run_id: &str,
        path: &Path,
        batch: &[PensionerRecord],
    ) -> Result<Vec<Admission>> {
        match self.store.record_batch(run_id, batch).await {
            Err(e) if e.is_transient() => {
                self.observer.on_event(&IngestionEvent::BatchRetried {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
                tokio::time::sleep(Duration::from_millis(
                    self.settings.ingestion.retry_backoff_ms,
                ))
                .await;
                self.store.record_batch(run_id, batch).await
            }
            result => result,
        }
    }

    async fn record_history(
        &self,
        run_id: &str,
        outcome: &FileOutcome,
        fingerprint: Option<String>,
        started_at: chrono::DateTime<Utc>,
    ) {
        let (status, detail) = match &outcome.status {
            FileStatus::Completed => (LOAD_STATUS_COMPLETED, None),
            FileStatus::Unchanged => (LOAD_STATUS_UNCHANGED, None),
            FileStatus::Aborted => (LOAD_STATUS_ABORTED, None),
            FileStatus::Failed { reason } => (LOAD_STATUS_FAILED, Some(reason.clone())),
        };
        let entry = LoadHistoryEntry {
            run_id: run_id.to_string(),
            file_path: outcome.path.display().to_string(),
            file_sha256: fingerprint,
            status: status.to_string(),
            inserted: outcome.inserted(),
            duplicates: outcome.duplicates(),
            skipped: outcome.skipped(),
            errors: outcome.errors(),
            detail,
            started_at,
            finished_at: Utc::now(),
        };

        if let Err(e) = self.repository.record_load(&entry).await {
            tracing::warn!(file = %outcome.path.display(), error = %e, "Failed to record load history");
        }
    }

    fn stage(&self, path: &Path, stage: FileStage) {
        self.observer.on_event(&IngestionEvent::Stage {
            path: path.to_path_buf(),
            stage,
        });
    }
}

fn join_blocking<T>(
    joined: std::result::Result<Result<T>, tokio::task::JoinError>,
) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(AppError::Internal(format!("Blocking task failed: {}", e))),
    }
}
