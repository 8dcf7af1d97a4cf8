// src/poll_loop.rs

use crate::dedup::{DedupKey, build_unique_key};
use crate::drive::{FolderSource, InvoiceFileRef};
use crate::error::{PipelineError, StoreError};
use crate::fields::FIELDS;
use crate::llm_extract::FieldExtractor;
use crate::processed_store::ProcessedKeys;
use crate::sheet_writer::{AppendOutcome, SheetSink};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Collaborators built once at startup and handed to the loop.
pub struct PipelineContext {
    pub source: Box<dyn FolderSource>,
    pub extractor: FieldExtractor,
    pub sheet: Box<dyn SheetSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    ShuttingDown,
}

/// What happened to one file in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Written(DedupKey),
    Duplicate(DedupKey),
    Unreadable,
    Quarantined,
    ModelFailed,
    WriteFailed,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub listed: usize,
    pub written: usize,
    pub duplicates: usize,
    pub unreadable: usize,
    pub quarantined: usize,
    pub failed: usize,
}

impl CycleReport {
    fn count(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Written(_) => self.written += 1,
            FileOutcome::Duplicate(_) => self.duplicates += 1,
            FileOutcome::Unreadable => self.unreadable += 1,
            FileOutcome::Quarantined => self.quarantined += 1,
            FileOutcome::ModelFailed | FileOutcome::WriteFailed => self.failed += 1,
        }
    }
}

pub struct PollLoop {
    ctx: PipelineContext,
    keys: ProcessedKeys,
    /// Failed read attempts per file id, for files never read successfully.
    read_failures: HashMap<String, u32>,
    max_read_attempts: u32,
    interval: Duration,
    state: LoopState,
}

impl PollLoop {
    pub fn new(
        ctx: PipelineContext,
        keys: ProcessedKeys,
        interval: Duration,
        max_read_attempts: u32,
    ) -> Self {
        Self {
            ctx,
            keys,
            read_failures: HashMap::new(),
            max_read_attempts,
            interval,
            state: LoopState::Polling,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn processed_count(&self) -> usize {
        self.keys.len()
    }

    /// Poll until `shutdown` resolves, or after one cycle when `once` is set.
    ///
    /// `shutdown` is raced against every cycle and every sleep, so an
    /// interrupt during a model call or while waiting stops the loop at once.
    pub async fn run<F>(&mut self, shutdown: F, once: bool)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        while self.state == LoopState::Polling {
            let cycle = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                result = self.run_cycle() => Some(result),
            };

            match cycle {
                None => {
                    self.state = LoopState::ShuttingDown;
                    break;
                }
                Some(Ok(report)) => info!(
                    listed = report.listed,
                    written = report.written,
                    duplicates = report.duplicates,
                    unreadable = report.unreadable,
                    quarantined = report.quarantined,
                    failed = report.failed,
                    "Cycle complete"
                ),
                Some(Err(e)) => error!(error = %e, "Cycle aborted"),
            }

            if once {
                break;
            }

            info!(secs = self.interval.as_secs(), "Waiting for next check");
            tokio::select! {
                biased;
                _ = &mut shutdown => self.state = LoopState::ShuttingDown,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(
            keys = self.keys.len(),
            log = %self.keys.log_path().display(),
            "Processed invoice keys are saved; safe to restart"
        );
    }

    /// List the folder once and push every file through the pipeline.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, PipelineError> {
        info!("Checking folder for new files");
        let files = self.ctx.source.list_pdfs().await?;

        let mut report = CycleReport {
            listed: files.len(),
            ..Default::default()
        };

        for file in &files {
            let span = info_span!("invoice", file = %file.name, id = %file.id);
            let outcome = self.process_file(file).instrument(span).await?;
            report.count(&outcome);
        }
        Ok(report)
    }

    async fn process_file(&mut self, file: &InvoiceFileRef) -> Result<FileOutcome, StoreError> {
        if self.is_quarantined(&file.id) {
            return Ok(FileOutcome::Quarantined);
        }

        let text = match self.ctx.source.read_text(file).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to read file");
                String::new()
            }
        };

        if text.trim().is_empty() {
            self.note_read_failure(&file.id);
            warn!("No text found, skipping");
            return Ok(FileOutcome::Unreadable);
        }
        self.read_failures.remove(&file.id);

        let mut fields = match self.ctx.extractor.extract(&text).await {
            Ok(fields) => fields,
            Err(e) => {
                error!(error = %e, "Model call failed, will retry next cycle");
                return Ok(FileOutcome::ModelFailed);
            }
        };

        let key = build_unique_key(&fields, &file.content_hash);
        if self.keys.contains(&key) {
            info!(key = %key, "Skipping already processed invoice");
            return Ok(FileOutcome::Duplicate(key));
        }

        fields.normalize(&FIELDS);
        fields.set("file_name", file.name.as_str());

        match self.ctx.sheet.write(&fields, &FIELDS).await {
            AppendOutcome::Success { row } => debug!(columns = row.len(), "Row appended"),
            AppendOutcome::Error { message } => {
                warn!(key = %key, error = %message, "Row not written, invoice left unprocessed");
                return Ok(FileOutcome::WriteFailed);
            }
        }

        self.keys.record(key.clone())?;
        info!(key = %key, "Successfully processed invoice");
        Ok(FileOutcome::Written(key))
    }

    fn is_quarantined(&self, file_id: &str) -> bool {
        self.max_read_attempts > 0
            && self
                .read_failures
                .get(file_id)
                .is_some_and(|n| *n >= self.max_read_attempts)
    }

    fn note_read_failure(&mut self, file_id: &str) {
        let attempts = self.read_failures.entry(file_id.to_string()).or_insert(0);
        *attempts += 1;
        if self.max_read_attempts > 0 && *attempts == self.max_read_attempts {
            warn!(
                attempts = *attempts,
                "File quarantined after repeated read failures"
            );
        }
    }
}
