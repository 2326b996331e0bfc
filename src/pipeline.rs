//! The batch annotation loop.
//!
//! Records are filtered once, split into batches, and each batch goes
//! through annotate → parse → align → merge → write before the next one
//! starts. Only annotation failures and sink failures stop a run; a reply
//! that does not fit its batch degrades to sentinel tagging instead.

use std::sync::Arc;

use thiserror::Error;

use crate::annotator::{
    AnnotationError, Annotator, CardText, ResponseMarkers, ResponseParser, align, merge_into,
};
use crate::batcher::{BatchFilter, DEFAULT_BATCH_SIZE, make_batches};
use crate::models::{FieldSchema, Record};
use crate::store::{self, StoreError};
use crate::writer::RecordSink;

/// Tag applied to every record of a batch whose reply could not be trusted.
pub const DEFAULT_SENTINEL_TAG: &str = "unsure";

/// Errors that stop a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The annotation service failed; rerun with `--start-from-card {resume_from}`
    #[error("Annotation failed at card {resume_from}: {source}")]
    Annotation {
        resume_from: usize,
        #[source]
        source: AnnotationError,
    },

    /// Output could not be written
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Response markers could not be compiled
    #[error("Invalid response markers: {0}")]
    Markers(#[from] regex::Error),
}

/// Everything the pipeline needs besides the annotator and the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub schema: FieldSchema,
    pub filter: BatchFilter,
    pub batch_size: usize,
    pub sentinel_tag: String,
    pub markers: ResponseMarkers,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema: FieldSchema::default(),
            filter: BatchFilter::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            sentinel_tag: DEFAULT_SENTINEL_TAG.to_string(),
            markers: ResponseMarkers::default(),
        }
    }
}

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Source index of the first record in the batch.
    pub first_card: usize,
    pub records: usize,
    /// Parsed reply lines.
    pub parsed: usize,
    /// The reply was discarded and the sentinel tag applied to every record.
    pub fallback: bool,
    /// Alignment was not one-to-one.
    pub low_confidence: bool,
    /// Records that received no new tags.
    pub untagged: usize,
    /// Records left out of the output because a field could not be written.
    pub skipped: usize,
}

/// Totals for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub records_written: usize,
    pub fallback_batches: usize,
    pub low_confidence_batches: usize,
    pub untagged_records: usize,
    pub skipped_records: usize,
}

impl RunSummary {
    fn record(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.records_written += report.records - report.skipped;
        self.fallback_batches += usize::from(report.fallback);
        self.low_confidence_batches += usize::from(report.low_confidence);
        self.untagged_records += report.untagged;
        self.skipped_records += report.skipped;
    }
}

/// Builder for constructing `Pipeline` instances.
#[derive(Default)]
pub struct PipelineBuilder {
    annotator: Option<Arc<dyn Annotator>>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the annotator every batch is sent to.
    pub fn annotator(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn filter(mut self, filter: BatchFilter) -> Self {
        self.config.filter = filter;
        self
    }

    /// Builds the `Pipeline`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Markers` if the response markers cannot be compiled.
    ///
    /// # Panics
    ///
    /// Panics if `annotator()` was not called before `build()`.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let parser = ResponseParser::new(&self.config.markers)?;
        Ok(Pipeline {
            annotator: self
                .annotator
                .expect("annotator must be set via annotator() method"),
            parser,
            config: self.config,
        })
    }
}

/// Sequential batch annotation pipeline.
pub struct Pipeline {
    annotator: Arc<dyn Annotator>,
    parser: ResponseParser,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Filters `records`, then annotates and writes them batch by batch.
    ///
    /// Each batch is committed to `sink` before the next is sent, so on
    /// failure everything before the failing batch is already persisted.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Annotation` (carrying the resume offset) if the
    /// annotation service fails, or `PipelineError::Store` if the sink fails.
    pub fn run(
        &self,
        records: Vec<Record>,
        sink: &mut dyn RecordSink,
    ) -> Result<RunSummary, PipelineError> {
        let selected = self.config.filter.apply(records, &self.config.schema);
        let batches = make_batches(selected, self.config.batch_size);
        let total = batches.len();
        let mut summary = RunSummary::default();

        tracing::info!(
            "Processing {} batches of up to {} cards",
            total,
            self.config.batch_size
        );

        for (idx, mut batch) in batches.into_iter().enumerate() {
            let mut report = self
                .process_batch(&mut batch)
                .map_err(|source| PipelineError::Annotation {
                    resume_from: batch.first().map_or(0, Record::source_index),
                    source,
                })?;

            report.skipped = drop_unwritable(&mut batch);
            sink.append_batch(&batch)?;
            summary.record(&report);

            tracing::info!(
                batch = idx + 1,
                total,
                first_card = report.first_card,
                untagged = report.untagged,
                skipped = report.skipped,
                "Batch committed"
            );
        }

        Ok(summary)
    }

    /// Annotates one batch and merges the resulting tags into it.
    ///
    /// When the number of parsed reply lines differs from the batch size the
    /// reply is discarded and every record receives the sentinel tag.
    ///
    /// # Errors
    ///
    /// Returns the annotator's error unchanged; the batch is left untouched.
    pub fn process_batch(&self, batch: &mut [Record]) -> Result<BatchReport, AnnotationError> {
        let schema = &self.config.schema;
        let first_card = batch.first().map_or(0, Record::source_index);

        let cards: Vec<CardText<'_>> = batch
            .iter()
            .map(|record| CardText {
                front: record.front(schema),
                back: record.back(schema),
            })
            .collect();
        let raw = self.annotator.annotate(&cards)?;

        let parsed = self.parser.parse(&raw);
        let alignment = align(batch, &parsed, schema);
        let low_confidence = alignment.is_low_confidence();

        let fallback = parsed.len() != batch.len();
        let tags = if fallback {
            tracing::warn!(
                first_card,
                parsed = parsed.len(),
                expected = batch.len(),
                "Reply line count does not match batch size, tagging batch as '{}'",
                self.config.sentinel_tag
            );
            vec![self.config.sentinel_tag.clone(); batch.len()]
        } else {
            if low_confidence {
                tracing::warn!(
                    first_card,
                    unmatched_records = alignment.unmatched_records,
                    unmatched_entries = alignment.unmatched_entries,
                    "Reply did not align one-to-one with batch"
                );
            }
            alignment.tags
        };

        let untagged = tags.iter().filter(|t| t.trim().is_empty()).count();
        for (record, new_tags) in batch.iter_mut().zip(&tags) {
            merge_into(record, schema, new_tags);
        }

        Ok(BatchReport {
            first_card,
            records: batch.len(),
            parsed: parsed.len(),
            fallback,
            low_confidence: !fallback && low_confidence,
            untagged,
            skipped: 0,
        })
    }
}

/// Removes records the sink would refuse, so one bad card cannot stop the run.
fn drop_unwritable(batch: &mut Vec<Record>) -> usize {
    let before = batch.len();
    batch.retain(|record| match store::validate_record(record) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Leaving card out of the output: {e}");
            false
        }
    });
    before - batch.len()
}
