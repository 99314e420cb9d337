//! Stage batch runner: the processing state machine.
//!
//! A [`Stage`] turns one record into a record with a strictly later status.
//! [`run_stage`] drives a batch through a stage with bounded concurrency,
//! enforces the status transition rules, and isolates per-record failures
//! so one bad paper never aborts the rest of the batch.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use paperflow_shared::{PaperRecord, PaperflowError, ProcessingStatus, Result};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

// ---------------------------------------------------------------------------
// Stage contract
// ---------------------------------------------------------------------------

/// How a stage finished with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The output moves on to the next stage.
    Advanced,
    /// The output is `Failed`; it is persisted but goes no further.
    Terminated(String),
}

/// One pipeline transformation.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    type Input: PaperRecord + Send + Sync + 'static;
    type Output: PaperRecord + Send + 'static;

    fn name(&self) -> &'static str;

    /// Status every input must carry.
    fn input_status(&self) -> ProcessingStatus;

    /// Status of an `Advanced` output.
    fn output_status(&self) -> ProcessingStatus;

    async fn apply(&self, input: &Self::Input) -> Result<(Self::Output, StageOutcome)>;
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

/// Per-record result of a batch.
#[derive(Debug)]
pub enum ItemOutcome<O> {
    Advanced(O),
    Terminated { record: O, reason: String },
    /// Transformation error, illegal transition, or a panicked task.
    Errored(String),
    /// The input was already `Failed` and was not handed to the stage.
    Skipped,
}

impl<O> ItemOutcome<O> {
    /// Record to persist, if the stage produced one.
    pub fn record(&self) -> Option<&O> {
        match self {
            Self::Advanced(record) | Self::Terminated { record, .. } => Some(record),
            Self::Errored(_) | Self::Skipped => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Advanced(_) => "advanced",
            Self::Terminated { .. } => "terminated",
            Self::Errored(_) => "errored",
            Self::Skipped => "skipped",
        }
    }
}

/// Batch counts. `failed` is `terminated + errored`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub advanced: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

/// Ordered `(paper_id, outcome)` pairs plus their summary.
#[derive(Debug)]
pub struct BatchReport<O> {
    pub stage: &'static str,
    pub items: Vec<(String, ItemOutcome<O>)>,
    pub summary: BatchSummary,
}

impl<O> BatchReport<O> {
    pub fn from_items(stage: &'static str, items: Vec<(String, ItemOutcome<O>)>) -> Self {
        let summary = summarize(&items);
        Self {
            stage,
            items,
            summary,
        }
    }

    /// Records that advanced, in input order.
    pub fn advanced(&self) -> impl Iterator<Item = &O> {
        self.items.iter().filter_map(|(_, outcome)| match outcome {
            ItemOutcome::Advanced(record) => Some(record),
            _ => None,
        })
    }

    /// Turn a produced record into an error after the fact (e.g. it could
    /// not be persisted), keeping the summary consistent.
    pub fn mark_errored(&mut self, index: usize, message: String) {
        if let Some((_, outcome)) = self.items.get_mut(index) {
            *outcome = ItemOutcome::Errored(message);
        }
        self.summary = summarize(&self.items);
    }
}

fn summarize<O>(items: &[(String, ItemOutcome<O>)]) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for (_, outcome) in items {
        match outcome {
            ItemOutcome::Advanced(_) => {
                summary.processed += 1;
                summary.advanced += 1;
            }
            ItemOutcome::Terminated { .. } => {
                summary.processed += 1;
                summary.failed += 1;
            }
            ItemOutcome::Errored(_) => {
                summary.processed += 1;
                summary.failed += 1;
                summary.errored += 1;
            }
            ItemOutcome::Skipped => summary.skipped += 1,
        }
    }
    summary
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting stage status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts.
    fn phase(&self, name: &str);
    /// Called as each record finishes, in input order.
    fn item_done(&self, paper_id: &str, outcome: &str, current: usize, total: usize);
    /// Called when the stage completes.
    fn done(&self, stage: &str, summary: &BatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _paper_id: &str, _outcome: &str, _current: usize, _total: usize) {}
    fn done(&self, _stage: &str, _summary: &BatchSummary) {}
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

fn check_output<S: Stage>(
    stage: &S,
    input: &S::Input,
    output: S::Output,
    outcome: StageOutcome,
) -> ItemOutcome<S::Output> {
    let from = input.status();
    let to = output.status();
    let expected = match outcome {
        StageOutcome::Advanced => stage.output_status(),
        StageOutcome::Terminated(_) => ProcessingStatus::Failed,
    };

    if to != expected || !from.can_transition_to(to) {
        let err = PaperflowError::InvalidTransition {
            paper_id: input.paper_id().to_string(),
            from,
            to,
        };
        return ItemOutcome::Errored(err.to_string());
    }

    match outcome {
        StageOutcome::Advanced => ItemOutcome::Advanced(output),
        StageOutcome::Terminated(reason) => ItemOutcome::Terminated {
            record: output,
            reason,
        },
    }
}

async fn process_one<S: Stage>(stage: &S, input: &S::Input) -> ItemOutcome<S::Output> {
    if input.status() != stage.input_status() {
        let err = PaperflowError::InvalidTransition {
            paper_id: input.paper_id().to_string(),
            from: input.status(),
            to: stage.output_status(),
        };
        return ItemOutcome::Errored(err.to_string());
    }

    match stage.apply(input).await {
        Ok((output, outcome)) => check_output(stage, input, output, outcome),
        Err(e) => ItemOutcome::Errored(e.to_string()),
    }
}

/// Run `inputs` through `stage`, at most `concurrency` at a time.
///
/// Results come back in input order. `Failed` inputs are skipped without
/// calling the stage.
#[instrument(skip_all, fields(stage = stage.name(), records = inputs.len(), concurrency = concurrency))]
pub async fn run_stage<S: Stage>(
    stage: Arc<S>,
    inputs: Vec<S::Input>,
    concurrency: usize,
    progress: &dyn ProgressReporter,
) -> BatchReport<S::Output> {
    let started = Instant::now();
    let total = inputs.len();
    progress.phase(stage.name());

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(total);

    for input in inputs {
        let paper_id = input.paper_id().to_string();
        if input.status() == ProcessingStatus::Failed {
            handles.push((paper_id, None));
            continue;
        }

        let stage = Arc::clone(&stage);
        let sem = Arc::clone(&semaphore);
        let handle = tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            process_one(stage.as_ref(), &input).await
        });
        handles.push((paper_id, Some(handle)));
    }

    let mut items = Vec::with_capacity(total);
    for (index, (paper_id, handle)) in handles.into_iter().enumerate() {
        let outcome = match handle {
            None => ItemOutcome::Skipped,
            Some(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => ItemOutcome::Errored(format!("task failed: {e}")),
            },
        };

        match &outcome {
            ItemOutcome::Errored(message) => {
                error!(%paper_id, error = %message, "record failed");
            }
            ItemOutcome::Terminated { reason, .. } => {
                warn!(%paper_id, %reason, "record terminated");
            }
            ItemOutcome::Skipped => {
                info!(%paper_id, "skipping failed record");
            }
            ItemOutcome::Advanced(_) => {}
        }

        progress.item_done(&paper_id, outcome.label(), index + 1, total);
        items.push((paper_id, outcome));
    }

    let report = BatchReport::from_items(stage.name(), items);
    let s = &report.summary;
    info!(
        processed = s.processed,
        advanced = s.advanced,
        failed = s.failed,
        errored = s.errored,
        skipped = s.skipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stage finished"
    );
    progress.done(stage.name(), &report.summary);
    report
}
