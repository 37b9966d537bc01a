//! The scheduler: drives one stage across all ready items per invocation.
//!
//! Each item is owned end-to-end by one worker; up to `fanout` workers run
//! concurrently. Per-item failures are converted into journal failure updates
//! and never abort the invocation. Journal write failures do abort it: the
//! journal is infrastructure, and an item must not be marked failed when the
//! failing piece was the journal itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{error, info, warn};

use discoursekg_common::{DiscourseKgError, PipelineState, Stage, StageStatus};
use discoursekg_store::{ArtifactStore, StateJournal};

use crate::processor::{
    Discoverer, DiscoveryRequest, PriorArtifacts, StageFailure, StageOutput, StageProcessor,
};
use crate::report::{ItemOutcome, StageReport};

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Max items processed concurrently within one invocation.
    pub fanout: usize,
    /// Per-item attempt budget. A timed-out attempt is reported as failed
    /// with `error_message = "timeout"`.
    pub stage_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            fanout: 4,
            stage_timeout: Duration::from_secs(600),
        }
    }
}

pub struct PipelineRuntime {
    journal: Arc<StateJournal>,
    store: ArtifactStore,
    options: RuntimeOptions,
}

impl PipelineRuntime {
    pub fn new(journal: Arc<StateJournal>, store: ArtifactStore, options: RuntimeOptions) -> Self {
        Self {
            journal,
            store,
            options,
        }
    }

    pub fn journal(&self) -> &StateJournal {
        &self.journal
    }

    /// Run one stage across every ready item. Re-running after a successful
    /// batch is a no-op; failed items are picked up again next invocation.
    pub async fn run_stage(
        &self,
        processor: &dyn StageProcessor,
    ) -> Result<StageReport, DiscourseKgError> {
        let stage = processor.stage();
        let items = self.journal.items_ready_for(stage);
        info!(stage = %stage, items = items.len(), "running stage");

        let mut report = StageReport::new(stage);
        if items.is_empty() {
            return Ok(report);
        }

        let outcomes: Vec<ItemOutcome> = stream::iter(items)
            .map(|state| self.process_item(processor, state))
            .buffer_unordered(self.options.fanout.max(1))
            .try_collect()
            .await?;

        for outcome in outcomes {
            report.record(outcome);
        }
        info!(
            stage = %stage,
            succeeded = report.succeeded,
            failed = report.failed,
            "stage invocation finished"
        );
        Ok(report)
    }

    /// One item, end-to-end: load prior artifacts, invoke the processor under
    /// the stage timeout, persist the artifact, update the journal. Returns
    /// `Err` only for journal failures, which abort the invocation.
    async fn process_item(
        &self,
        processor: &dyn StageProcessor,
        state: PipelineState,
    ) -> Result<ItemOutcome, DiscourseKgError> {
        let stage = processor.stage();
        let started = Instant::now();
        let attempt = self.attempt(processor, &state).await;
        let elapsed = started.elapsed().as_secs_f64();

        match attempt {
            Ok(output) => self.commit_success(&state, stage, output, elapsed),
            Err(err) => {
                let (message, failed_output) = match err.downcast::<StageFailure>() {
                    Ok(failure) => (failure.message, failure.failed_output),
                    Err(other) => (format!("{other:#}"), None),
                };
                warn!(id = state.id.as_str(), stage = %stage, error = message.as_str(), "item failed");
                self.journal
                    .update_on_failure(&state.id, stage, &message, failed_output.as_deref(), elapsed)
                    .map_err(|e| {
                        error!(id = state.id.as_str(), error = %e, "journal update failed, aborting invocation");
                        e
                    })?;
                Ok(ItemOutcome {
                    id: state.id,
                    status: StageStatus::Failed,
                    error: Some(message),
                    duration_seconds: elapsed,
                })
            }
        }
    }

    fn commit_success(
        &self,
        state: &PipelineState,
        stage: Stage,
        output: StageOutput,
        elapsed: f64,
    ) -> Result<ItemOutcome, DiscourseKgError> {
        let content_type = output.metadata.content_type.unwrap_or(state.content_type);
        match self
            .store
            .save(&state.id, &state.speaker, stage, content_type, &output.artifact)
        {
            Ok(path) => {
                self.journal
                    .update_on_success(
                        &state.id,
                        stage,
                        &path.to_string_lossy(),
                        &output.metadata,
                        elapsed,
                    )
                    .map_err(|e| {
                        error!(id = state.id.as_str(), error = %e, "journal update failed, aborting invocation");
                        e
                    })?;
                Ok(ItemOutcome {
                    id: state.id.clone(),
                    status: StageStatus::Completed,
                    error: None,
                    duration_seconds: elapsed,
                })
            }
            // An artifact write failure fails the item, not the invocation.
            Err(err) => {
                let message = err.to_string();
                warn!(id = state.id.as_str(), stage = %stage, error = message.as_str(), "artifact save failed");
                self.journal
                    .update_on_failure(&state.id, stage, &message, None, elapsed)?;
                Ok(ItemOutcome {
                    id: state.id.clone(),
                    status: StageStatus::Failed,
                    error: Some(message),
                    duration_seconds: elapsed,
                })
            }
        }
    }

    async fn attempt(
        &self,
        processor: &dyn StageProcessor,
        state: &PipelineState,
    ) -> anyhow::Result<StageOutput> {
        let mut prior = PriorArtifacts::new();
        for &required in processor.required_stages() {
            let value = self
                .store
                .load_for(state, required)
                .map_err(anyhow::Error::from)?;
            prior.insert(required, value);
        }

        match tokio::time::timeout(self.options.stage_timeout, processor.process(state, &prior))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("timeout")),
        }
    }

    /// Discover is the only stage that creates state records. Candidates whose
    /// source url is already journaled are skipped with an info log.
    pub async fn run_discover(
        &self,
        request: &DiscoveryRequest,
        discoverer: &dyn Discoverer,
    ) -> Result<StageReport, DiscourseKgError> {
        info!(
            speaker = request.speaker.as_str(),
            from = %request.start_date,
            to = %request.end_date,
            "running discovery"
        );
        let started = Instant::now();
        let found = discoverer.discover(request).await?;
        let elapsed = started.elapsed().as_secs_f64();
        let per_item = elapsed / found.len().max(1) as f64;

        let mut report = StageReport::new(Stage::Discover);
        for item in found {
            if self.journal.find_by_source_url(&item.source_url).is_some() {
                info!(url = item.source_url.as_str(), "duplicate source_url, skipping");
                report.skipped_duplicates += 1;
                continue;
            }

            let path = match self.store.save(
                &item.id,
                &item.speaker,
                Stage::Discover,
                item.content_type,
                &item,
            ) {
                Ok(path) => path,
                Err(err) => {
                    report.record(ItemOutcome {
                        id: item.id,
                        status: StageStatus::Failed,
                        error: Some(err.to_string()),
                        duration_seconds: per_item,
                    });
                    continue;
                }
            };

            let state = PipelineState::discovered(
                item.id.clone(),
                item.speaker.clone(),
                item.source_url.clone(),
                item.content_type,
                Some(item.title.clone()),
                Some(item.content_date),
                path.to_string_lossy().into_owned(),
            );
            match self.journal.create(state) {
                Ok(()) => report.record(ItemOutcome {
                    id: item.id,
                    status: StageStatus::Completed,
                    error: None,
                    duration_seconds: per_item,
                }),
                Err(DiscourseKgError::DuplicateSourceUrl(url)) => {
                    info!(url = url.as_str(), "duplicate source_url, skipping");
                    report.skipped_duplicates += 1;
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            created = report.succeeded,
            skipped = report.skipped_duplicates,
            "discovery finished"
        );
        Ok(report)
    }
}
