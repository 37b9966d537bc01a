//! The uniform contract stage processors satisfy. Processors never touch the
//! journal or the artifact store; the runtime is the single agent of state
//! transitions, which keeps processors unit-testable in isolation.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use discoursekg_common::util::truncate_to_char_boundary;
use discoursekg_common::{DiscoverArtifact, PipelineState, Stage, StageMetadata};

/// Prior-stage artifacts keyed by the stage that produced them. The runtime
/// loads exactly the stages a processor declares in `required_stages`.
pub type PriorArtifacts = HashMap<Stage, serde_json::Value>;

/// What a stage attempt hands back on success: the artifact to persist plus
/// metadata for the journal to merge into the item's record.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub artifact: serde_json::Value,
    pub metadata: StageMetadata,
}

impl StageOutput {
    pub fn new(artifact: serde_json::Value) -> Self {
        Self {
            artifact,
            metadata: StageMetadata::default(),
        }
    }

    pub fn with_metadata(artifact: serde_json::Value, metadata: StageMetadata) -> Self {
        Self { artifact, metadata }
    }
}

/// Captured output kept alongside a failure for post-mortem debugging of
/// LLM-driven stages. Capped so a runaway response cannot bloat the journal.
const FAILED_OUTPUT_CAP_BYTES: usize = 64 * 1024;

/// A stage failure that carries optional raw output from the failed attempt.
/// Plain `anyhow` errors work too; this type exists for processors that have
/// something worth keeping (an unparseable LLM response, a bad artifact).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StageFailure {
    pub message: String,
    pub failed_output: Option<String>,
}

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            failed_output: None,
        }
    }

    pub fn with_output(message: impl Into<String>, output: impl AsRef<str>) -> Self {
        Self {
            message: message.into(),
            failed_output: Some(
                truncate_to_char_boundary(output.as_ref(), FAILED_OUTPUT_CAP_BYTES).to_string(),
            ),
        }
    }
}

#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// The stage this processor fulfills.
    fn stage(&self) -> Stage;

    /// Prior stages whose artifacts this processor needs handed in.
    fn required_stages(&self) -> &'static [Stage] {
        &[]
    }

    async fn process(
        &self,
        state: &PipelineState,
        prior: &PriorArtifacts,
    ) -> Result<StageOutput>;
}

// --- Discovery ---

/// Input for the discover stage, which takes a parameter object rather than
/// per-item state: it is the only stage that creates items.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub speaker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Find candidate communications for the request. The runtime handles
    /// journal insertion and source-url dedup.
    async fn discover(&self, request: &DiscoveryRequest) -> Result<Vec<DiscoverArtifact>>;
}
