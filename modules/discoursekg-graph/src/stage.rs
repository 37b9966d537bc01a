//! The GRAPH stage processor: the only stage that reads more than one prior
//! artifact. Stitches scrape + summarize + categorize into a payload and
//! upserts it, returning the load report as its artifact.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use discoursekg_common::{
    CategorizeArtifact, PipelineState, ScrapeArtifact, SpeakerRegistry, Stage, SummarizeArtifact,
};
use discoursekg_runtime::{PriorArtifacts, StageOutput, StageProcessor};

use crate::builder::assemble;
use crate::writer::GraphWriter;

pub struct GraphStage {
    writer: GraphWriter,
    registry: SpeakerRegistry,
}

impl GraphStage {
    pub fn new(writer: GraphWriter, registry: SpeakerRegistry) -> Self {
        Self { writer, registry }
    }
}

#[async_trait]
impl StageProcessor for GraphStage {
    fn stage(&self) -> Stage {
        Stage::Graph
    }

    fn required_stages(&self) -> &'static [Stage] {
        &[Stage::Scrape, Stage::Summarize, Stage::Categorize]
    }

    async fn process(&self, state: &PipelineState, prior: &PriorArtifacts) -> Result<StageOutput> {
        let scrape: ScrapeArtifact = serde_json::from_value(
            prior
                .get(&Stage::Scrape)
                .cloned()
                .context("scrape artifact not provided")?,
        )
        .context("scrape artifact does not parse")?;
        let summarize: SummarizeArtifact = serde_json::from_value(
            prior
                .get(&Stage::Summarize)
                .cloned()
                .context("summarize artifact not provided")?,
        )
        .context("summarize artifact does not parse")?;
        let categorize: CategorizeArtifact = serde_json::from_value(
            prior
                .get(&Stage::Categorize)
                .cloned()
                .context("categorize artifact not provided")?,
        )
        .context("categorize artifact does not parse")?;

        let payload = assemble(state, &scrape, &summarize, &categorize, &self.registry)?;

        self.writer.ensure_constraints().await;
        let report = self.writer.upsert_payload(&payload).await?;

        Ok(StageOutput::new(json!(report)))
    }
}
