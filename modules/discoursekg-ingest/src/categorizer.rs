//! Entity/topic/sentiment categorization. The LLM is forced into the
//! categorize schema via a tool call; the raw payload is kept so a parse or
//! validation failure lands in the journal's `failed_output` for post-mortem.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use discoursekg_common::{CategorizeArtifact, PipelineState, Stage, SummarizeArtifact};
use discoursekg_runtime::{PriorArtifacts, StageFailure, StageOutput, StageProcessor};

use crate::llm::Claude;

const SYSTEM_PROMPT: &str = "You analyze political and corporate communications. \
Extract every entity the speaker discusses (organizations, locations, people, \
programs, products, events). For each entity, group what was said by topic \
category; topics must be unique per entity. For each topic, give a 10-500 \
character context summary and break the discussion into specific subjects \
(2-3 word names), each with the speaker's clearly expressed sentiment and 1-6 \
verbatim supporting quotes from the text. Use canonical entity names. Do not \
invent sentiment: use 'unclear' when the speaker's feeling cannot be \
determined from the text.";

pub struct CategorizeProcessor {
    claude: Claude,
}

impl CategorizeProcessor {
    pub fn new(claude: Claude) -> Self {
        Self { claude }
    }
}

#[async_trait]
impl StageProcessor for CategorizeProcessor {
    fn stage(&self) -> Stage {
        Stage::Categorize
    }

    fn required_stages(&self) -> &'static [Stage] {
        &[Stage::Summarize]
    }

    async fn process(&self, state: &PipelineState, prior: &PriorArtifacts) -> Result<StageOutput> {
        let summarize: SummarizeArtifact = serde_json::from_value(
            prior
                .get(&Stage::Summarize)
                .cloned()
                .context("summarize artifact not provided")?,
        )
        .context("summarize artifact does not parse")?;

        if summarize.summary.trim().is_empty() {
            return Err(StageFailure::new("empty summary, nothing to categorize").into());
        }

        let payload = self
            .claude
            .extract_payload::<CategorizeArtifact>(SYSTEM_PROMPT, &summarize.summary)
            .await?;

        let artifact: CategorizeArtifact = match serde_json::from_value(payload.clone()) {
            Ok(artifact) => artifact,
            Err(e) => {
                return Err(StageFailure::with_output(
                    format!("categorization does not match schema: {e}"),
                    payload.to_string(),
                )
                .into());
            }
        };

        let artifact = artifact.normalized();
        if let Err(e) = artifact.validate() {
            return Err(StageFailure::with_output(e.to_string(), payload.to_string()).into());
        }

        info!(
            id = state.id.as_str(),
            entities = artifact.entities.len(),
            "categorized communication"
        );
        Ok(StageOutput::new(json!(artifact)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discoursekg_runtime::StageFailure;

    #[test]
    fn schema_violations_surface_raw_payload() {
        // The failure path the processor takes when the LLM returns a payload
        // that parses as JSON but not as the artifact.
        let payload = json!({"entities": [{"entity_name": "Acme"}]});
        let parse: std::result::Result<CategorizeArtifact, _> =
            serde_json::from_value(payload.clone());
        assert!(parse.is_err());

        let failure = StageFailure::with_output("bad schema", payload.to_string());
        assert_eq!(failure.failed_output.unwrap(), payload.to_string());
    }
}
