//! Extractive summarization. Transcripts under the target length pass
//! through untouched; longer ones are condensed by the LLM using verbatim
//! sentence selection so downstream quotes stay quotable.

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use discoursekg_common::util::word_count;
use discoursekg_common::{PipelineState, ScrapeArtifact, Stage, SummarizeArtifact};
use discoursekg_runtime::{PriorArtifacts, StageFailure, StageOutput, StageProcessor};

use crate::llm::Claude;

pub struct SummarizeProcessor {
    claude: Claude,
    target_words: u32,
}

impl SummarizeProcessor {
    pub fn new(claude: Claude, target_words: u32) -> Self {
        Self {
            claude,
            target_words,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You produce extractive summaries of political communications. \
             Select the most substantive sentences VERBATIM from the input \
             transcript, preserving original wording and order, until the \
             summary is roughly {} words. Keep every sentence that names a \
             company, country, person, program, or product. Return only the \
             summary text.",
            self.target_words
        )
    }
}

#[async_trait]
impl StageProcessor for SummarizeProcessor {
    fn stage(&self) -> Stage {
        Stage::Summarize
    }

    fn required_stages(&self) -> &'static [Stage] {
        &[Stage::Scrape]
    }

    async fn process(&self, state: &PipelineState, prior: &PriorArtifacts) -> Result<StageOutput> {
        let scrape: ScrapeArtifact = serde_json::from_value(
            prior
                .get(&Stage::Scrape)
                .cloned()
                .context("scrape artifact not provided")?,
        )
        .context("scrape artifact does not parse")?;

        if scrape.full_text.trim().is_empty() {
            return Err(StageFailure::new("empty transcript, nothing to summarize").into());
        }

        let started = Instant::now();
        let original_word_count = scrape.word_count;

        let artifact = if original_word_count <= self.target_words {
            info!(
                id = state.id.as_str(),
                words = original_word_count,
                "transcript under target, passing through"
            );
            SummarizeArtifact {
                summary: scrape.full_text.clone(),
                was_summarized: false,
                compression_ratio: None,
                original_word_count,
                summary_word_count: original_word_count,
                target_word_count: self.target_words,
                processing_time_seconds: started.elapsed().as_secs_f64(),
                success: true,
                error_message: None,
            }
        } else {
            let summary = self
                .claude
                .complete(self.system_prompt(), &scrape.full_text)
                .await?;
            let summary = summary.trim().to_string();
            if summary.is_empty() {
                return Err(StageFailure::new("summarizer returned empty output").into());
            }
            let summary_word_count = word_count(&summary);
            let ratio = summary_word_count as f64 / original_word_count as f64;
            info!(
                id = state.id.as_str(),
                original = original_word_count,
                summary = summary_word_count,
                "summarized transcript"
            );
            SummarizeArtifact {
                summary,
                was_summarized: true,
                compression_ratio: Some((ratio * 1000.0).round() / 1000.0),
                original_word_count,
                summary_word_count,
                target_word_count: self.target_words,
                processing_time_seconds: started.elapsed().as_secs_f64(),
                success: true,
                error_message: None,
            }
        };

        Ok(StageOutput::new(json!(artifact)))
    }
}
