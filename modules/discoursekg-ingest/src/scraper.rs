//! Transcript scraping: fetch the item's source page and extract the main
//! content with Readability. Scraping sits behind a trait so tests (and a
//! future rendering scraper) can swap the fetch layer.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::{info, warn};

use discoursekg_common::util::word_count;
use discoursekg_common::{DiscoverArtifact, PipelineState, ScrapeArtifact, Stage, StageMetadata};
use discoursekg_runtime::{PriorArtifacts, StageFailure, StageOutput, StageProcessor};

// --- PageScraper trait ---

#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<String>;
    fn name(&self) -> &str;
}

// --- HTTP + Readability scraper ---

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "discoursekg/0.1 (+transcript ingestion)";

pub struct HttpScraper {
    http: reqwest::Client,
}

impl HttpScraper {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .expect("reqwest client"),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url).context("Invalid URL")?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Only http/https URLs are allowed, got: {}", parsed.scheme());
        }

        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

impl Default for HttpScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageScraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<String> {
        info!(url, scraper = "http", "Scraping URL");
        let html = self.fetch(url).await?;
        if html.is_empty() {
            warn!(url, scraper = "http", "Empty response body");
            return Ok(String::new());
        }

        let parsed_url = url::Url::parse(url).ok();
        let config = TransformConfig {
            readability: true,
            main_content: true,
            return_format: ReturnFormat::Markdown,
            filter_images: true,
            filter_svg: true,
            clean_html: true,
        };
        let bytes = html.into_bytes();
        let input = TransformInput {
            url: parsed_url.as_ref(),
            content: &bytes,
            screenshot_bytes: None,
            encoding: None,
            selector_config: None,
            ignore_tags: None,
        };

        let text = transform_content_input(input, &config);
        if text.trim().is_empty() {
            warn!(url, scraper = "http", "Empty content after Readability extraction");
            return Ok(String::new());
        }

        info!(url, scraper = "http", bytes = text.len(), "Scraped successfully");
        Ok(text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// --- Scrape stage processor ---

pub struct ScrapeProcessor<S: PageScraper> {
    scraper: S,
}

impl<S: PageScraper> ScrapeProcessor<S> {
    pub fn new(scraper: S) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl<S: PageScraper> StageProcessor for ScrapeProcessor<S> {
    fn stage(&self) -> Stage {
        Stage::Scrape
    }

    fn required_stages(&self) -> &'static [Stage] {
        &[Stage::Discover]
    }

    async fn process(&self, state: &PipelineState, prior: &PriorArtifacts) -> Result<StageOutput> {
        let discovered: DiscoverArtifact = serde_json::from_value(
            prior
                .get(&Stage::Discover)
                .cloned()
                .context("discover artifact not provided")?,
        )
        .context("discover artifact does not parse")?;

        let full_text = self.scraper.scrape(&discovered.source_url).await?;
        if full_text.trim().is_empty() {
            return Err(StageFailure::new(format!(
                "no transcript content at {}",
                discovered.source_url
            ))
            .into());
        }

        let artifact = ScrapeArtifact {
            word_count: word_count(&full_text),
            full_text,
            title: Some(discovered.title.clone()),
            content_date: Some(discovered.content_date),
            content_type: discovered.content_type,
            source_url: discovered.source_url,
        };
        let metadata = StageMetadata {
            title: Some(discovered.title),
            content_date: Some(discovered.content_date),
            content_type: Some(discovered.content_type),
        };
        Ok(StageOutput::with_metadata(json!(artifact), metadata))
    }
}
