//! Source discovery: walk a speaker's listing pages, ask the LLM for dated
//! candidate communications, filter to the requested range, and mint stable
//! item ids. The runtime owns journal insertion and source-url dedup.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use discoursekg_common::util::{short_hash, slugify, truncate_to_char_boundary};
use discoursekg_common::{ContentType, DiscoverArtifact, SpeakerRegistry};
use discoursekg_runtime::{Discoverer, DiscoveryRequest};

use crate::llm::Claude;
use crate::scraper::PageScraper;

/// Listing pages can be huge; keep the prompt bounded.
const MAX_PAGE_CHARS: usize = 60_000;
const SLUG_MAX_LEN: usize = 40;

/// What the LLM returns for each candidate found on a listing page.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct ListedCandidate {
    /// Title of the communication as listed
    title: String,
    /// Absolute URL of the full transcript page
    url: String,
    /// Publication date, YYYY-MM-DD
    publication_date: String,
    /// "speech", "interview", "debate", or "other"
    content_type: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
struct ListingExtraction {
    items: Vec<ListedCandidate>,
}

pub struct SourceDiscoverer<S: PageScraper> {
    claude: Claude,
    scraper: S,
    registry: SpeakerRegistry,
}

impl<S: PageScraper> SourceDiscoverer<S> {
    pub fn new(claude: Claude, scraper: S, registry: SpeakerRegistry) -> Self {
        Self {
            claude,
            scraper,
            registry,
        }
    }

    fn system_prompt(display_name: &str, request: &DiscoveryRequest) -> String {
        format!(
            "You are indexing public communications by {display_name}. \
             The input is a listing page in markdown. Extract every linked \
             communication (speech, interview, or debate transcript) delivered \
             by {display_name} and published between {} and {} inclusive. \
             Only include items with an explicit date and an absolute URL. \
             Skip op-eds, press releases, and items by other people.",
            request.start_date, request.end_date
        )
    }
}

#[async_trait]
impl<S: PageScraper> Discoverer for SourceDiscoverer<S> {
    async fn discover(&self, request: &DiscoveryRequest) -> Result<Vec<DiscoverArtifact>> {
        let speaker = self.registry.get(&request.speaker)?;
        if speaker.sources.is_empty() {
            warn!(speaker = request.speaker.as_str(), "speaker has no discovery sources");
            return Ok(Vec::new());
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, speaker = request.speaker.as_str(), sources = speaker.sources.len(), "discovery run");

        let mut seen_urls = std::collections::HashSet::new();
        let mut found = Vec::new();
        for source in &speaker.sources {
            let page = match self.scraper.scrape(source).await {
                Ok(page) if !page.trim().is_empty() => page,
                Ok(_) => {
                    warn!(source = source.as_str(), "listing page was empty");
                    continue;
                }
                Err(e) => {
                    warn!(source = source.as_str(), error = %e, "listing page fetch failed");
                    continue;
                }
            };

            let prompt = truncate_to_char_boundary(&page, MAX_PAGE_CHARS);
            let extraction = match self
                .claude
                .extract::<ListingExtraction>(
                    Self::system_prompt(&speaker.display_name, request),
                    prompt,
                )
                .await
            {
                Ok(extraction) => extraction,
                Err(e) => {
                    warn!(source = source.as_str(), error = %e, "listing extraction failed");
                    continue;
                }
            };

            for candidate in extraction.items {
                if let Some(artifact) = resolve_candidate(&candidate, &request.speaker, request) {
                    if seen_urls.insert(artifact.source_url.clone()) {
                        found.push(artifact);
                    }
                }
            }
        }

        info!(%run_id, found = found.len(), "discovery extraction complete");
        Ok(found)
    }
}

/// Validate one LLM candidate against the request and mint its item id.
/// Returns `None` for undated, out-of-range, or unusable candidates.
fn resolve_candidate(
    candidate: &ListedCandidate,
    speaker: &str,
    request: &DiscoveryRequest,
) -> Option<DiscoverArtifact> {
    let title = candidate.title.trim();
    let url = candidate.url.trim();
    if title.is_empty() || !url.starts_with("http") {
        return None;
    }
    let date = NaiveDate::parse_from_str(candidate.publication_date.trim(), "%Y-%m-%d").ok()?;
    if date < request.start_date || date > request.end_date {
        return None;
    }
    Some(DiscoverArtifact {
        id: build_item_id(date, title, url),
        source_url: url.to_string(),
        content_type: ContentType::from_str_loose(&candidate.content_type),
        title: title.to_string(),
        content_date: date,
        speaker: speaker.to_string(),
    })
}

/// Stable item id: `YYYY-MM-DD-<title-slug>-<hash8-of-url>`. The hash keeps
/// ids unique when a speaker reuses a title.
pub fn build_item_id(date: NaiveDate, title: &str, url: &str) -> String {
    format!("{date}-{}-{}", slugify(title, SLUG_MAX_LEN), short_hash(url))
}
