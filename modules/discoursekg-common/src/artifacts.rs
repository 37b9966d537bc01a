//! Per-stage artifact schemas. Each stage persists exactly one of these as
//! its output file; the graph stage stitches several of them back together.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::ContentType;

/// Discover output: one file per discovered item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverArtifact {
    pub id: String,
    pub source_url: String,
    pub content_type: ContentType,
    pub title: String,
    pub content_date: NaiveDate,
    pub speaker: String,
}

/// Scrape output: the extracted transcript plus carried-forward metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeArtifact {
    pub full_text: String,
    pub word_count: u32,
    pub title: Option<String>,
    pub content_date: Option<NaiveDate>,
    pub content_type: ContentType,
    pub source_url: String,
}

/// Summarize output. When `was_summarized` is false the summary equals the
/// original full text and `compression_ratio` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeArtifact {
    pub summary: String,
    pub was_summarized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
    pub original_word_count: u32,
    pub summary_word_count: u32,
    pub target_word_count: u32,
    pub processing_time_seconds: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Graph output: a load report, not graph data (the graph store holds that).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphReportArtifact {
    pub nodes_created: u32,
    pub nodes_merged: u32,
    pub edges_created: u32,
    pub mention_count: u32,
    pub subject_count: u32,
    pub warnings: Vec<String>,
}
