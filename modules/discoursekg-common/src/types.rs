use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// --- Stage sequence ---

/// Pipeline stage. Serde values match artifact directory names and journal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Scrape,
    Summarize,
    Categorize,
    Graph,
}

impl Stage {
    /// The static processing order. Every item walks this sequence front to back.
    pub const SEQUENCE: [Stage; 5] = [
        Stage::Discover,
        Stage::Scrape,
        Stage::Summarize,
        Stage::Categorize,
        Stage::Graph,
    ];

    /// The stage after this one, or `None` when this is the last stage.
    pub fn next(self) -> Option<Stage> {
        let idx = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(idx + 1).copied()
    }

    /// All stages strictly before this one in the sequence.
    pub fn preceding(self) -> &'static [Stage] {
        let idx = Self::SEQUENCE
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::SEQUENCE.len());
        &Self::SEQUENCE[..idx]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Discover => write!(f, "discover"),
            Stage::Scrape => write!(f, "scrape"),
            Stage::Summarize => write!(f, "summarize"),
            Stage::Categorize => write!(f, "categorize"),
            Stage::Graph => write!(f, "graph"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discover" => Ok(Stage::Discover),
            "scrape" => Ok(Stage::Scrape),
            "summarize" => Ok(Stage::Summarize),
            "categorize" => Ok(Stage::Categorize),
            "graph" => Ok(Stage::Graph),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Status of a single stage attempt. Only `Invalidated` is reflected durably,
/// as a flag on the journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Invalidated,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "PENDING"),
            StageStatus::InProgress => write!(f, "IN_PROGRESS"),
            StageStatus::Completed => write!(f, "COMPLETED"),
            StageStatus::Failed => write!(f, "FAILED"),
            StageStatus::Invalidated => write!(f, "INVALIDATED"),
        }
    }
}

// --- Content type ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Speech,
    Interview,
    Debate,
    Other,
    /// Placeholder used for artifact pathing before discover assigns a type.
    #[default]
    Unknown,
}

impl ContentType {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "speech" => ContentType::Speech,
            "interview" => ContentType::Interview,
            "debate" => ContentType::Debate,
            "unknown" | "" => ContentType::Unknown,
            _ => ContentType::Other,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Speech => write!(f, "speech"),
            ContentType::Interview => write!(f, "interview"),
            ContentType::Debate => write!(f, "debate"),
            ContentType::Other => write!(f, "other"),
            ContentType::Unknown => write!(f, "unknown"),
        }
    }
}

// --- Pipeline state ---

/// Progress record for a single communication. One per item, the journal's
/// unit of storage. Mutated only through the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Stable item identifier, assigned at discover time.
    pub id: String,
    /// When the item first entered the system.
    pub run_timestamp: DateTime<Utc>,
    pub speaker: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub source_url: String,
    pub title: Option<String>,
    pub content_date: Option<NaiveDate>,
    pub latest_completed_stage: Option<Stage>,
    /// Stage this item is ready for; `None` when the item is complete.
    pub next_stage: Option<Stage>,
    /// Artifact path per completed stage. Grows monotonically.
    #[serde(default)]
    pub file_paths: BTreeMap<Stage, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Cumulative processing time across attempts, rounded to 2 decimals.
    pub processing_time_seconds: Option<f64>,
    /// Failed attempts since the last success on `next_stage`.
    #[serde(default)]
    pub retry_count: u32,
    pub error_message: Option<String>,
    /// Captured output from the last failure, size-capped by the journal.
    pub failed_output: Option<String>,
    /// Excluded from future runs when set. Records are never deleted.
    #[serde(default)]
    pub invalidated: bool,
}

impl PipelineState {
    /// Fresh record as discover creates it: discover completed, scrape next.
    pub fn discovered(
        id: String,
        speaker: String,
        source_url: String,
        content_type: ContentType,
        title: Option<String>,
        content_date: Option<NaiveDate>,
        discover_artifact_path: String,
    ) -> Self {
        let now = Utc::now();
        let mut file_paths = BTreeMap::new();
        file_paths.insert(Stage::Discover, discover_artifact_path);
        Self {
            id,
            run_timestamp: now,
            speaker,
            content_type,
            source_url,
            title,
            content_date,
            latest_completed_stage: Some(Stage::Discover),
            next_stage: Some(Stage::Scrape),
            file_paths,
            created_at: now,
            updated_at: now,
            processing_time_seconds: None,
            retry_count: 0,
            error_message: None,
            failed_output: None,
            invalidated: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.next_stage.is_none()
    }

    pub fn artifact_path(&self, stage: Stage) -> Option<&str> {
        self.file_paths.get(&stage).map(String::as_str)
    }
}

// --- Stage metadata ---

/// Metadata a stage hands back for the journal to merge into the item's
/// record. Empty values never overwrite non-empty ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageMetadata {
    pub title: Option<String>,
    pub content_date: Option<NaiveDate>,
    pub content_type: Option<ContentType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_sequence_walks_to_completion() {
        assert_eq!(Stage::Discover.next(), Some(Stage::Scrape));
        assert_eq!(Stage::Scrape.next(), Some(Stage::Summarize));
        assert_eq!(Stage::Summarize.next(), Some(Stage::Categorize));
        assert_eq!(Stage::Categorize.next(), Some(Stage::Graph));
        assert_eq!(Stage::Graph.next(), None);
    }

    #[test]
    fn preceding_stages_are_strict_prefix() {
        assert!(Stage::Discover.preceding().is_empty());
        assert_eq!(
            Stage::Categorize.preceding(),
            &[Stage::Discover, Stage::Scrape, Stage::Summarize]
        );
        assert_eq!(Stage::Graph.preceding().len(), 4);
    }

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Discover).unwrap(), "\"discover\"");
        let back: Stage = serde_json::from_str("\"graph\"").unwrap();
        assert_eq!(back, Stage::Graph);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        assert!(serde_json::from_str::<Stage>("\"preprocess\"").is_err());
        assert!("preprocess".parse::<Stage>().is_err());
    }

    #[test]
    fn pipeline_state_round_trips_with_stage_keyed_paths() {
        let state = PipelineState::discovered(
            "2025-03-01-remarks-on-trade-a1b2c3d4".into(),
            "jane_doe".into(),
            "https://example.org/remarks".into(),
            ContentType::Speech,
            Some("Remarks on Trade".into()),
            NaiveDate::from_ymd_opt(2025, 3, 1),
            "data/test/jane_doe/discover/speech/x.json".into(),
        );
        let line = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id, state.id);
        assert_eq!(back.next_stage, Some(Stage::Scrape));
        assert_eq!(
            back.artifact_path(Stage::Discover),
            Some("data/test/jane_doe/discover/speech/x.json")
        );
        assert!(!back.is_complete());
    }

    #[test]
    fn content_type_defaults_to_unknown() {
        assert_eq!(ContentType::default(), ContentType::Unknown);
        assert_eq!(ContentType::from_str_loose("town hall"), ContentType::Other);
        assert_eq!(ContentType::from_str_loose("Interview"), ContentType::Interview);
    }
}
