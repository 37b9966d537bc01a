//! The state journal: durable, queryable store of every item's
//! `PipelineState`, and the sole authority on pipeline progress.
//!
//! Storage is line-delimited JSON, one record per line. Creates append a
//! single line; updates rewrite the whole file under a temporary name and
//! rename it into place, so a crash never leaves a half-written journal.
//! A `RwLock` around the in-memory index serializes the single writer
//! against concurrent readers.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;

use discoursekg_common::util::truncate_to_char_boundary;
use discoursekg_common::{DiscourseKgError, PipelineState, Stage, StageMetadata};

/// Size cap for captured failure output stored in the journal.
const FAILED_OUTPUT_MAX_BYTES: usize = 64 * 1024;

pub struct StateJournal {
    path: PathBuf,
    index: RwLock<HashMap<String, PipelineState>>,
}

impl StateJournal {
    /// Open the journal at `path`, building the in-memory index from the
    /// full file. A missing file is an empty journal.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DiscourseKgError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DiscourseKgError::Journal(format!("create {}: {e}", parent.display())))?;
        }
        let mut index = HashMap::new();
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| DiscourseKgError::Journal(format!("read {}: {e}", path.display())))?;
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let state: PipelineState = serde_json::from_str(line).map_err(|e| {
                    DiscourseKgError::Journal(format!(
                        "corrupt journal {} line {}: {e}",
                        path.display(),
                        line_no + 1
                    ))
                })?;
                index.insert(state.id.clone(), state);
            }
        }
        Ok(Self {
            path,
            index: RwLock::new(index),
        })
    }

    /// Append a new record. Fails if the id exists or the source url is
    /// already claimed by a non-invalidated record.
    pub fn create(&self, state: PipelineState) -> Result<(), DiscourseKgError> {
        let mut index = self.index.write().expect("journal lock poisoned");
        if index.contains_key(&state.id) {
            return Err(DiscourseKgError::Journal(format!(
                "record already exists: {}",
                state.id
            )));
        }
        if index
            .values()
            .any(|s| !s.invalidated && s.source_url == state.source_url)
        {
            return Err(DiscourseKgError::DuplicateSourceUrl(state.source_url));
        }

        let line = serde_json::to_string(&state)
            .map_err(|e| DiscourseKgError::Journal(format!("serialize {}: {e}", state.id)))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DiscourseKgError::Journal(format!("open {}: {e}", self.path.display())))?;
        writeln!(file, "{line}")
            .map_err(|e| DiscourseKgError::Journal(format!("append {}: {e}", self.path.display())))?;

        tracing::debug!(id = state.id.as_str(), "created pipeline state");
        index.insert(state.id.clone(), state);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<PipelineState> {
        self.index
            .read()
            .expect("journal lock poisoned")
            .get(id)
            .cloned()
    }

    /// Every non-invalidated record with `next_stage = stage`, ordered by
    /// `created_at` then id for determinism.
    pub fn items_ready_for(&self, stage: Stage) -> Vec<PipelineState> {
        let index = self.index.read().expect("journal lock poisoned");
        let mut items: Vec<PipelineState> = index
            .values()
            .filter(|s| !s.invalidated && s.next_stage == Some(stage))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    /// Dedup check: the non-invalidated record holding this source url.
    pub fn find_by_source_url(&self, url: &str) -> Option<PipelineState> {
        self.index
            .read()
            .expect("journal lock poisoned")
            .values()
            .find(|s| !s.invalidated && s.source_url == url)
            .cloned()
    }

    /// Record a completed stage attempt: advance the stage cursor, record the
    /// artifact path, merge metadata, clear failure fields.
    pub fn update_on_success(
        &self,
        id: &str,
        stage: Stage,
        artifact_path: &str,
        metadata: &StageMetadata,
        elapsed_seconds: f64,
    ) -> Result<PipelineState, DiscourseKgError> {
        let mut index = self.index.write().expect("journal lock poisoned");
        let state = index
            .get_mut(id)
            .ok_or_else(|| DiscourseKgError::Journal(format!("record not found: {id}")))?;
        if state.next_stage != Some(stage) {
            tracing::warn!(
                id,
                stage = %stage,
                next_stage = ?state.next_stage,
                "success update for a stage the item was not waiting on"
            );
        }

        state.latest_completed_stage = Some(stage);
        state.next_stage = stage.next();
        state.file_paths.insert(stage, artifact_path.to_string());
        merge_metadata(state, metadata);
        state.error_message = None;
        state.failed_output = None;
        state.retry_count = 0;
        add_processing_time(state, elapsed_seconds);
        state.updated_at = Utc::now();

        let updated = state.clone();
        Self::rewrite(&self.path, &index)?;
        tracing::debug!(id, stage = %stage, "completed stage");
        Ok(updated)
    }

    /// Record a failed stage attempt: `next_stage` stays put for retry.
    pub fn update_on_failure(
        &self,
        id: &str,
        stage: Stage,
        error: &str,
        failed_output: Option<&str>,
        elapsed_seconds: f64,
    ) -> Result<PipelineState, DiscourseKgError> {
        let mut index = self.index.write().expect("journal lock poisoned");
        let state = index
            .get_mut(id)
            .ok_or_else(|| DiscourseKgError::Journal(format!("record not found: {id}")))?;

        state.error_message = Some(error.to_string());
        state.failed_output =
            failed_output.map(|o| truncate_to_char_boundary(o, FAILED_OUTPUT_MAX_BYTES).to_string());
        state.retry_count += 1;
        add_processing_time(state, elapsed_seconds);
        state.updated_at = Utc::now();

        let updated = state.clone();
        Self::rewrite(&self.path, &index)?;
        tracing::error!(id, stage = %stage, error, "stage failed");
        Ok(updated)
    }

    /// Mark a record for exclusion from future runs without deleting it.
    /// Its source url becomes available to discovery again.
    pub fn invalidate(&self, id: &str) -> Result<PipelineState, DiscourseKgError> {
        let mut index = self.index.write().expect("journal lock poisoned");
        let state = index
            .get_mut(id)
            .ok_or_else(|| DiscourseKgError::Journal(format!("record not found: {id}")))?;
        state.invalidated = true;
        state.updated_at = Utc::now();
        let updated = state.clone();
        Self::rewrite(&self.path, &index)?;
        tracing::info!(id, "invalidated pipeline state");
        Ok(updated)
    }

    /// Every record, ordered by `created_at` then id.
    pub fn all(&self) -> Vec<PipelineState> {
        let index = self.index.read().expect("journal lock poisoned");
        let mut items: Vec<PipelineState> = index.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    /// Records with a failure recorded (`error_message` set).
    pub fn failed(&self) -> Vec<PipelineState> {
        self.all()
            .into_iter()
            .filter(|s| s.error_message.is_some())
            .collect()
    }

    /// Rewrite the whole journal to a temp file, then rename into place.
    fn rewrite(
        path: &Path,
        index: &HashMap<String, PipelineState>,
    ) -> Result<(), DiscourseKgError> {
        let mut records: Vec<&PipelineState> = index.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut buf = String::new();
        for state in records {
            let line = serde_json::to_string(state)
                .map_err(|e| DiscourseKgError::Journal(format!("serialize {}: {e}", state.id)))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        fs::write(&tmp, buf)
            .map_err(|e| DiscourseKgError::Journal(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path).map_err(|e| {
            DiscourseKgError::Journal(format!("rename {} -> {}: {e}", tmp.display(), path.display()))
        })?;
        Ok(())
    }
}

/// Merge stage metadata into the record. Non-empty existing values are never
/// overwritten with empty ones.
fn merge_metadata(state: &mut PipelineState, metadata: &StageMetadata) {
    if let Some(title) = &metadata.title {
        if !title.trim().is_empty() {
            state.title = Some(title.clone());
        }
    }
    if let Some(date) = metadata.content_date {
        state.content_date = Some(date);
    }
    if let Some(content_type) = metadata.content_type {
        if content_type != discoursekg_common::ContentType::Unknown {
            state.content_type = content_type;
        }
    }
}

fn add_processing_time(state: &mut PipelineState, elapsed_seconds: f64) {
    let total = state.processing_time_seconds.unwrap_or(0.0) + elapsed_seconds;
    state.processing_time_seconds = Some((total * 100.0).round() / 100.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use discoursekg_common::ContentType;
    use tempfile::TempDir;

    fn journal() -> (TempDir, StateJournal) {
        let dir = TempDir::new().unwrap();
        let journal = StateJournal::open(dir.path().join("state/pipeline_state_test.jsonl")).unwrap();
        (dir, journal)
    }

    fn state(id: &str, url: &str) -> PipelineState {
        PipelineState::discovered(
            id.to_string(),
            "jane_doe".to_string(),
            url.to_string(),
            ContentType::Speech,
            Some("Remarks".to_string()),
            None,
            format!("data/test/jane_doe/discover/speech/{id}.json"),
        )
    }

    #[test]
    fn create_and_get() {
        let (_dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        let got = journal.get("a").unwrap();
        assert_eq!(got.next_stage, Some(Stage::Scrape));
        assert_eq!(got.latest_completed_stage, Some(Stage::Discover));
        assert!(journal.get("missing").is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let (_dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        assert!(matches!(
            journal.create(state("a", "https://example.org/other")),
            Err(DiscourseKgError::Journal(_))
        ));
    }

    #[test]
    fn duplicate_source_url_rejected_until_invalidated() {
        let (_dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        assert!(matches!(
            journal.create(state("b", "https://example.org/a")),
            Err(DiscourseKgError::DuplicateSourceUrl(_))
        ));
        assert!(journal.find_by_source_url("https://example.org/a").is_some());

        journal.invalidate("a").unwrap();
        assert!(journal.find_by_source_url("https://example.org/a").is_none());
        journal.create(state("b", "https://example.org/a")).unwrap();
    }

    #[test]
    fn ready_items_ordered_and_filtered() {
        let (_dir, journal) = journal();
        for (id, url) in [("c", "u3"), ("a", "u1"), ("b", "u2")] {
            let mut s = state(id, url);
            s.created_at = chrono::Utc::now();
            journal.create(s).unwrap();
        }
        journal.invalidate("b").unwrap();

        let ready = journal.items_ready_for(Stage::Scrape);
        let ids: Vec<&str> = ready.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!(journal.items_ready_for(Stage::Graph).is_empty());
    }

    #[test]
    fn success_advances_and_clears_failure_state() {
        let (_dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        journal
            .update_on_failure("a", Stage::Scrape, "boom", Some("raw output"), 1.0)
            .unwrap();

        let failed = journal.get("a").unwrap();
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert_eq!(failed.failed_output.as_deref(), Some("raw output"));
        assert_eq!(failed.next_stage, Some(Stage::Scrape));

        let metadata = StageMetadata {
            title: Some("Full Remarks on Trade".to_string()),
            content_date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1),
            content_type: Some(ContentType::Speech),
        };
        let updated = journal
            .update_on_success("a", Stage::Scrape, "path/scrape.json", &metadata, 2.5)
            .unwrap();
        assert_eq!(updated.latest_completed_stage, Some(Stage::Scrape));
        assert_eq!(updated.next_stage, Some(Stage::Summarize));
        assert_eq!(updated.retry_count, 0);
        assert!(updated.error_message.is_none());
        assert!(updated.failed_output.is_none());
        assert_eq!(updated.artifact_path(Stage::Scrape), Some("path/scrape.json"));
        assert_eq!(updated.title.as_deref(), Some("Full Remarks on Trade"));
        assert_eq!(updated.processing_time_seconds, Some(3.5));
    }

    #[test]
    fn empty_metadata_never_clobbers() {
        let (_dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        let metadata = StageMetadata {
            title: Some("   ".to_string()),
            content_date: None,
            content_type: Some(ContentType::Unknown),
        };
        let updated = journal
            .update_on_success("a", Stage::Scrape, "p", &metadata, 0.0)
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("Remarks"));
        assert_eq!(updated.content_type, ContentType::Speech);
    }

    #[test]
    fn failed_output_is_size_capped() {
        let (_dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        let huge = "x".repeat(100 * 1024);
        let updated = journal
            .update_on_failure("a", Stage::Scrape, "boom", Some(&huge), 0.0)
            .unwrap();
        assert_eq!(updated.failed_output.unwrap().len(), FAILED_OUTPUT_MAX_BYTES);
    }

    #[test]
    fn file_paths_track_exactly_completed_stages() {
        let (_dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        let meta = StageMetadata::default();
        journal.update_on_success("a", Stage::Scrape, "p1", &meta, 0.0).unwrap();
        journal.update_on_success("a", Stage::Summarize, "p2", &meta, 0.0).unwrap();

        let s = journal.get("a").unwrap();
        let next = s.next_stage.unwrap();
        for stage in Stage::SEQUENCE {
            if next.preceding().contains(&stage) {
                assert!(s.artifact_path(stage).is_some(), "missing path for {stage}");
            } else {
                assert!(s.artifact_path(stage).is_none(), "unexpected path for {stage}");
            }
        }
    }

    #[test]
    fn completed_item_has_every_path_and_no_next_stage() {
        let (_dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        let meta = StageMetadata::default();
        for stage in [Stage::Scrape, Stage::Summarize, Stage::Categorize, Stage::Graph] {
            journal
                .update_on_success("a", stage, &format!("p/{stage}.json"), &meta, 0.0)
                .unwrap();
        }
        let s = journal.get("a").unwrap();
        assert!(s.is_complete());
        assert_eq!(s.file_paths.len(), Stage::SEQUENCE.len());
        assert!(journal.items_ready_for(Stage::Graph).is_empty());
    }

    #[test]
    fn reload_reconstructs_identical_records() {
        let (dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        journal.create(state("b", "https://example.org/b")).unwrap();
        journal
            .update_on_failure("b", Stage::Scrape, "boom", None, 0.4)
            .unwrap();
        let before = journal.all();
        drop(journal);

        let reopened =
            StateJournal::open(dir.path().join("state/pipeline_state_test.jsonl")).unwrap();
        let after = reopened.all();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(
                serde_json::to_value(a).unwrap(),
                serde_json::to_value(b).unwrap()
            );
        }
    }

    #[test]
    fn journal_file_ends_with_newline() {
        let (dir, journal) = journal();
        journal.create(state("a", "https://example.org/a")).unwrap();
        journal
            .update_on_success("a", Stage::Scrape, "p", &StageMetadata::default(), 0.0)
            .unwrap();
        let content =
            std::fs::read_to_string(dir.path().join("state/pipeline_state_test.jsonl")).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 1);
    }
}
