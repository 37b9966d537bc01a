//! File-backed artifact store. Pure I/O: maps `(environment, speaker, stage,
//! content_type, id)` to a JSON file and never touches the journal — the
//! caller is responsible for recording the returned path there.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use discoursekg_common::{ContentType, DiscourseKgError, PipelineState, Stage};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    data_root: PathBuf,
    environment: String,
}

impl ArtifactStore {
    pub fn new(data_root: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            data_root: data_root.into(),
            environment: environment.into(),
        }
    }

    /// Deterministic artifact path:
    /// `{data_root}/{environment}/{speaker}/{stage}/{content_type}/{id}.json`.
    pub fn path_for(
        &self,
        speaker: &str,
        stage: Stage,
        content_type: ContentType,
        id: &str,
    ) -> PathBuf {
        self.data_root
            .join(&self.environment)
            .join(speaker)
            .join(stage.to_string())
            .join(content_type.to_string())
            .join(format!("{id}.json"))
    }

    /// Serialize `payload` to the artifact path, creating directories on
    /// demand. Overwrite is permitted: re-runs are idempotent.
    pub fn save<T: Serialize>(
        &self,
        id: &str,
        speaker: &str,
        stage: Stage,
        content_type: ContentType,
        payload: &T,
    ) -> Result<PathBuf, DiscourseKgError> {
        let path = self.path_for(speaker, stage, content_type, id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DiscourseKgError::Storage(format!("create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(payload)
            .map_err(|e| DiscourseKgError::Storage(format!("serialize artifact {id}: {e}")))?;
        fs::write(&path, json)
            .map_err(|e| DiscourseKgError::Storage(format!("write {}: {e}", path.display())))?;
        tracing::debug!(id, stage = %stage, path = %path.display(), "saved artifact");
        Ok(path)
    }

    /// Load and parse an artifact file.
    pub fn load(&self, path: &Path) -> Result<serde_json::Value, DiscourseKgError> {
        let content = fs::read_to_string(path)
            .map_err(|e| DiscourseKgError::ArtifactMissing(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| DiscourseKgError::ArtifactCorrupt(format!("{}: {e}", path.display())))
    }

    /// Resolve a stage's artifact through the item's recorded `file_paths`.
    pub fn load_for(
        &self,
        state: &PipelineState,
        stage: Stage,
    ) -> Result<serde_json::Value, DiscourseKgError> {
        let path = state.artifact_path(stage).ok_or_else(|| {
            DiscourseKgError::ArtifactMissing(format!(
                "no recorded {stage} artifact for item {}",
                state.id
            ))
        })?;
        self.load(Path::new(path))
    }

    pub fn load_typed<T: DeserializeOwned>(&self, path: &Path) -> Result<T, DiscourseKgError> {
        let value = self.load(path)?;
        serde_json::from_value(value)
            .map_err(|e| DiscourseKgError::ArtifactCorrupt(format!("{}: {e}", path.display())))
    }
}
