use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscourseKgError {
    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Artifact missing: {0}")]
    ArtifactMissing(String),

    #[error("Artifact corrupt: {0}")]
    ArtifactCorrupt(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate source url: {0}")]
    DuplicateSourceUrl(String),

    #[error("Unknown speaker: {0}")]
    SpeakerUnknown(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
