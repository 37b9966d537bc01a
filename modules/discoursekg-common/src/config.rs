use std::env;
use std::path::PathBuf;

use crate::error::DiscourseKgError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace isolating journals and artifacts ({test, prod, ...}).
    pub environment: String,
    pub data_root: PathBuf,

    // Graph store (bolt protocol via neo4rs driver)
    pub graph_url: String,
    pub graph_user: String,
    pub graph_password: String,

    // LLM-backed processors
    pub llm_api_key: String,
    pub llm_model: String,

    // Runtime tuning
    pub fanout: usize,
    pub stage_timeout_secs: u64,
    pub summary_target_words: u32,
}

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

impl Config {
    /// Journal-and-artifacts-only config (status, invalidate, scrape).
    pub fn from_env() -> Result<Self, DiscourseKgError> {
        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "test".to_string()),
            data_root: PathBuf::from(env::var("DATA_ROOT").unwrap_or_else(|_| "data".to_string())),
            graph_url: env::var("GRAPH_URL").unwrap_or_default(),
            graph_user: env::var("GRAPH_USER").unwrap_or_default(),
            graph_password: env::var("GRAPH_PASSWORD").unwrap_or_default(),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            fanout: parsed_env("FANOUT", 4),
            stage_timeout_secs: parsed_env("STAGE_TIMEOUT_SECS", 600),
            summary_target_words: parsed_env("SUMMARY_TARGET_WORDS", 1000),
        })
    }

    /// Config for stages that call the LLM (discover, summarize, categorize).
    pub fn ingest_from_env() -> Result<Self, DiscourseKgError> {
        let mut config = Self::from_env()?;
        config.llm_api_key = required_env("LLM_API_KEY")?;
        Ok(config)
    }

    /// Config for the graph stage (requires graph store credentials).
    pub fn graph_from_env() -> Result<Self, DiscourseKgError> {
        let mut config = Self::from_env()?;
        config.graph_url = required_env("GRAPH_URL")?;
        config.graph_user = required_env("GRAPH_USER")?;
        config.graph_password = required_env("GRAPH_PASSWORD")?;
        Ok(config)
    }

    pub fn pipeline_state_file(&self) -> PathBuf {
        self.data_root
            .join("state")
            .join(format!("pipeline_state_{}.jsonl", self.environment))
    }

    pub fn speakers_file(&self) -> PathBuf {
        self.data_root.join(&self.environment).join("speakers.json")
    }

    /// Log the presence of each sensitive env var without leaking values.
    pub fn log_redacted(&self) {
        let vars = [
            ("GRAPH_URL", &self.graph_url),
            ("GRAPH_USER", &self.graph_user),
            ("GRAPH_PASSWORD", &self.graph_password),
            ("LLM_API_KEY", &self.llm_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> Result<String, DiscourseKgError> {
    env::var(key).map_err(|_| {
        DiscourseKgError::Config(format!("{key} environment variable is required"))
    })
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
