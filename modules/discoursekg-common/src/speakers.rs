//! Speaker registry: the out-of-band `speakers.json` keyed by speaker id.
//! The graph stage resolves Speaker nodes from it; discovery reads each
//! speaker's listing-page sources from it.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DiscourseKgError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Politics,
    Technology,
    Finance,
    Healthcare,
    Energy,
    Media,
    Academia,
}

impl std::fmt::Display for Industry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Industry::Politics => write!(f, "politics"),
            Industry::Technology => write!(f, "technology"),
            Industry::Finance => write!(f, "finance"),
            Industry::Healthcare => write!(f, "healthcare"),
            Industry::Energy => write!(f, "energy"),
            Industry::Media => write!(f, "media"),
            Industry::Academia => write!(f, "academia"),
        }
    }
}

/// Individual speaker profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub display_name: String,
    pub role: String,
    pub organization: String,
    pub industry: Industry,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub influence_score: Option<f64>,
    /// Listing-page URLs searched during discovery.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakerRegistry {
    pub speakers: HashMap<String, Speaker>,
}

impl SpeakerRegistry {
    pub fn load(path: &Path) -> Result<Self, DiscourseKgError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DiscourseKgError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            DiscourseKgError::Config(format!("invalid speaker registry {}: {e}", path.display()))
        })
    }

    pub fn get(&self, name_id: &str) -> Result<&Speaker, DiscourseKgError> {
        self.speakers
            .get(name_id)
            .ok_or_else(|| DiscourseKgError::SpeakerUnknown(name_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_parses_and_resolves() {
        let json = r#"{
            "speakers": {
                "jane_doe": {
                    "display_name": "Jane Doe",
                    "role": "Senator",
                    "organization": "US Senate",
                    "industry": "politics",
                    "region": "US",
                    "bio": "Senior senator.",
                    "sources": ["https://example.org/speeches"]
                }
            }
        }"#;
        let registry: SpeakerRegistry = serde_json::from_str(json).unwrap();
        let speaker = registry.get("jane_doe").unwrap();
        assert_eq!(speaker.display_name, "Jane Doe");
        assert_eq!(speaker.industry, Industry::Politics);
        assert!(speaker.date_of_birth.is_none());
        assert!(matches!(
            registry.get("john_roe"),
            Err(DiscourseKgError::SpeakerUnknown(_))
        ));
    }

    #[test]
    fn unknown_industry_rejected() {
        let json = r#"{
            "speakers": {
                "x": {
                    "display_name": "X",
                    "role": "r",
                    "organization": "o",
                    "industry": "sports",
                    "region": "US"
                }
            }
        }"#;
        assert!(serde_json::from_str::<SpeakerRegistry>(json).is_err());
    }
}
