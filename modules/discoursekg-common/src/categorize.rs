//! Categorize-stage artifact: entities, topical mentions, and subject
//! sentiment, as extracted by the LLM. These types carry `JsonSchema` so the
//! extraction prompt can include a generated schema, and the doc comments on
//! fields double as guidance to the model.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::DiscourseKgError;

// --- Enums ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TopicCategory {
    Economics,
    Technology,
    ForeignAffairs,
    Healthcare,
    Energy,
    Defense,
    Social,
    Regulation,
    Other,
}

impl std::fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicCategory::Economics => write!(f, "economics"),
            TopicCategory::Technology => write!(f, "technology"),
            TopicCategory::ForeignAffairs => write!(f, "foreign_affairs"),
            TopicCategory::Healthcare => write!(f, "healthcare"),
            TopicCategory::Energy => write!(f, "energy"),
            TopicCategory::Defense => write!(f, "defense"),
            TopicCategory::Social => write!(f, "social"),
            TopicCategory::Regulation => write!(f, "regulation"),
            TopicCategory::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Organization,
    Location,
    Person,
    Program,
    Product,
    Event,
    Other,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Organization => write!(f, "organization"),
            EntityType::Location => write!(f, "location"),
            EntityType::Person => write!(f, "person"),
            EntityType::Program => write!(f, "program"),
            EntityType::Product => write!(f, "product"),
            EntityType::Event => write!(f, "event"),
            EntityType::Other => write!(f, "other"),
        }
    }
}

/// Speaker's expressed feeling toward a subject, only when clearly stated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLevel {
    Positive,
    Negative,
    Neutral,
    Unclear,
}

impl std::fmt::Display for SentimentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentLevel::Positive => write!(f, "positive"),
            SentimentLevel::Negative => write!(f, "negative"),
            SentimentLevel::Neutral => write!(f, "neutral"),
            SentimentLevel::Unclear => write!(f, "unclear"),
        }
    }
}

// --- Structs ---

/// A specific aspect of an entity discussed within one topic mention.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Subject {
    /// 2-3 word description of the specific subject discussed
    pub subject_name: String,
    pub sentiment: SentimentLevel,
    /// Verbatim quotes about this subject (1-6, most relevant first)
    pub quotes: Vec<String>,
}

/// One entity discussed under one topic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopicMention {
    /// Topic category where the entity was discussed
    pub topic: TopicCategory,
    /// Summary of how the entity was discussed in this topic (10-500 chars)
    pub context: String,
    pub subjects: Vec<Subject>,
}

/// An entity with all its topic mentions.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityMention {
    /// Canonical name for this entity (e.g. "Apple", "China", "Joe Biden")
    pub entity_name: String,
    pub entity_type: EntityType,
    pub mentions: Vec<TopicMention>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CategorizeArtifact {
    pub entities: Vec<EntityMention>,
}

pub const CONTEXT_MIN_CHARS: usize = 10;
pub const CONTEXT_MAX_CHARS: usize = 500;
pub const QUOTES_MAX: usize = 6;

impl CategorizeArtifact {
    /// Trim every string and drop quotes beyond the first six. Applied before
    /// validation so LLM whitespace noise doesn't fail an otherwise-good item.
    pub fn normalized(mut self) -> Self {
        for entity in &mut self.entities {
            entity.entity_name = entity.entity_name.trim().to_string();
            for mention in &mut entity.mentions {
                mention.context = mention.context.trim().to_string();
                for subject in &mut mention.subjects {
                    subject.subject_name = subject.subject_name.trim().to_string();
                    subject.quotes = subject
                        .quotes
                        .iter()
                        .map(|q| q.trim().to_string())
                        .filter(|q| !q.is_empty())
                        .take(QUOTES_MAX)
                        .collect();
                }
            }
        }
        self
    }

    /// Check the structural invariants the graph stage depends on. An empty
    /// entity list is valid: the communication simply mentioned nothing.
    pub fn validate(&self) -> Result<(), DiscourseKgError> {
        let mut seen_entities = HashSet::new();
        for entity in &self.entities {
            if entity.entity_name.is_empty() {
                return Err(DiscourseKgError::Validation("entity with empty name".into()));
            }
            if !seen_entities.insert(entity.entity_name.to_lowercase()) {
                return Err(DiscourseKgError::Validation(format!(
                    "duplicate entity '{}'",
                    entity.entity_name
                )));
            }
            if entity.mentions.is_empty() {
                return Err(DiscourseKgError::Validation(format!(
                    "entity '{}' has no mentions",
                    entity.entity_name
                )));
            }
            let mut seen_topics = HashSet::new();
            for mention in &entity.mentions {
                if !seen_topics.insert(mention.topic) {
                    return Err(DiscourseKgError::Validation(format!(
                        "duplicate topic '{}' for entity '{}'",
                        mention.topic, entity.entity_name
                    )));
                }
                let len = mention.context.chars().count();
                if !(CONTEXT_MIN_CHARS..=CONTEXT_MAX_CHARS).contains(&len) {
                    return Err(DiscourseKgError::Validation(format!(
                        "context for '{}'/{} must be {CONTEXT_MIN_CHARS}-{CONTEXT_MAX_CHARS} chars, got {len}",
                        entity.entity_name, mention.topic
                    )));
                }
                for subject in &mention.subjects {
                    let words = subject.subject_name.split_whitespace().count();
                    if !(2..=3).contains(&words) {
                        return Err(DiscourseKgError::Validation(format!(
                            "subject_name must be 2-3 words, got {words}: '{}'",
                            subject.subject_name
                        )));
                    }
                    if subject.quotes.is_empty() || subject.quotes.len() > QUOTES_MAX {
                        return Err(DiscourseKgError::Validation(format!(
                            "subject '{}' must carry 1-{QUOTES_MAX} quotes, got {}",
                            subject.subject_name,
                            subject.quotes.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
