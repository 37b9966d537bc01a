//! Graph assembly: stitch a fully-processed item's artifacts into a
//! validated node-and-edge payload. Pure functions of the inputs, so the
//! whole graph stage is idempotent across re-runs.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use discoursekg_common::{
    CategorizeArtifact, ContentType, DiscourseKgError, EntityType, Industry, PipelineState,
    ScrapeArtifact, SentimentLevel, SpeakerRegistry, Subject, SummarizeArtifact, TopicCategory,
    QUOTES_MAX,
};

const SENTIMENT_PROP_DECIMALS: f64 = 1000.0;

/// Natural-key normalization: trimmed, NFC, case-folded.
pub fn canonical_key(s: &str) -> String {
    s.trim().nfc().collect::<String>().to_lowercase()
}

// --- Payload types ---

#[derive(Debug, Clone, Serialize)]
pub struct SpeakerNodeData {
    pub name_id: String,
    pub display_name: String,
    pub role: String,
    pub organization: String,
    pub industry: Industry,
    pub region: String,
    pub date_of_birth: Option<NaiveDate>,
    pub bio: Option<String>,
    pub influence_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommunicationData {
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    pub content_date: Option<NaiveDate>,
    pub source_url: String,
    pub full_text: String,
    pub word_count: u32,
    pub was_summarized: bool,
    pub compression_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentShare {
    pub count: u32,
    pub prop: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectData {
    /// Normalized key component; `name` keeps the original trimmed form.
    pub key: String,
    pub name: String,
    pub sentiment: SentimentLevel,
    pub quotes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MentionData {
    pub topic: TopicCategory,
    pub context: String,
    pub aggregated_sentiment: BTreeMap<SentimentLevel, SentimentShare>,
    pub subjects: Vec<SubjectData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityData {
    pub canonical_name: String,
    pub display_name: String,
    pub entity_type: EntityType,
    pub mentions: Vec<MentionData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphPayload {
    pub speaker: SpeakerNodeData,
    pub communication: CommunicationData,
    pub entities: Vec<EntityData>,
}

impl GraphPayload {
    pub fn mention_count(&self) -> u32 {
        self.entities.iter().map(|e| e.mentions.len() as u32).sum()
    }

    pub fn subject_count(&self) -> u32 {
        self.entities
            .iter()
            .flat_map(|e| &e.mentions)
            .map(|m| m.subjects.len() as u32)
            .sum()
    }
}

/// Per-mention sentiment aggregation over its subjects. Zero subjects yields
/// an empty map; proportions are rounded to 3 decimals.
pub fn aggregate_sentiment(subjects: &[Subject]) -> BTreeMap<SentimentLevel, SentimentShare> {
    let mut counts: BTreeMap<SentimentLevel, u32> = BTreeMap::new();
    for subject in subjects {
        *counts.entry(subject.sentiment).or_insert(0) += 1;
    }
    let total = subjects.len() as f64;
    counts
        .into_iter()
        .map(|(sentiment, count)| {
            let prop = (count as f64 / total * SENTIMENT_PROP_DECIMALS).round()
                / SENTIMENT_PROP_DECIMALS;
            (sentiment, SentimentShare { count, prop })
        })
        .collect()
}

/// Assemble the node-and-edge payload for one item.
///
/// Fails with `SpeakerUnknown` when the speaker is missing from the registry
/// and with a validation error when the categorize artifact yields two
/// mentions with the same `(entity, topic)` key.
pub fn assemble(
    state: &PipelineState,
    scrape: &ScrapeArtifact,
    summarize: &SummarizeArtifact,
    categorize: &CategorizeArtifact,
    registry: &SpeakerRegistry,
) -> Result<GraphPayload, DiscourseKgError> {
    let speaker = registry.get(&state.speaker)?;
    let speaker_data = SpeakerNodeData {
        name_id: state.speaker.clone(),
        display_name: speaker.display_name.clone(),
        role: speaker.role.clone(),
        organization: speaker.organization.clone(),
        industry: speaker.industry,
        region: speaker.region.clone(),
        date_of_birth: speaker.date_of_birth,
        bio: speaker.bio.clone(),
        influence_score: speaker.influence_score,
    };

    let compression_ratio = if summarize.was_summarized {
        summarize.compression_ratio
    } else {
        None
    };
    let communication = CommunicationData {
        id: state.id.clone(),
        title: state
            .title
            .clone()
            .or_else(|| scrape.title.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        content_type: state.content_type,
        content_date: state.content_date.or(scrape.content_date),
        source_url: state.source_url.clone(),
        full_text: scrape.full_text.clone(),
        word_count: scrape.word_count,
        was_summarized: summarize.was_summarized,
        compression_ratio,
    };

    let mut entities: Vec<EntityData> = Vec::new();
    let mut entity_index: HashMap<String, usize> = HashMap::new();
    let mut seen_mentions: HashSet<(String, TopicCategory)> = HashSet::new();

    for entity in &categorize.entities {
        let key = canonical_key(&entity.entity_name);
        if key.is_empty() {
            return Err(DiscourseKgError::Validation("entity with empty name".into()));
        }
        // Two raw names can normalize to the same entity; the first-seen type
        // wins, matching the store's merge policy.
        let idx = *entity_index.entry(key.clone()).or_insert_with(|| {
            entities.push(EntityData {
                canonical_name: key.clone(),
                display_name: entity.entity_name.trim().to_string(),
                entity_type: entity.entity_type,
                mentions: Vec::new(),
            });
            entities.len() - 1
        });

        for mention in &entity.mentions {
            if !seen_mentions.insert((key.clone(), mention.topic)) {
                return Err(DiscourseKgError::Validation(format!(
                    "duplicate mention for entity '{}' topic '{}'",
                    entity.entity_name, mention.topic
                )));
            }

            // Dedup by normalized key before aggregating, so the sentiment
            // counts always sum to the number of Subject nodes that land in
            // the graph.
            let mut seen_subjects = HashSet::new();
            let deduped: Vec<Subject> = mention
                .subjects
                .iter()
                .filter(|s| seen_subjects.insert(canonical_key(&s.subject_name)))
                .cloned()
                .collect();

            let subjects: Vec<SubjectData> = deduped
                .iter()
                .map(|subject| SubjectData {
                    key: canonical_key(&subject.subject_name),
                    name: subject.subject_name.trim().to_string(),
                    sentiment: subject.sentiment,
                    quotes: subject
                        .quotes
                        .iter()
                        .map(|q| q.trim().to_string())
                        .filter(|q| !q.is_empty())
                        .take(QUOTES_MAX)
                        .collect(),
                })
                .collect();

            entities[idx].mentions.push(MentionData {
                topic: mention.topic,
                context: mention.context.trim().to_string(),
                aggregated_sentiment: aggregate_sentiment(&deduped),
                subjects,
            });
        }
    }

    Ok(GraphPayload {
        speaker: speaker_data,
        communication,
        entities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use discoursekg_common::{EntityMention, Speaker, TopicMention};

    fn registry() -> SpeakerRegistry {
        let mut registry = SpeakerRegistry::default();
        registry.speakers.insert(
            "jane_doe".to_string(),
            Speaker {
                display_name: "Jane Doe".to_string(),
                role: "Senator".to_string(),
                organization: "US Senate".to_string(),
                industry: Industry::Politics,
                region: "US".to_string(),
                date_of_birth: None,
                bio: None,
                influence_score: Some(0.7),
                sources: vec![],
            },
        );
        registry
    }

    fn state() -> PipelineState {
        let mut state = PipelineState::discovered(
            "item-1".to_string(),
            "jane_doe".to_string(),
            "https://example.org/a".to_string(),
            ContentType::Speech,
            Some("Remarks".to_string()),
            NaiveDate::from_ymd_opt(2025, 3, 1),
            "p".to_string(),
        );
        state.next_stage = Some(discoursekg_common::Stage::Graph);
        state
    }

    fn scrape() -> ScrapeArtifact {
        ScrapeArtifact {
            full_text: "Full transcript text about Acme.".to_string(),
            word_count: 5,
            title: Some("Remarks".to_string()),
            content_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            content_type: ContentType::Speech,
            source_url: "https://example.org/a".to_string(),
        }
    }

    fn summarize(was_summarized: bool) -> SummarizeArtifact {
        SummarizeArtifact {
            summary: "text".to_string(),
            was_summarized,
            compression_ratio: was_summarized.then_some(0.4),
            original_word_count: 5,
            summary_word_count: 2,
            target_word_count: 1000,
            processing_time_seconds: 0.1,
            success: true,
            error_message: None,
        }
    }

    fn subject(name: &str, sentiment: SentimentLevel) -> Subject {
        Subject {
            subject_name: name.to_string(),
            sentiment,
            quotes: vec!["a quote".to_string()],
        }
    }

    fn categorize(entities: Vec<EntityMention>) -> CategorizeArtifact {
        CategorizeArtifact { entities }
    }

    fn entity(name: &str, mentions: Vec<TopicMention>) -> EntityMention {
        EntityMention {
            entity_name: name.to_string(),
            entity_type: EntityType::Organization,
            mentions,
        }
    }

    fn mention(topic: TopicCategory, subjects: Vec<Subject>) -> TopicMention {
        TopicMention {
            topic,
            context: "long enough context about the entity".to_string(),
            subjects,
        }
    }

    #[test]
    fn aggregation_counts_and_props_sum_to_one() {
        let subjects = vec![
            subject("chip production", SentimentLevel::Positive),
            subject("price controls", SentimentLevel::Positive),
            subject("labor costs", SentimentLevel::Negative),
        ];
        let agg = aggregate_sentiment(&subjects);
        assert_eq!(agg[&SentimentLevel::Positive].count, 2);
        assert_eq!(agg[&SentimentLevel::Positive].prop, 0.667);
        assert_eq!(agg[&SentimentLevel::Negative].count, 1);
        assert_eq!(agg[&SentimentLevel::Negative].prop, 0.333);

        let count_sum: u32 = agg.values().map(|s| s.count).sum();
        assert_eq!(count_sum as usize, subjects.len());
        let prop_sum: f64 = agg.values().map(|s| s.prop).sum();
        assert!((prop_sum - 1.0).abs() <= 0.001);
    }

    #[test]
    fn zero_subjects_yield_empty_aggregation() {
        assert!(aggregate_sentiment(&[]).is_empty());

        let artifact = categorize(vec![entity(
            "Acme",
            vec![mention(TopicCategory::Economics, vec![])],
        )]);
        let payload = assemble(&state(), &scrape(), &summarize(true), &artifact, &registry()).unwrap();
        assert!(payload.entities[0].mentions[0].aggregated_sentiment.is_empty());
        assert_eq!(payload.subject_count(), 0);
    }

    #[test]
    fn duplicate_mention_key_fails_validation() {
        let artifact = categorize(vec![entity(
            "Acme",
            vec![
                mention(TopicCategory::Economics, vec![]),
                mention(TopicCategory::Economics, vec![]),
            ],
        )]);
        let err =
            assemble(&state(), &scrape(), &summarize(true), &artifact, &registry()).unwrap_err();
        assert!(err.to_string().contains("duplicate mention"));
    }

    #[test]
    fn entities_merge_under_key_normalization() {
        // "Acme Corp" and " ACME corp " normalize to the same entity; the
        // first-seen type is kept and distinct topics both survive.
        let mut second = entity(" ACME corp ", vec![mention(TopicCategory::Technology, vec![])]);
        second.entity_type = EntityType::Other;
        let artifact = categorize(vec![
            entity("Acme Corp", vec![mention(TopicCategory::Economics, vec![])]),
            second,
        ]);
        let payload = assemble(&state(), &scrape(), &summarize(true), &artifact, &registry()).unwrap();
        assert_eq!(payload.entities.len(), 1);
        assert_eq!(payload.entities[0].canonical_name, "acme corp");
        assert_eq!(payload.entities[0].entity_type, EntityType::Organization);
        assert_eq!(payload.entities[0].mentions.len(), 2);
        assert_eq!(payload.mention_count(), 2);
    }

    #[test]
    fn same_key_subjects_dedupe_before_aggregation() {
        // "Chip Production" and " chip production " collapse to one Subject
        // node; the aggregation must count the survivor, not the raw list.
        let artifact = categorize(vec![entity(
            "Acme",
            vec![mention(
                TopicCategory::Economics,
                vec![
                    subject("Chip Production", SentimentLevel::Positive),
                    subject(" chip production ", SentimentLevel::Negative),
                    subject("labor costs", SentimentLevel::Negative),
                ],
            )],
        )]);
        let payload = assemble(&state(), &scrape(), &summarize(true), &artifact, &registry()).unwrap();

        let mention = &payload.entities[0].mentions[0];
        assert_eq!(mention.subjects.len(), 2);
        assert_eq!(payload.subject_count(), 2);
        // First-seen subject wins, so its sentiment is the one counted.
        assert_eq!(mention.aggregated_sentiment[&SentimentLevel::Positive].count, 1);
        assert_eq!(mention.aggregated_sentiment[&SentimentLevel::Negative].count, 1);

        let count_sum: u32 = mention.aggregated_sentiment.values().map(|s| s.count).sum();
        assert_eq!(count_sum as usize, mention.subjects.len());
        let prop_sum: f64 = mention.aggregated_sentiment.values().map(|s| s.prop).sum();
        assert!((prop_sum - 1.0).abs() <= 0.001);
    }

    #[test]
    fn unknown_speaker_fails() {
        let mut state = state();
        state.speaker = "john_roe".to_string();
        let err = assemble(
            &state,
            &scrape(),
            &summarize(true),
            &categorize(vec![]),
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, DiscourseKgError::SpeakerUnknown(_)));
    }

    #[test]
    fn unsummarized_communication_has_no_compression_ratio() {
        let payload = assemble(
            &state(),
            &scrape(),
            &summarize(false),
            &categorize(vec![]),
            &registry(),
        )
        .unwrap();
        assert!(!payload.communication.was_summarized);
        assert!(payload.communication.compression_ratio.is_none());
        assert_eq!(payload.communication.word_count, 5);
    }

    #[test]
    fn quotes_are_trimmed_and_capped() {
        let mut s = subject("chip production", SentimentLevel::Positive);
        s.quotes = (0..10).map(|i| format!("  quote {i} ")).collect();
        let artifact = categorize(vec![entity(
            "Acme",
            vec![mention(TopicCategory::Economics, vec![s])],
        )]);
        let payload = assemble(&state(), &scrape(), &summarize(true), &artifact, &registry()).unwrap();
        let subject = &payload.entities[0].mentions[0].subjects[0];
        assert_eq!(subject.quotes.len(), QUOTES_MAX);
        assert_eq!(subject.quotes[0], "quote 0");
    }

    #[test]
    fn canonical_key_normalizes() {
        assert_eq!(canonical_key("  Apple  "), "apple");
        assert_eq!(canonical_key("CAFE\u{0301}"), "café");
        assert_eq!(canonical_key("China"), canonical_key("CHINA"));
    }
}
