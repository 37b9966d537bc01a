//! Live-store round trip: upsert a payload twice and verify the second pass
//! merges everything. Run with:
//! cargo test -p discoursekg-graph --test graph_upsert_test -- --ignored

use chrono::NaiveDate;

use discoursekg_common::{
    CategorizeArtifact, ContentType, EntityMention, EntityType, Industry, PipelineState,
    ScrapeArtifact, SentimentLevel, Speaker, SpeakerRegistry, Subject, SummarizeArtifact,
    TopicCategory, TopicMention,
};
use discoursekg_graph::{assemble, GraphClient, GraphWriter};

fn fixture() -> (PipelineState, ScrapeArtifact, SummarizeArtifact, CategorizeArtifact, SpeakerRegistry)
{
    let mut registry = SpeakerRegistry::default();
    registry.speakers.insert(
        "graph_test_speaker".to_string(),
        Speaker {
            display_name: "Graph Test Speaker".to_string(),
            role: "Test".to_string(),
            organization: "Test Org".to_string(),
            industry: Industry::Politics,
            region: "US".to_string(),
            date_of_birth: None,
            bio: None,
            influence_score: None,
            sources: vec![],
        },
    );

    let mut state = PipelineState::discovered(
        "graph-test-item".to_string(),
        "graph_test_speaker".to_string(),
        "https://example.org/graph-test".to_string(),
        ContentType::Speech,
        Some("Graph Test".to_string()),
        NaiveDate::from_ymd_opt(2025, 3, 1),
        "p".to_string(),
    );
    state.next_stage = Some(discoursekg_common::Stage::Graph);

    let scrape = ScrapeArtifact {
        full_text: "We support chip production at Acme.".to_string(),
        word_count: 6,
        title: Some("Graph Test".to_string()),
        content_date: NaiveDate::from_ymd_opt(2025, 3, 1),
        content_type: ContentType::Speech,
        source_url: "https://example.org/graph-test".to_string(),
    };
    let summarize = SummarizeArtifact {
        summary: scrape.full_text.clone(),
        was_summarized: false,
        compression_ratio: None,
        original_word_count: 6,
        summary_word_count: 6,
        target_word_count: 1000,
        processing_time_seconds: 0.0,
        success: true,
        error_message: None,
    };
    let categorize = CategorizeArtifact {
        entities: vec![EntityMention {
            entity_name: "Acme".to_string(),
            entity_type: EntityType::Organization,
            mentions: vec![TopicMention {
                topic: TopicCategory::Economics,
                context: "praised Acme's domestic chip production".to_string(),
                subjects: vec![Subject {
                    subject_name: "chip production".to_string(),
                    sentiment: SentimentLevel::Positive,
                    quotes: vec!["We support chip production at Acme.".to_string()],
                }],
            }],
        }],
    };
    (state, scrape, summarize, categorize, registry)
}

#[tokio::test]
#[ignore] // requires a live graph store
async fn rerun_is_all_merges() {
    let uri = std::env::var("GRAPH_URL").expect("GRAPH_URL required");
    let user = std::env::var("GRAPH_USER").expect("GRAPH_USER required");
    let password = std::env::var("GRAPH_PASSWORD").expect("GRAPH_PASSWORD required");

    let client = GraphClient::connect(&uri, &user, &password)
        .await
        .expect("Failed to connect");
    let writer = GraphWriter::new(client);
    writer.ensure_constraints().await;

    let (state, scrape, summarize, categorize, registry) = fixture();
    let payload = assemble(&state, &scrape, &summarize, &categorize, &registry).unwrap();

    let first = writer.upsert_payload(&payload).await.unwrap();
    assert_eq!(first.mention_count, 1);
    assert_eq!(first.subject_count, 1);

    let second = writer.upsert_payload(&payload).await.unwrap();
    assert_eq!(second.nodes_created, 0);
    assert!(second.nodes_merged > 0);
    assert_eq!(second.edges_created, 0);
}
