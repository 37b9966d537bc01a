//! Write-side wrapper for the graph store. Every upsert is a Cypher MERGE on
//! the node's natural key; non-key attributes overwrite, except
//! `Entity.entity_type` which is first-write-wins with a logged warning.
//!
//! Created-vs-merged counting uses a transient `created_now` marker set in
//! `ON CREATE` and removed before returning.

use anyhow::Result;
use neo4rs::query;
use tracing::{debug, info, warn};

use discoursekg_common::GraphReportArtifact;

use crate::builder::{EntityData, GraphPayload, MentionData, SubjectData};
use crate::client::GraphClient;

pub struct GraphWriter {
    client: GraphClient,
}

struct UpsertCounts {
    nodes_created: u32,
    nodes_merged: u32,
    edges_created: u32,
}

impl GraphWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Create uniqueness constraints (idempotent).
    pub async fn ensure_constraints(&self) {
        let constraints = [
            "CREATE CONSTRAINT speaker_name_id IF NOT EXISTS FOR (s:Speaker) REQUIRE s.name_id IS UNIQUE",
            "CREATE CONSTRAINT communication_id IF NOT EXISTS FOR (c:Communication) REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT entity_canonical_name IF NOT EXISTS FOR (e:Entity) REQUIRE e.canonical_name IS UNIQUE",
        ];
        for constraint in constraints {
            if let Err(e) = self.client.graph.run(query(constraint)).await {
                debug!(error = %e, "constraint already exists or not supported");
            }
        }
    }

    /// Upsert the whole payload in dependency order: Speaker, Communication,
    /// Entities, Mentions, Subjects, with edges merged alongside their tail
    /// nodes. Returns the load report.
    pub async fn upsert_payload(&self, payload: &GraphPayload) -> Result<GraphReportArtifact> {
        let mut counts = UpsertCounts {
            nodes_created: 0,
            nodes_merged: 0,
            edges_created: 0,
        };
        let mut warnings = Vec::new();

        self.upsert_speaker(payload, &mut counts).await?;
        self.upsert_communication(payload, &mut counts).await?;

        for entity in &payload.entities {
            self.upsert_entity(entity, &mut counts, &mut warnings).await?;
            for mention in &entity.mentions {
                self.upsert_mention(&payload.communication.id, entity, mention, &mut counts)
                    .await?;
                for subject in &mention.subjects {
                    self.upsert_subject(
                        &payload.communication.id,
                        entity,
                        mention,
                        subject,
                        &mut counts,
                    )
                    .await?;
                }
            }
        }

        let report = GraphReportArtifact {
            nodes_created: counts.nodes_created,
            nodes_merged: counts.nodes_merged,
            edges_created: counts.edges_created,
            mention_count: payload.mention_count(),
            subject_count: payload.subject_count(),
            warnings,
        };
        info!(
            communication = payload.communication.id.as_str(),
            nodes_created = report.nodes_created,
            nodes_merged = report.nodes_merged,
            edges_created = report.edges_created,
            "graph load complete"
        );
        Ok(report)
    }

    async fn upsert_speaker(
        &self,
        payload: &GraphPayload,
        counts: &mut UpsertCounts,
    ) -> Result<()> {
        let speaker = &payload.speaker;
        let q = query(
            "MERGE (s:Speaker {name_id: $name_id})
             ON CREATE SET s.created_now = true
             SET s.name = $display_name,
                 s.display_name = $display_name,
                 s.role = $role,
                 s.organization = $organization,
                 s.industry = $industry,
                 s.region = $region,
                 s.date_of_birth = $date_of_birth,
                 s.bio = $bio,
                 s.influence_score = $influence_score
             WITH s, coalesce(s.created_now, false) AS created
             REMOVE s.created_now
             RETURN created",
        )
        .param("name_id", speaker.name_id.as_str())
        .param("display_name", speaker.display_name.as_str())
        .param("role", speaker.role.as_str())
        .param("organization", speaker.organization.as_str())
        .param("industry", speaker.industry.to_string())
        .param("region", speaker.region.as_str())
        .param(
            "date_of_birth",
            speaker
                .date_of_birth
                .map(|d| d.to_string())
                .unwrap_or_default(),
        )
        .param("bio", speaker.bio.clone().unwrap_or_default())
        .param("influence_score", speaker.influence_score.unwrap_or(0.0));

        let created = self.run_counting(q, &["created"]).await?;
        counts.count_node(created[0]);
        Ok(())
    }

    async fn upsert_communication(
        &self,
        payload: &GraphPayload,
        counts: &mut UpsertCounts,
    ) -> Result<()> {
        let comm = &payload.communication;
        let q = query(
            "MATCH (sp:Speaker {name_id: $speaker})
             MERGE (c:Communication {id: $id})
             ON CREATE SET c.created_now = true
             SET c.name = $title,
                 c.title = $title,
                 c.content_type = $content_type,
                 c.content_date = $content_date,
                 c.source_url = $source_url,
                 c.full_text = $full_text,
                 c.word_count = $word_count,
                 c.was_summarized = $was_summarized,
                 c.compression_ratio = $compression_ratio
             MERGE (sp)-[r:DELIVERED]->(c)
             ON CREATE SET r.created_now = true
             WITH c, r,
                  coalesce(c.created_now, false) AS node_created,
                  coalesce(r.created_now, false) AS edge_created
             REMOVE c.created_now, r.created_now
             RETURN node_created, edge_created",
        )
        .param("speaker", payload.speaker.name_id.as_str())
        .param("id", comm.id.as_str())
        .param("title", comm.title.as_str())
        .param("content_type", comm.content_type.to_string())
        .param(
            "content_date",
            comm.content_date.map(|d| d.to_string()).unwrap_or_default(),
        )
        .param("source_url", comm.source_url.as_str())
        .param("full_text", comm.full_text.as_str())
        .param("word_count", comm.word_count as i64)
        .param("was_summarized", comm.was_summarized)
        .param("compression_ratio", comm.compression_ratio.unwrap_or(1.0));

        let created = self.run_counting(q, &["node_created", "edge_created"]).await?;
        counts.count_node(created[0]);
        counts.count_edge(created[1]);
        Ok(())
    }

    async fn upsert_entity(
        &self,
        entity: &EntityData,
        counts: &mut UpsertCounts,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let q = query(
            "MERGE (e:Entity {canonical_name: $canonical_name})
             ON CREATE SET e.created_now = true, e.entity_type = $entity_type
             SET e.name = $display_name
             WITH e, coalesce(e.created_now, false) AS created
             REMOVE e.created_now
             RETURN created, e.entity_type AS stored_type",
        )
        .param("canonical_name", entity.canonical_name.as_str())
        .param("entity_type", entity.entity_type.to_string())
        .param("display_name", entity.display_name.as_str());

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            let created: bool = row.get("created").unwrap_or(false);
            counts.count_node(created);
            let stored_type: String = row.get("stored_type").unwrap_or_default();
            if !created && stored_type != entity.entity_type.to_string() {
                let warning = format!(
                    "entity '{}' already stored as '{}', keeping it over '{}'",
                    entity.canonical_name, stored_type, entity.entity_type
                );
                warn!("{warning}");
                warnings.push(warning);
            }
        }
        while stream.next().await?.is_some() {}
        Ok(())
    }

    async fn upsert_mention(
        &self,
        comm_id: &str,
        entity: &EntityData,
        mention: &MentionData,
        counts: &mut UpsertCounts,
    ) -> Result<()> {
        let aggregated = serde_json::to_string(&mention.aggregated_sentiment)?;
        let q = query(
            "MATCH (c:Communication {id: $comm_id})
             MATCH (e:Entity {canonical_name: $entity_key})
             MERGE (m:Mention {communication_id: $comm_id, entity_key: $entity_key, topic: $topic})
             ON CREATE SET m.created_now = true
             SET m.name = $topic,
                 m.context = $context,
                 m.aggregated_sentiment = $aggregated_sentiment
             MERGE (c)-[hm:HAS_MENTION]->(m)
             ON CREATE SET hm.created_now = true
             MERGE (m)-[rt:REFERS_TO]->(e)
             ON CREATE SET rt.created_now = true
             WITH m, hm, rt,
                  coalesce(m.created_now, false) AS node_created,
                  coalesce(hm.created_now, false) AS mention_edge_created,
                  coalesce(rt.created_now, false) AS refers_edge_created
             REMOVE m.created_now, hm.created_now, rt.created_now
             RETURN node_created, mention_edge_created, refers_edge_created",
        )
        .param("comm_id", comm_id)
        .param("entity_key", entity.canonical_name.as_str())
        .param("topic", mention.topic.to_string())
        .param("context", mention.context.as_str())
        .param("aggregated_sentiment", aggregated);

        let created = self
            .run_counting(q, &["node_created", "mention_edge_created", "refers_edge_created"])
            .await?;
        counts.count_node(created[0]);
        counts.count_edge(created[1]);
        counts.count_edge(created[2]);
        Ok(())
    }

    async fn upsert_subject(
        &self,
        comm_id: &str,
        entity: &EntityData,
        mention: &MentionData,
        subject: &SubjectData,
        counts: &mut UpsertCounts,
    ) -> Result<()> {
        let q = query(
            "MATCH (m:Mention {communication_id: $comm_id, entity_key: $entity_key, topic: $topic})
             MERGE (s:Subject {communication_id: $comm_id, entity_key: $entity_key,
                               topic: $topic, subject_key: $subject_key})
             ON CREATE SET s.created_now = true
             SET s.name = $subject_name,
                 s.subject_name = $subject_name,
                 s.sentiment = $sentiment,
                 s.quotes = $quotes
             MERGE (m)-[hs:HAS_SUBJECT]->(s)
             ON CREATE SET hs.created_now = true
             WITH s, hs,
                  coalesce(s.created_now, false) AS node_created,
                  coalesce(hs.created_now, false) AS edge_created
             REMOVE s.created_now, hs.created_now
             RETURN node_created, edge_created",
        )
        .param("comm_id", comm_id)
        .param("entity_key", entity.canonical_name.as_str())
        .param("topic", mention.topic.to_string())
        .param("subject_key", subject.key.as_str())
        .param("subject_name", subject.name.as_str())
        .param("sentiment", subject.sentiment.to_string())
        .param("quotes", subject.quotes.clone());

        let created = self.run_counting(q, &["node_created", "edge_created"]).await?;
        counts.count_node(created[0]);
        counts.count_edge(created[1]);
        Ok(())
    }

    /// Execute a query and read boolean creation flags from its single row.
    async fn run_counting(&self, q: neo4rs::Query, columns: &[&str]) -> Result<Vec<bool>> {
        let mut stream = self.client.graph.execute(q).await?;
        let mut flags = vec![false; columns.len()];
        if let Some(row) = stream.next().await? {
            for (i, column) in columns.iter().enumerate() {
                flags[i] = row.get(column).unwrap_or(false);
            }
        }
        while stream.next().await?.is_some() {}
        Ok(flags)
    }
}

impl UpsertCounts {
    fn count_node(&mut self, created: bool) {
        if created {
            self.nodes_created += 1;
        } else {
            self.nodes_merged += 1;
        }
    }

    fn count_edge(&mut self, created: bool) {
        if created {
            self.edges_created += 1;
        }
    }
}
