//! The synchronous document pipeline: anchors → evidence → entities →
//! clustering → scoring, run inline for every new document version so the
//! first EVENT_UPSERT lands inside the fast-path budget. Deep artefacts
//! (linked PDFs) are queued for the deep pool instead of fetched here.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use radar_common::{AnchorType, FetchStrategy, PoolKind};
use radar_ingest::pools::{DocumentProcessor, NewDocument};
use radar_ingest::profile::{Cadence, Limits, Metadata, Observability, SourceProfile};
use radar_organizer::{compute_evidence, extract_anchors, extract_entities, suggest_lane, Organizer};
use radar_store::Store;

use crate::engine::EventEngine;

pub struct Pipeline {
    store: Store,
    organizer: Organizer,
    engine: Arc<EventEngine>,
    user_agent: String,
}

impl Pipeline {
    pub fn new(
        store: Store,
        organizer: Organizer,
        engine: Arc<EventEngine>,
        user_agent: String,
    ) -> Self {
        Self {
            store,
            organizer,
            engine,
            user_agent,
        }
    }

    /// Queue a deep job for each linked PDF artefact so gazettes get
    /// pulled without ever blocking this path.
    async fn queue_deep_artefacts(&self, new_doc: &NewDocument, pdf_urls: &[String]) -> Result<()> {
        let Some(source) = self.store.source_by_id(new_doc.source_id).await? else {
            return Ok(());
        };
        for url in pdf_urls {
            let profile = SourceProfile {
                id: Some(new_doc.source_id),
                source_id: format!("{}:deep", source.name),
                source_domain: Some(source.domain.clone()),
                tier: source.tier,
                is_official: source.is_official,
                lang: source.lang.clone(),
                pool: PoolKind::DeepExtract,
                strategy: FetchStrategy::Pdf,
                endpoints: HashMap::from([("latest".to_string(), url.clone())]),
                headers: HashMap::from([("User-Agent".to_string(), self.user_agent.clone())]),
                cadence: Cadence {
                    cron: None,
                    interval_seconds: Some(86_400),
                },
                limits: Limits {
                    max_bytes: 50_000_000,
                    timeout_seconds: 300,
                    ..Limits::default()
                },
                observability: Observability::default(),
                metadata: Metadata::default(),
            };
            let payload = serde_json::to_value(&profile)?;
            if let Some(job_id) = self
                .store
                .enqueue_enrichment_job(PoolKind::DeepExtract, new_doc.source_id, &payload, url)
                .await?
            {
                debug!(job_id, url, "queued deep artefact download");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentProcessor for Pipeline {
    async fn process(&self, new_doc: NewDocument) -> Result<()> {
        let doc = &new_doc.doc;

        // Anchors and evidence are CPU-bound and run to completion here.
        let anchors = extract_anchors(&doc.clean_text);
        let table_like = doc.clean_text.lines().count() >= 5
            && radar_ingest::pdf::looks_table_like(&doc.clean_text);
        let features = compute_evidence(&anchors, new_doc.is_official, table_like);
        let entities = extract_entities(&doc.clean_text);

        self.store.insert_anchors(doc.id, &anchors).await?;
        self.store.upsert_evidence(doc.id, &features).await?;
        self.store.insert_entity_mentions(doc.id, &entities).await?;

        let source_domain = self
            .store
            .source_by_id(new_doc.source_id)
            .await?
            .map(|s| s.domain)
            .unwrap_or_default();
        let lane = suggest_lane(&format!(
            "{} {}",
            doc.title.as_deref().unwrap_or(""),
            doc.clean_text
        ));

        let (assignment, signals) = self
            .organizer
            .assign(doc, &anchors, &entities, new_doc.source_id, &source_domain, lane)
            .await?;
        let event_id = assignment.event_id();

        info!(
            doc_id = doc.id,
            event_id,
            anchors = anchors.len(),
            evidence = features.evidence_score,
            rule = assignment.reason_code(),
            "document organised"
        );

        if !signals.flags.is_empty() {
            self.engine.apply_quarantine(event_id, &signals.flags).await?;
        }

        self.engine.rescore(event_id).await?;

        // Linked PDFs feed deep enrichment.
        let pdf_urls: Vec<String> = anchors
            .iter()
            .filter(|a| a.anchor_type == AnchorType::Pdf)
            .map(|a| a.value.clone())
            .collect();
        if !pdf_urls.is_empty() {
            if let Err(e) = self.queue_deep_artefacts(&new_doc, &pdf_urls).await {
                warn!(doc_id = doc.id, error = %e, "deep artefact enqueue failed");
            }
        }

        Ok(())
    }
}
