//! Clustering: attach each new document to an event, or open one.
//!
//! Three linkage rules, evaluated in order:
//! 1. hard merge on an exact strong `(anchor_type, value)` pair
//! 2. near-duplicate by simhash against documents on active events
//! 3. lexical same-event (title+lede TF-IDF with entity overlap) inside
//!    the time window
//!
//! Early splits are tolerated; the deferred canonicalisation sweep
//! repairs them later.

use anyhow::Result;
use chrono::Duration;
use tracing::info;

use radar_common::fingerprint::{lexical_similarity, simhash_similarity};
use radar_common::reasons;
use radar_common::{AnchorHit, EntityMention, EventFlag};
use radar_store::documents::DocumentRow;
use radar_store::Store;

use crate::entities::entity_overlap;

/// How a document landed on its event.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    HardAnchor {
        event_id: i64,
        anchor_type: String,
        anchor_value: String,
    },
    NearDuplicate {
        event_id: i64,
        similarity: f64,
    },
    SameEvent {
        event_id: i64,
        score: f64,
    },
    Created {
        event_id: i64,
    },
}

impl Assignment {
    pub fn event_id(&self) -> i64 {
        match self {
            Assignment::HardAnchor { event_id, .. }
            | Assignment::NearDuplicate { event_id, .. }
            | Assignment::SameEvent { event_id, .. }
            | Assignment::Created { event_id } => *event_id,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, Assignment::Created { .. })
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Assignment::HardAnchor { .. } => reasons::HARD_ANCHOR_MATCH,
            Assignment::NearDuplicate { .. } => reasons::NEAR_DUPLICATE,
            Assignment::SameEvent { .. } => reasons::SAME_EVENT_LEXICAL,
            Assignment::Created { .. } => reasons::EVENT_CREATED,
        }
    }
}

/// Quarantine signals the organizer can raise while clustering.
#[derive(Debug, Clone, Default)]
pub struct QuarantineSignals {
    pub flags: Vec<EventFlag>,
}

pub struct Organizer {
    store: Store,
    near_dup_threshold: f64,
    same_event_threshold: f64,
    window: Duration,
    /// Domains whose documents always quarantine their events.
    blacklist: Vec<String>,
}

impl Organizer {
    pub fn new(
        store: Store,
        near_dup_threshold: f64,
        same_event_threshold: f64,
        window_hours: i64,
        blacklist: Vec<String>,
    ) -> Self {
        Self {
            store,
            near_dup_threshold,
            same_event_threshold,
            window: Duration::hours(window_hours),
            blacklist,
        }
    }

    /// Place one document. Returns the assignment plus any quarantine
    /// signals the caller should apply to the event.
    pub async fn assign(
        &self,
        doc: &DocumentRow,
        anchors: &[AnchorHit],
        entities: &[EntityMention],
        source_id: i64,
        source_domain: &str,
        lane: &str,
    ) -> Result<(Assignment, QuarantineSignals)> {
        let mut signals = QuarantineSignals::default();
        if self
            .blacklist
            .iter()
            .any(|b| !b.is_empty() && source_domain.ends_with(b.as_str()))
        {
            signals.flags.push(EventFlag::SourceBlacklistHit);
        }

        // Rule 1: exact strong anchor pair.
        for anchor in anchors.iter().filter(|a| a.anchor_type.is_strong()) {
            let matches = self
                .store
                .events_with_anchor(anchor.anchor_type, &anchor.value, self.window)
                .await?;
            if let Some(&event_id) = matches.first() {
                let event_id = self.resolve(event_id).await?;
                self.attach(event_id, doc, source_id).await?;

                // Same official id but text from another world: flag it
                // as contradictory instead of trusting the merge blindly.
                if let (Some(doc_hash), Ok(fps)) = (
                    doc.simhash,
                    self.store.active_fingerprints(self.window).await,
                ) {
                    let best = fps
                        .iter()
                        .filter(|(e, _)| *e == event_id)
                        .map(|(_, h)| simhash_similarity(doc_hash as u64, *h as u64))
                        .fold(0.0f64, f64::max);
                    if best > 0.0 && best < 0.55 {
                        signals.flags.push(EventFlag::ContradictoryEvidence);
                    }
                }

                info!(
                    doc_id = doc.id,
                    event_id,
                    anchor_type = %anchor.anchor_type,
                    "attached by hard anchor"
                );
                return Ok((
                    Assignment::HardAnchor {
                        event_id,
                        anchor_type: anchor.anchor_type.to_string(),
                        anchor_value: anchor.value.clone(),
                    },
                    signals,
                ));
            }
        }

        // Rule 2: near-duplicate fingerprint.
        if let Some(doc_hash) = doc.simhash {
            let fingerprints = self.store.active_fingerprints(self.window).await?;
            let mut best: Option<(i64, f64)> = None;
            for (event_id, hash) in fingerprints {
                let sim = simhash_similarity(doc_hash as u64, hash as u64);
                if sim >= self.near_dup_threshold
                    && best.map(|(_, b)| sim > b).unwrap_or(true)
                {
                    best = Some((event_id, sim));
                }
            }
            if let Some((event_id, similarity)) = best {
                let event_id = self.resolve(event_id).await?;
                self.attach(event_id, doc, source_id).await?;
                info!(doc_id = doc.id, event_id, similarity, "attached as near-duplicate");
                return Ok((
                    Assignment::NearDuplicate {
                        event_id,
                        similarity,
                    },
                    signals,
                ));
            }
        }

        // Rule 3: lexical same-event inside the window.
        let doc_text = profile_text(doc);
        let doc_entities: Vec<String> = entities.iter().map(|e| e.entity_key.clone()).collect();
        let mut best: Option<(i64, f64)> = None;
        for profile in self.store.active_event_profiles(self.window).await? {
            let lexical =
                lexical_similarity(&doc_text, &format!("{} {}", profile.title, profile.lede));
            let overlap = entity_overlap(&doc_entities, &profile.entity_keys);
            let score = 0.7 * lexical + 0.3 * overlap;
            if score >= self.same_event_threshold && best.map(|(_, b)| score > b).unwrap_or(true) {
                best = Some((profile.event_id, score));
            }
        }
        if let Some((event_id, score)) = best {
            let event_id = self.resolve(event_id).await?;
            self.attach(event_id, doc, source_id).await?;
            info!(doc_id = doc.id, event_id, score, "attached by lexical similarity");
            return Ok((Assignment::SameEvent { event_id, score }, signals));
        }

        // No rule fired: open a new event with this document as primary.
        let summary = doc
            .title
            .clone()
            .unwrap_or_else(|| truncate_chars(&doc.clean_text, 140));
        let event = self
            .store
            .create_event(Some(&summary), Some(lane), reasons::EVENT_CREATED)
            .await?;
        self.store
            .attach_doc(event.id, doc.id, source_id, true)
            .await?;
        info!(doc_id = doc.id, event_id = event.id, "created new event");
        Ok((Assignment::Created { event_id: event.id }, signals))
    }

    async fn resolve(&self, event_id: i64) -> Result<i64> {
        Ok(self
            .store
            .resolve_canonical(event_id)
            .await?
            .map(|e| e.id)
            .unwrap_or(event_id))
    }

    async fn attach(&self, event_id: i64, doc: &DocumentRow, source_id: i64) -> Result<()> {
        self.store
            .attach_doc(event_id, doc.id, source_id, false)
            .await?;
        if let Some(title) = &doc.title {
            self.store.set_summary_if_empty(event_id, title).await?;
        }
        Ok(())
    }
}

fn profile_text(doc: &DocumentRow) -> String {
    let title = doc.title.clone().unwrap_or_default();
    let lede = truncate_chars(&doc.clean_text, 600);
    format!("{title} {lede}")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
