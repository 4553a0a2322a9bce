//! Deferred canonical merge.
//!
//! Early splits are allowed on the fast path; this sweep repairs them.
//! Events sharing a strong anchor pair collapse into one canonical:
//! earliest first-seen wins, anchor count breaks ties. Followers keep a
//! one-step tombstone pointer, never a chain.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use radar_common::reasons;
use radar_store::anchors::AnchorGroupRow;
use radar_store::merges::MergeOutcome;
use radar_store::Store;

/// One event's membership in a shared-anchor group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub event_id: i64,
    pub first_seen_at: DateTime<Utc>,
    pub anchor_count: i64,
}

/// Pick the canonical member: earliest first seen, then highest anchor
/// count, then lowest id for determinism.
pub fn pick_canonical(members: &[GroupMember]) -> Option<&GroupMember> {
    members.iter().min_by(|a, b| {
        a.first_seen_at
            .cmp(&b.first_seen_at)
            .then_with(|| b.anchor_count.cmp(&a.anchor_count))
            .then_with(|| a.event_id.cmp(&b.event_id))
    })
}

pub struct Canonicalizer {
    store: Store,
    window: Duration,
}

impl Canonicalizer {
    pub fn new(store: Store, window_hours: i64) -> Self {
        Self {
            store,
            window: Duration::hours(window_hours),
        }
    }

    /// One sweep. Returns the merges that actually happened so the caller
    /// can re-score canonicals and emit tombstone broadcasts.
    pub async fn sweep(&self) -> Result<Vec<MergeOutcome>> {
        let rows = self.store.shared_strong_anchor_groups(self.window).await?;
        let groups = group_rows(rows);

        let mut outcomes = Vec::new();
        let mut absorbed: std::collections::HashSet<i64> = std::collections::HashSet::new();

        for ((anchor_type, anchor_value), members) in groups {
            if members.len() < 2 {
                continue;
            }
            let Some(canonical) = pick_canonical(&members).cloned() else {
                continue;
            };

            for member in &members {
                if member.event_id == canonical.event_id || absorbed.contains(&member.event_id) {
                    continue;
                }
                let outcome = self
                    .store
                    .merge_events(
                        member.event_id,
                        canonical.event_id,
                        reasons::DEFERRED_CANONICALIZATION,
                        serde_json::json!({
                            "anchor_type": anchor_type,
                            "anchor_value": anchor_value,
                        }),
                    )
                    .await?;
                if outcome.merged {
                    absorbed.insert(member.event_id);
                    outcomes.push(outcome);
                }
            }
        }

        if !outcomes.is_empty() {
            info!(merged = outcomes.len(), "canonicalisation sweep merged events");
        }
        Ok(outcomes)
    }
}

/// Collapse the flat query rows into per-pair member lists, deduplicating
/// events that carry the same pair on several documents.
pub fn group_rows(rows: Vec<AnchorGroupRow>) -> BTreeMap<(String, String), Vec<GroupMember>> {
    let mut groups: BTreeMap<(String, String), Vec<GroupMember>> = BTreeMap::new();
    for row in rows {
        let members = groups
            .entry((row.anchor_type.clone(), row.anchor_value.clone()))
            .or_default();
        if members.iter().any(|m| m.event_id == row.event_id) {
            continue;
        }
        members.push(GroupMember {
            event_id: row.event_id,
            first_seen_at: row.first_seen_at,
            anchor_count: row.anchor_count,
        });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(event_id: i64, minutes_ago: i64, anchors: i64) -> GroupMember {
        GroupMember {
            event_id,
            first_seen_at: Utc::now() - Duration::minutes(minutes_ago),
            anchor_count: anchors,
        }
    }

    #[test]
    fn earliest_first_seen_wins() {
        let members = vec![member(2, 10, 50), member(1, 30, 1), member(3, 5, 99)];
        assert_eq!(pick_canonical(&members).unwrap().event_id, 1);
    }

    #[test]
    fn anchor_count_breaks_first_seen_ties() {
        let seen = Utc::now();
        let a = GroupMember {
            event_id: 7,
            first_seen_at: seen,
            anchor_count: 3,
        };
        let b = GroupMember {
            event_id: 8,
            first_seen_at: seen,
            anchor_count: 9,
        };
        assert_eq!(pick_canonical(&[a, b]).unwrap().event_id, 8);
    }

    #[test]
    fn id_breaks_full_ties() {
        let seen = Utc::now();
        let mk = |id| GroupMember {
            event_id: id,
            first_seen_at: seen,
            anchor_count: 4,
        };
        assert_eq!(pick_canonical(&[mk(12), mk(9), mk(30)]).unwrap().event_id, 9);
    }

    #[test]
    fn grouping_dedupes_events_within_a_pair() {
        let now = Utc::now();
        let row = |event_id: i64| AnchorGroupRow {
            anchor_type: "PL".to_string(),
            anchor_value: "PL 1234/2025".to_string(),
            event_id,
            first_seen_at: now,
            anchor_count: 2,
        };
        let groups = group_rows(vec![row(1), row(1), row(2)]);
        let members = groups
            .get(&("PL".to_string(), "PL 1234/2025".to_string()))
            .unwrap();
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn empty_members_yield_no_canonical() {
        assert!(pick_canonical(&[]).is_none());
    }
}
