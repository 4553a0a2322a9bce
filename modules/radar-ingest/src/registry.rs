//! Source Profile Registry — loads and normalises ingestion contracts.

use anyhow::Result;
use tracing::{info, warn};

use radar_store::sources::SourceRow;
use radar_store::Store;

use crate::profile::SourceProfile;

/// Loads per-source profiles from the database, overlays the canonical
/// columns, injects the institutional User-Agent and drops anything that
/// fails the minimum contract.
#[derive(Clone)]
pub struct ProfileRegistry {
    store: Store,
    user_agent: String,
}

impl ProfileRegistry {
    pub fn new(store: Store, user_agent: String) -> Self {
        Self { store, user_agent }
    }

    /// All enabled, valid profiles with their last-dispatch timestamps.
    pub async fn enabled_profiles(&self) -> Result<Vec<(SourceProfile, SourceRow)>> {
        let sources = self.store.enabled_sources().await?;
        let mut profiles = Vec::with_capacity(sources.len());
        let mut rejected = 0usize;

        for source in sources {
            match self.build_profile(&source) {
                Ok(profile) => profiles.push((profile, source)),
                Err(e) => {
                    rejected += 1;
                    warn!(
                        source_id = source.id,
                        domain = %source.domain,
                        error = %e,
                        "rejecting invalid source profile"
                    );
                }
            }
        }

        if rejected > 0 {
            info!(loaded = profiles.len(), rejected, "profile registry loaded");
        }
        Ok(profiles)
    }

    /// Profile for one source id.
    pub async fn profile_by_id(&self, source_id: i64) -> Result<Option<SourceProfile>> {
        let Some(source) = self.store.source_by_id(source_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.build_profile(&source)?))
    }

    /// Parse the JSON payload and overlay canonical database fields. The
    /// database wins for id, tier, officialness, language and domain.
    fn build_profile(&self, source: &SourceRow) -> Result<SourceProfile> {
        let mut profile: SourceProfile = serde_json::from_value(source.fetch_policy.clone())?;
        profile.id = Some(source.id);
        profile.tier = source.tier;
        profile.is_official = source.is_official;
        profile.lang = source.lang.clone();
        if profile.source_domain.is_none() {
            profile.source_domain = Some(source.domain.clone());
        }
        profile
            .headers
            .entry("User-Agent".to_string())
            .or_insert_with(|| self.user_agent.clone());
        profile.validate()?;
        Ok(profile)
    }
}
