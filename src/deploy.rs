//! IAP deployment orchestration.
//!
//! Deploying an IAP walks its activities in stored order, asks each
//! activity's provider to deploy it, and builds the platform launch URL
//! for the instance the provider created. Nothing is persisted until
//! every activity has succeeded; the full URL map and the deployed flag
//! are then committed in a single store write.

use crate::errors::{CoreError, Result};
use crate::launch;
use crate::models::Iap;
use crate::provider::ProviderClient;
use crate::store::{ActivityStore, IapStore, ProviderStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Orchestrates the `NotDeployed -> Deploying -> Deployed` transition of
/// an IAP.
///
/// Provider calls are strictly sequential: the commit/rollback boundary
/// stays trivial at the cost of total latency being the sum over
/// activities. Concurrent deploy calls against the same IAP are not
/// mutually excluded; callers that need exclusion must serialize above
/// this layer.
pub struct DeploymentOrchestrator<C: ProviderClient> {
    iaps: Arc<dyn IapStore>,
    activities: Arc<dyn ActivityStore>,
    providers: Arc<dyn ProviderStore>,
    client: Arc<C>,
}

impl<C: ProviderClient> DeploymentOrchestrator<C> {
    pub fn new(
        iaps: Arc<dyn IapStore>,
        activities: Arc<dyn ActivityStore>,
        providers: Arc<dyn ProviderStore>,
        client: Arc<C>,
    ) -> Self {
        Self {
            iaps,
            activities,
            providers,
            client,
        }
    }

    /// Deploy every activity of an IAP and commit the result atomically.
    ///
    /// `platform_base_url` is the ingress-supplied base (scheme + host)
    /// the launch URLs are composed against.
    ///
    /// On the first provider failure the accumulated delta is discarded
    /// and the stored IAP is left byte-identical to its pre-call state.
    /// Provider-side deployments that already succeeded are not undone.
    pub async fn deploy(&self, iap_id: &str, platform_base_url: &str) -> Result<Iap> {
        let iap = self
            .iaps
            .iap(iap_id)
            .await?
            .ok_or_else(|| CoreError::not_found("iap", iap_id))?;

        if iap.is_deployed {
            warn!(iap_id = %iap_id, "re-deploying an already deployed IAP");
        }

        info!(
            iap_id = %iap_id,
            activities = iap.activity_ids.len(),
            "deployment started"
        );

        // Explicit fold into an owned delta; the stored IAP is untouched
        // until the commit below.
        let mut pending: BTreeMap<String, String> = BTreeMap::new();

        for activity_id in &iap.activity_ids {
            let activity = self
                .activities
                .activity(activity_id)
                .await?
                .ok_or_else(|| CoreError::not_found("activity", activity_id))?;

            let provider = self
                .providers
                .provider(&activity.activity_provider_id)
                .await?
                .ok_or_else(|| {
                    CoreError::not_found("activity provider", &activity.activity_provider_id)
                })?;

            let external_url = self.client.deploy(&provider.url, activity_id).await?;

            pending.insert(
                activity_id.clone(),
                launch::provide_url(platform_base_url, activity_id, &external_url),
            );
        }

        let committed = self.iaps.commit_deployment(iap_id, pending).await?;

        info!(iap_id = %iap_id, "deployment committed");
        Ok(committed)
    }
}
