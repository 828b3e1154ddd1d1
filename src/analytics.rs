//! Analytics aggregation across an IAP's activities.
//!
//! Each activity's provider reports metrics under its own raw names.
//! Before merging, every name is prefixed with a namespace derived from
//! the owning activity's display name, so two activities that both
//! report a `score` never collide inside one IAP.

use crate::errors::{CoreError, Result};
use crate::models::{Activity, ActivityProvider, MetricEnvironment};
use crate::provider::ProviderClient;
use crate::store::{ActivityStore, IapStore, ProviderStore};
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Build the namespaced name for one metric of one activity.
///
/// The namespace is the activity's display name with every
/// non-alphanumeric character stripped, joined to the raw metric name
/// with an underscore: activity "Quiz 1", metric "score" → `Quiz1_score`.
///
/// Collision behavior: names are distinct whenever the sanitized
/// activity names are distinct. Activities whose names differ only in
/// stripped characters ("Quiz 1" vs "Quiz.1") sanitize to the same
/// prefix and their metrics will collide; instructors see both as one.
pub fn namespace(activity_name: &str, metric_name: &str) -> String {
    let prefix: String = activity_name.chars().filter(|c| c.is_alphanumeric()).collect();
    format!("{}_{}", prefix, metric_name)
}

/// Pulls metrics from every provider feeding an IAP and merges them into
/// one namespaced view.
///
/// Per-activity fetches run concurrently; merging follows the IAP's
/// stored activity order and sorted map keys, so the result does not
/// depend on fetch completion order.
pub struct MetricsAggregator<C: ProviderClient> {
    iaps: Arc<dyn IapStore>,
    activities: Arc<dyn ActivityStore>,
    providers: Arc<dyn ProviderStore>,
    client: Arc<C>,
}

impl<C: ProviderClient> MetricsAggregator<C> {
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

    /// All namespaced metric names the IAP's providers declare.
    ///
    /// Reflects declared contracts, not live values; used to populate
    /// formula-authoring vocabularies.
    pub async fn list_available_metrics(&self, iap_id: &str) -> Result<BTreeSet<String>> {
        let resolved = self.resolve_activities(iap_id).await?;

        let contracts = try_join_all(resolved.iter().map(|(activity, provider)| async move {
            let contract = self.client.analytics_contract(&provider.url).await?;
            Ok::<_, CoreError>((activity, contract))
        }))
        .await?;

        let mut names = BTreeSet::new();
        for (activity, contract) in contracts {
            for raw in contract.metric_names() {
                names.insert(namespace(&activity.name, raw));
            }
        }

        debug!(iap_id = %iap_id, metrics = names.len(), "resolved metric vocabulary");
        Ok(names)
    }

    /// Per-student metric environment for the IAP, rebuilt from every
    /// provider on each call.
    pub async fn student_metrics(&self, iap_id: &str) -> Result<MetricEnvironment> {
        let resolved = self.resolve_activities(iap_id).await?;

        let per_activity = try_join_all(resolved.iter().map(|(activity, provider)| async move {
            let rows = self.client.analytics(&provider.url, &activity.id).await?;
            Ok::<_, CoreError>((activity, rows))
        }))
        .await?;

        // try_join_all preserves input order, so the merge below is a
        // deterministic fold over (activity order, student id, metric name)
        let mut environment = MetricEnvironment::new();
        for (activity, rows) in per_activity {
            for row in rows {
                let student = environment.entry(row.student_id.clone()).or_default();
                for sample in row.samples() {
                    student.insert(namespace(&activity.name, &sample.name), sample.value.clone());
                }
            }
        }

        debug!(
            iap_id = %iap_id,
            students = environment.len(),
            "aggregated student metrics"
        );
        Ok(environment)
    }

    /// Resolve the IAP's activities and their providers, in stored order.
    async fn resolve_activities(
        &self,
        iap_id: &str,
    ) -> Result<Vec<(Activity, ActivityProvider)>> {
        let iap = self
            .iaps
            .iap(iap_id)
            .await?
            .ok_or_else(|| CoreError::not_found("iap", iap_id))?;

        let mut resolved = Vec::with_capacity(iap.activity_ids.len());
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

            resolved.push((activity, provider));
        }

        Ok(resolved)
    }
}
