//! Activity and Activity Provider operations.
//!
//! Everything here that writes to the store first validates against the
//! live provider: registration probes parameter discovery, activity
//! writes check parameter completeness. Deletion is guarded by the
//! references other documents hold.

use crate::errors::{CoreError, Result};
use crate::launch;
use crate::models::{Activity, ActivityProvider};
use crate::provider::ProviderClient;
use crate::store::{ActivityStore, IapStore, NewActivity, NewProvider, ProviderStore, StudentDirectory};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Operations over activities, their providers, and student launches.
pub struct ActivityService<C: ProviderClient> {
    providers: Arc<dyn ProviderStore>,
    activities: Arc<dyn ActivityStore>,
    iaps: Arc<dyn IapStore>,
    students: Arc<dyn StudentDirectory>,
    client: Arc<C>,
}

impl<C: ProviderClient> ActivityService<C> {
    pub fn new(
        providers: Arc<dyn ProviderStore>,
        activities: Arc<dyn ActivityStore>,
        iaps: Arc<dyn IapStore>,
        students: Arc<dyn StudentDirectory>,
        client: Arc<C>,
    ) -> Self {
        Self {
            providers,
            activities,
            iaps,
            students,
            client,
        }
    }

    /// Register a provider after probing its parameter endpoint.
    ///
    /// The base URL is normalized (no trailing slash) before it is
    /// stored; every later call concatenates paths onto it verbatim.
    pub async fn register_provider(&self, name: &str, url: &str) -> Result<ActivityProvider> {
        let url = normalize_base_url(url);
        self.client.parameters(&url).await?;

        let provider = self
            .providers
            .insert_provider(NewProvider {
                name: name.to_string(),
                url: url.clone(),
            })
            .await?;

        info!(provider_id = %provider.id, url = %url, "activity provider registered");
        Ok(provider)
    }

    /// Update a provider's name and base URL.
    ///
    /// Providers are immutable once an activity references them.
    pub async fn update_provider(
        &self,
        id: &str,
        name: &str,
        url: &str,
    ) -> Result<ActivityProvider> {
        if self.activities.count_for_provider(id).await? > 0 {
            return Err(CoreError::Conflict(format!(
                "activity provider {} is referenced by activities and cannot be changed",
                id
            )));
        }

        let url = normalize_base_url(url);
        self.client.parameters(&url).await?;

        self.providers
            .update_provider(
                id,
                NewProvider {
                    name: name.to_string(),
                    url,
                },
            )
            .await
    }

    /// Delete a provider with no remaining activities.
    pub async fn delete_provider(&self, id: &str) -> Result<()> {
        if self.activities.count_for_provider(id).await? > 0 {
            return Err(CoreError::Conflict(format!(
                "activities exist for activity provider {}",
                id
            )));
        }

        self.providers.delete_provider(id).await
    }

    /// The URL the instructor-facing UI embeds to configure an activity.
    pub async fn config_interface_url(&self, provider_id: &str) -> Result<String> {
        let provider = self.require_provider(provider_id).await?;
        Ok(self.client.config_interface_url(&provider.url))
    }

    /// Parameter names the provider declares, fetched live.
    pub async fn provider_parameters(&self, provider_id: &str) -> Result<Vec<String>> {
        let provider = self.require_provider(provider_id).await?;
        self.client.parameters(&provider.url).await
    }

    /// Create an activity once its configured parameters cover every
    /// name the provider declares.
    pub async fn create_activity(&self, draft: NewActivity) -> Result<Activity> {
        let provider = self.require_provider(&draft.activity_provider_id).await?;
        let declared = self.client.parameters(&provider.url).await?;
        require_complete_parameters(&declared, &draft.parameters)?;

        self.activities.insert_activity(draft).await
    }

    /// Replace an activity's configured parameters, re-checking
    /// completeness against the provider.
    pub async fn update_activity_parameters(
        &self,
        id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<Activity> {
        let activity = self
            .activities
            .activity(id)
            .await?
            .ok_or_else(|| CoreError::not_found("activity", id))?;

        let provider = self.require_provider(&activity.activity_provider_id).await?;
        let declared = self.client.parameters(&provider.url).await?;
        require_complete_parameters(&declared, &parameters)?;

        self.activities.update_activity_parameters(id, parameters).await
    }

    /// Delete an activity no IAP references.
    pub async fn delete_activity(&self, id: &str) -> Result<()> {
        if self.iaps.any_iap_references(id).await? {
            return Err(CoreError::Conflict(format!(
                "activity {} is in use by an IAP",
                id
            )));
        }

        self.activities.delete_activity(id).await
    }

    /// Launch a student into a deployed activity.
    ///
    /// `data` is the opaque payload from the platform launch URL. The
    /// LMS student id is resolved to (or minted as) an opaque platform
    /// identity; providers never see LMS ids.
    pub async fn launch_student(
        &self,
        activity_id: &str,
        lms_student_id: &str,
        data: &str,
    ) -> Result<String> {
        if activity_id.is_empty() || lms_student_id.is_empty() || data.is_empty() {
            return Err(CoreError::Validation(
                "activity id, student id and launch payload are all required".to_string(),
            ));
        }

        let payload = launch::decode_payload(data)?;

        let activity = self
            .activities
            .activity(activity_id)
            .await?
            .ok_or_else(|| CoreError::not_found("activity", activity_id))?;

        let student = self.students.ensure_student(lms_student_id).await?;

        let redirect = self
            .client
            .launch_student(
                &payload.activity_url,
                &activity.id,
                &student.id,
                &activity.parameters,
            )
            .await;

        if redirect.is_err() {
            warn!(
                activity_id = %activity_id,
                student_id = %student.id,
                "student launch against provider failed"
            );
        }

        redirect
    }

    async fn require_provider(&self, id: &str) -> Result<ActivityProvider> {
        self.providers
            .provider(id)
            .await?
            .ok_or_else(|| CoreError::not_found("activity provider", id))
    }
}

/// Strip trailing slashes from a provider base URL.
fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Every declared parameter name must be configured.
fn require_complete_parameters(
    declared: &[String],
    configured: &HashMap<String, Value>,
) -> Result<()> {
    let missing: Vec<&str> = declared
        .iter()
        .filter(|name| !configured.contains_key(*name))
        .map(|name| name.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "missing parameters: {}",
            missing.join(", ")
        )))
    }
}
