//! Activity Provider protocol client.
//!
//! Every provider is an arbitrary, independently operated HTTP service
//! implementing the same fixed contract, so there is exactly one client:
//! [`HttpProviderClient`]. The [`ProviderClient`] trait is the seam the
//! orchestration layers depend on; tests substitute a scripted
//! implementation.
//!
//! Calls are single best-effort attempts. There is no retry, circuit
//! breaker, or per-call timeout beyond the globally configured client
//! timeout and redirect limit.

use crate::config::{HttpSettings, ProviderPaths};
use crate::errors::{CoreError, Result};
use crate::provider::contract::{
    AnalyticsContract, AnalyticsRequest, AnalyticsRow, DeployResponse, LaunchRequest,
    ParameterDescriptor,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// The fixed set of operations the platform performs against providers.
///
/// Base URLs are expected to carry no trailing slash; the registration
/// path normalizes them before they are ever stored.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Discover the configuration parameter names an activity must supply.
    async fn parameters(&self, base_url: &str) -> Result<Vec<String>>;

    /// URL of the provider's configuration interface page.
    ///
    /// Pure composition, no network call; the page itself is fetched
    /// client-side in an iframe.
    fn config_interface_url(&self, base_url: &str) -> String;

    /// Deploy one activity on its provider, returning the external
    /// deploy URL the provider created for it.
    async fn deploy(&self, base_url: &str, activity_id: &str) -> Result<String>;

    /// Fetch the provider's declared analytics contract.
    async fn analytics_contract(&self, base_url: &str) -> Result<AnalyticsContract>;

    /// Fetch per-student analytics for one activity.
    async fn analytics(&self, base_url: &str, activity_id: &str) -> Result<Vec<AnalyticsRow>>;

    /// Launch a student into a deployed activity by POSTing the
    /// activity's own entry URL. Returns the redirect target.
    async fn launch_student(
        &self,
        entry_url: &str,
        activity_id: &str,
        platform_student_id: &str,
        params: &HashMap<String, Value>,
    ) -> Result<String>;
}

/// The single networked [`ProviderClient`] implementation.
pub struct HttpProviderClient {
    http_client: reqwest::Client,
    paths: ProviderPaths,
}

impl HttpProviderClient {
    /// Build a client from configuration.
    ///
    /// Paths are normalized here, once: exactly one leading slash, no
    /// trailing slash. Per-call code only ever concatenates.
    pub fn new(paths: ProviderPaths, http: HttpSettings) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(http.max_redirects))
            .build()
            .expect("Failed to create HTTP client");

        let paths = ProviderPaths {
            config_params: normalize_path(&paths.config_params),
            config_interface: normalize_path(&paths.config_interface),
            deploy: normalize_path(&paths.deploy),
            analytics_contract: normalize_path(&paths.analytics_contract),
            analytics: normalize_path(&paths.analytics),
        };

        Self { http_client, paths }
    }

    /// Build a client with the documented default paths and settings.
    pub fn with_defaults() -> Self {
        Self::new(ProviderPaths::default(), HttpSettings::default())
    }

    /// Send a request and return the response body on 2xx.
    async fn fetch(&self, request: reqwest::RequestBuilder, url: &str) -> Result<String> {
        debug!(url = %url, "provider request");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::Provider(format!("request to {} timed out", url))
            } else if e.is_connect() {
                CoreError::Provider(format!("cannot connect to provider at {}", url))
            } else {
                CoreError::Provider(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Provider(format!(
                "provider returned {} for {}: {}",
                status, url, body
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CoreError::Provider(format!("failed to read body from {}: {}", url, e)))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn parameters(&self, base_url: &str) -> Result<Vec<String>> {
        let url = format!("{}{}", base_url, self.paths.config_params);
        let body = self.fetch(self.http_client.get(&url), &url).await?;

        let descriptors: Vec<ParameterDescriptor> = serde_json::from_str(&body)
            .map_err(|e| CoreError::Provider(format!("malformed parameter list from {}: {}", url, e)))?;

        Ok(descriptors.into_iter().map(|d| d.name).collect())
    }

    fn config_interface_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.paths.config_interface)
    }

    async fn deploy(&self, base_url: &str, activity_id: &str) -> Result<String> {
        let url = format!("{}{}/{}", base_url, self.paths.deploy, activity_id);
        let body = self.fetch(self.http_client.get(&url), &url).await?;

        let response: DeployResponse = serde_json::from_str(&body).map_err(|e| {
            CoreError::Provider(format!("deploy response from {} has no deployURL: {}", url, e))
        })?;

        Ok(response.deploy_url)
    }

    async fn analytics_contract(&self, base_url: &str) -> Result<AnalyticsContract> {
        let url = format!("{}{}", base_url, self.paths.analytics_contract);
        let body = self.fetch(self.http_client.get(&url), &url).await?;

        let contract: AnalyticsContract = serde_json::from_str(&body).map_err(|e| {
            CoreError::Validation(format!("analytics contract from {} fails schema: {}", url, e))
        })?;

        contract.validate()?;
        Ok(contract)
    }

    async fn analytics(&self, base_url: &str, activity_id: &str) -> Result<Vec<AnalyticsRow>> {
        let url = format!("{}{}", base_url, self.paths.analytics);
        let request = self.http_client.post(&url).json(&AnalyticsRequest {
            activity_id: activity_id.to_string(),
        });

        let body = self.fetch(request, &url).await?;

        let rows: Vec<AnalyticsRow> = serde_json::from_str(&body).map_err(|e| {
            CoreError::Validation(format!("analytics from {} fail schema: {}", url, e))
        })?;

        for row in &rows {
            row.validate()?;
        }

        Ok(rows)
    }

    async fn launch_student(
        &self,
        entry_url: &str,
        activity_id: &str,
        platform_student_id: &str,
        params: &HashMap<String, Value>,
    ) -> Result<String> {
        let request = self.http_client.post(entry_url).json(&LaunchRequest {
            activity_id: activity_id.to_string(),
            platform_student_id: platform_student_id.to_string(),
            json_params: params.clone(),
        });

        let body = self.fetch(request, entry_url).await?;

        let response: DeployResponse = serde_json::from_str(&body).map_err(|e| {
            CoreError::Provider(format!(
                "launch response from {} has no deployURL: {}",
                entry_url, e
            ))
        })?;

        Ok(response.deploy_url)
    }
}

/// Normalize a configured path to exactly one leading slash and no
/// trailing slash.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    format!("/{}", trimmed)
}
