//! Narrow persistence interfaces consumed by the platform core.
//!
//! The core does not own a storage engine; it sees persistence only
//! through these traits. Ids and timestamps are minted by the store.
//! [`memory::MemoryStore`] implements all of them for tests and for
//! embedding; production backends live outside this crate.

pub mod memory;

use crate::errors::Result;
use crate::models::{Activity, ActivityProvider, Iap, Objective, Student};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub use memory::MemoryStore;

/// Fields of a provider to be registered.
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub name: String,
    /// Base URL, already normalized to no trailing slash.
    pub url: String,
}

/// Fields of an activity to be created.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub name: String,
    pub activity_provider_id: String,
    pub parameters: HashMap<String, Value>,
}

/// Fields of an IAP to be created.
#[derive(Debug, Clone)]
pub struct NewIap {
    pub name: String,
    pub description: String,
}

/// Fields of an objective to be created.
#[derive(Debug, Clone)]
pub struct NewObjective {
    pub name: String,
    pub iap_id: String,
    pub formula: String,
    pub target_value: f64,
    /// Initial aggregate value (the zero-environment dry run result).
    pub value: f64,
}

/// Persistence for Activity Providers.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn insert_provider(&self, draft: NewProvider) -> Result<ActivityProvider>;
    async fn provider(&self, id: &str) -> Result<Option<ActivityProvider>>;
    async fn list_providers(&self) -> Result<Vec<ActivityProvider>>;
    /// Replace name and URL. Fails with `NotFound` on an unknown id.
    async fn update_provider(&self, id: &str, draft: NewProvider) -> Result<ActivityProvider>;
    async fn delete_provider(&self, id: &str) -> Result<()>;
}

/// Persistence for Activities.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn insert_activity(&self, draft: NewActivity) -> Result<Activity>;
    async fn activity(&self, id: &str) -> Result<Option<Activity>>;
    async fn list_activities(&self) -> Result<Vec<Activity>>;
    /// Replace the configured parameter map.
    async fn update_activity_parameters(
        &self,
        id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<Activity>;
    async fn delete_activity(&self, id: &str) -> Result<()>;
    /// Number of activities configured against a provider.
    async fn count_for_provider(&self, provider_id: &str) -> Result<usize>;
}

/// Persistence for IAPs.
///
/// `commit_deployment` is the single write that flips an IAP to deployed:
/// the full URL map and the flag change together or not at all. That is
/// the transaction boundary the orchestrator relies on.
#[async_trait]
pub trait IapStore: Send + Sync {
    async fn insert_iap(&self, draft: NewIap) -> Result<Iap>;
    async fn iap(&self, id: &str) -> Result<Option<Iap>>;
    async fn list_iaps(&self) -> Result<Vec<Iap>>;
    /// Append an activity id to the IAP's ordered list.
    async fn add_activity(&self, iap_id: &str, activity_id: &str) -> Result<Iap>;
    /// Remove an activity id, dropping its deploy URL entry if present.
    async fn remove_activity(&self, iap_id: &str, activity_id: &str) -> Result<Iap>;
    /// Atomically persist the deploy URL map and set `is_deployed`.
    async fn commit_deployment(
        &self,
        iap_id: &str,
        deploy_urls: BTreeMap<String, String>,
    ) -> Result<Iap>;
    async fn delete_iap(&self, id: &str) -> Result<()>;
    /// Whether any IAP lists the given activity.
    async fn any_iap_references(&self, activity_id: &str) -> Result<bool>;
}

/// Persistence for Objectives.
#[async_trait]
pub trait ObjectiveStore: Send + Sync {
    async fn insert_objective(&self, draft: NewObjective) -> Result<Objective>;
    async fn objective(&self, id: &str) -> Result<Option<Objective>>;
    async fn list_objectives(&self) -> Result<Vec<Objective>>;
    async fn list_for_iap(&self, iap_id: &str) -> Result<Vec<Objective>>;
    /// Replace name and formula (already validated by the caller).
    async fn update_objective(&self, id: &str, name: &str, formula: &str) -> Result<Objective>;
    /// Persist a freshly computed aggregate value.
    async fn set_objective_value(&self, id: &str, value: f64) -> Result<Objective>;
    async fn delete_objective(&self, id: &str) -> Result<()>;
}

/// The platform's student identity mapping.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Resolve or create the platform identity for an LMS student id.
    /// Idempotent: the same LMS id always maps to the same platform id.
    async fn ensure_student(&self, lms_student_id: &str) -> Result<Student>;
    /// Look up a student by platform id.
    async fn student(&self, platform_id: &str) -> Result<Option<Student>>;
}
