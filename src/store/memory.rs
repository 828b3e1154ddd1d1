//! In-memory store.
//!
//! Backs every persistence trait with `RwLock`-guarded tables. Used by
//! the test suite and by embedders that do not need durability.

use crate::errors::{CoreError, Result};
use crate::models::{Activity, ActivityProvider, Iap, Objective, Student};
use crate::store::{
    ActivityStore, IapStore, NewActivity, NewIap, NewObjective, NewProvider, ObjectiveStore,
    ProviderStore, StudentDirectory,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory implementation of all store traits.
#[derive(Default)]
pub struct MemoryStore {
    providers: RwLock<HashMap<String, ActivityProvider>>,
    activities: RwLock<HashMap<String, Activity>>,
    iaps: RwLock<HashMap<String, Iap>>,
    objectives: RwLock<HashMap<String, Objective>>,
    students: RwLock<HashMap<String, Student>>,
}

impl MemoryStore {
    /// Create an empty store behind an `Arc`, ready to be shared across
    /// the services that consume its traits.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn mint_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn insert_provider(&self, draft: NewProvider) -> Result<ActivityProvider> {
        let now = Utc::now();
        let provider = ActivityProvider {
            id: mint_id(),
            name: draft.name,
            url: draft.url,
            created_at: now,
            updated_at: now,
        };

        self.providers
            .write()
            .await
            .insert(provider.id.clone(), provider.clone());
        Ok(provider)
    }

    async fn provider(&self, id: &str) -> Result<Option<ActivityProvider>> {
        Ok(self.providers.read().await.get(id).cloned())
    }

    async fn list_providers(&self) -> Result<Vec<ActivityProvider>> {
        Ok(self.providers.read().await.values().cloned().collect())
    }

    async fn update_provider(&self, id: &str, draft: NewProvider) -> Result<ActivityProvider> {
        let mut providers = self.providers.write().await;
        let provider = providers
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("activity provider", id))?;

        provider.name = draft.name;
        provider.url = draft.url;
        provider.updated_at = Utc::now();
        Ok(provider.clone())
    }

    async fn delete_provider(&self, id: &str) -> Result<()> {
        self.providers
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("activity provider", id))
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn insert_activity(&self, draft: NewActivity) -> Result<Activity> {
        let now = Utc::now();
        let activity = Activity {
            id: mint_id(),
            name: draft.name,
            activity_provider_id: draft.activity_provider_id,
            parameters: draft.parameters,
            created_at: now,
            updated_at: now,
        };

        self.activities
            .write()
            .await
            .insert(activity.id.clone(), activity.clone());
        Ok(activity)
    }

    async fn activity(&self, id: &str) -> Result<Option<Activity>> {
        Ok(self.activities.read().await.get(id).cloned())
    }

    async fn list_activities(&self) -> Result<Vec<Activity>> {
        Ok(self.activities.read().await.values().cloned().collect())
    }

    async fn update_activity_parameters(
        &self,
        id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<Activity> {
        let mut activities = self.activities.write().await;
        let activity = activities
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("activity", id))?;

        activity.parameters = parameters;
        activity.updated_at = Utc::now();
        Ok(activity.clone())
    }

    async fn delete_activity(&self, id: &str) -> Result<()> {
        self.activities
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("activity", id))
    }

    async fn count_for_provider(&self, provider_id: &str) -> Result<usize> {
        Ok(self
            .activities
            .read()
            .await
            .values()
            .filter(|a| a.activity_provider_id == provider_id)
            .count())
    }
}

#[async_trait]
impl IapStore for MemoryStore {
    async fn insert_iap(&self, draft: NewIap) -> Result<Iap> {
        let now = Utc::now();
        let iap = Iap {
            id: mint_id(),
            name: draft.name,
            description: draft.description,
            activity_ids: Vec::new(),
            is_deployed: false,
            deploy_urls: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };

        self.iaps.write().await.insert(iap.id.clone(), iap.clone());
        Ok(iap)
    }

    async fn iap(&self, id: &str) -> Result<Option<Iap>> {
        Ok(self.iaps.read().await.get(id).cloned())
    }

    async fn list_iaps(&self) -> Result<Vec<Iap>> {
        Ok(self.iaps.read().await.values().cloned().collect())
    }

    async fn add_activity(&self, iap_id: &str, activity_id: &str) -> Result<Iap> {
        let mut iaps = self.iaps.write().await;
        let iap = iaps
            .get_mut(iap_id)
            .ok_or_else(|| CoreError::not_found("iap", iap_id))?;

        iap.activity_ids.push(activity_id.to_string());
        iap.updated_at = Utc::now();
        Ok(iap.clone())
    }

    async fn remove_activity(&self, iap_id: &str, activity_id: &str) -> Result<Iap> {
        let mut iaps = self.iaps.write().await;
        let iap = iaps
            .get_mut(iap_id)
            .ok_or_else(|| CoreError::not_found("iap", iap_id))?;

        iap.activity_ids.retain(|id| id != activity_id);
        iap.deploy_urls.remove(activity_id);
        iap.updated_at = Utc::now();
        Ok(iap.clone())
    }

    async fn commit_deployment(
        &self,
        iap_id: &str,
        deploy_urls: BTreeMap<String, String>,
    ) -> Result<Iap> {
        let mut iaps = self.iaps.write().await;
        let iap = iaps
            .get_mut(iap_id)
            .ok_or_else(|| CoreError::not_found("iap", iap_id))?;

        iap.deploy_urls = deploy_urls;
        iap.is_deployed = true;
        iap.updated_at = Utc::now();
        Ok(iap.clone())
    }

    async fn delete_iap(&self, id: &str) -> Result<()> {
        self.iaps
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("iap", id))
    }

    async fn any_iap_references(&self, activity_id: &str) -> Result<bool> {
        Ok(self
            .iaps
            .read()
            .await
            .values()
            .any(|iap| iap.activity_ids.iter().any(|id| id == activity_id)))
    }
}

#[async_trait]
impl ObjectiveStore for MemoryStore {
    async fn insert_objective(&self, draft: NewObjective) -> Result<Objective> {
        let now = Utc::now();
        let objective = Objective {
            id: mint_id(),
            name: draft.name,
            iap_id: draft.iap_id,
            formula: draft.formula,
            target_value: draft.target_value,
            value: draft.value,
            created_at: now,
            updated_at: now,
        };

        self.objectives
            .write()
            .await
            .insert(objective.id.clone(), objective.clone());
        Ok(objective)
    }

    async fn objective(&self, id: &str) -> Result<Option<Objective>> {
        Ok(self.objectives.read().await.get(id).cloned())
    }

    async fn list_objectives(&self) -> Result<Vec<Objective>> {
        Ok(self.objectives.read().await.values().cloned().collect())
    }

    async fn list_for_iap(&self, iap_id: &str) -> Result<Vec<Objective>> {
        Ok(self
            .objectives
            .read()
            .await
            .values()
            .filter(|o| o.iap_id == iap_id)
            .cloned()
            .collect())
    }

    async fn update_objective(&self, id: &str, name: &str, formula: &str) -> Result<Objective> {
        let mut objectives = self.objectives.write().await;
        let objective = objectives
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("objective", id))?;

        objective.name = name.to_string();
        objective.formula = formula.to_string();
        objective.updated_at = Utc::now();
        Ok(objective.clone())
    }

    async fn set_objective_value(&self, id: &str, value: f64) -> Result<Objective> {
        let mut objectives = self.objectives.write().await;
        let objective = objectives
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("objective", id))?;

        objective.value = value;
        objective.updated_at = Utc::now();
        Ok(objective.clone())
    }

    async fn delete_objective(&self, id: &str) -> Result<()> {
        self.objectives
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("objective", id))
    }
}

#[async_trait]
impl StudentDirectory for MemoryStore {
    async fn ensure_student(&self, lms_student_id: &str) -> Result<Student> {
        let mut students = self.students.write().await;

        if let Some(existing) = students
            .values()
            .find(|s| s.lms_student_id == lms_student_id)
        {
            return Ok(existing.clone());
        }

        let student = Student {
            id: mint_id(),
            lms_student_id: lms_student_id.to_string(),
            created_at: Utc::now(),
        };

        students.insert(student.id.clone(), student.clone());
        Ok(student)
    }

    async fn student(&self, platform_id: &str) -> Result<Option<Student>> {
        Ok(self.students.read().await.get(platform_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_find_provider() {
        let store = MemoryStore::default();

        let provider = store
            .insert_provider(NewProvider {
                name: "Quiz AP".to_string(),
                url: "https://quiz.example.com".to_string(),
            })
            .await
            .unwrap();

        let found = store.provider(&provider.id).await.unwrap();
        assert_eq!(found.unwrap().name, "Quiz AP");
    }

    #[tokio::test]
    async fn test_update_missing_provider_is_not_found() {
        let store = MemoryStore::default();

        let err = store
            .update_provider(
                "nope",
                NewProvider {
                    name: "x".to_string(),
                    url: "https://x".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_iap_membership_keeps_order() {
        let store = MemoryStore::default();
        let iap = store
            .insert_iap(NewIap {
                name: "Plan".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();

        store.add_activity(&iap.id, "a1").await.unwrap();
        store.add_activity(&iap.id, "a2").await.unwrap();
        let updated = store.add_activity(&iap.id, "a3").await.unwrap();

        assert_eq!(updated.activity_ids, vec!["a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn test_remove_activity_drops_deploy_url() {
        let store = MemoryStore::default();
        let iap = store
            .insert_iap(NewIap {
                name: "Plan".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();

        store.add_activity(&iap.id, "a1").await.unwrap();
        store.add_activity(&iap.id, "a2").await.unwrap();

        let mut urls = BTreeMap::new();
        urls.insert("a1".to_string(), "https://p/a1".to_string());
        urls.insert("a2".to_string(), "https://p/a2".to_string());
        store.commit_deployment(&iap.id, urls).await.unwrap();

        let updated = store.remove_activity(&iap.id, "a1").await.unwrap();
        assert!(!updated.deploy_urls.contains_key("a1"));
        assert!(updated.deployment_consistent());
    }

    #[tokio::test]
    async fn test_commit_deployment_sets_flag_and_urls_together() {
        let store = MemoryStore::default();
        let iap = store
            .insert_iap(NewIap {
                name: "Plan".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        store.add_activity(&iap.id, "a1").await.unwrap();

        let mut urls = BTreeMap::new();
        urls.insert("a1".to_string(), "https://p/a1".to_string());
        let committed = store.commit_deployment(&iap.id, urls).await.unwrap();

        assert!(committed.is_deployed);
        assert_eq!(committed.deploy_urls.len(), 1);
        assert!(committed.deployment_consistent());
    }

    #[tokio::test]
    async fn test_ensure_student_is_idempotent() {
        let store = MemoryStore::default();

        let first = store.ensure_student("lms-42").await.unwrap();
        let second = store.ensure_student("lms-42").await.unwrap();

        assert_eq!(first.id, second.id);
        let found = store.student(&first.id).await.unwrap();
        assert_eq!(found.unwrap().lms_student_id, "lms-42");
    }
}
