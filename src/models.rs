//! Data model for the platform core.
//!
//! This module contains the persisted documents (providers, activities,
//! IAPs, objectives, students) and the derived per-student metric
//! environment. Documents are plain serde structs; id minting and
//! timestamp stamping are the store's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A registered Activity Provider: an external HTTP service implementing
/// the fixed provider protocol.
///
/// The base URL is stored with no trailing slash. A provider is immutable
/// once an activity references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityProvider {
    /// Document id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Base URL of the provider service (no trailing slash).
    pub url: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A single external learning-tool instance, configured against one
/// Activity Provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Document id.
    pub id: String,
    /// Display name; also the source of the metric namespace prefix.
    pub name: String,
    /// Id of the provider backing this activity.
    pub activity_provider_id: String,
    /// Configured parameter values, keyed by the parameter names the
    /// provider declares.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// An Inventive Activity Plan: an ordered bundle of activities delivered
/// to students as one learning experience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iap {
    /// Document id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Ordered activity ids; deployment follows this order.
    pub activity_ids: Vec<String>,
    /// True only once every activity id has a deploy URL.
    pub is_deployed: bool,
    /// Platform launch URL per activity id.
    pub deploy_urls: BTreeMap<String, String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Iap {
    /// Check the deployment invariant: `deploy_urls` keys are a subset of
    /// `activity_ids`, and `is_deployed` implies full coverage.
    pub fn deployment_consistent(&self) -> bool {
        let keys_subset = self
            .deploy_urls
            .keys()
            .all(|id| self.activity_ids.contains(id));

        let fully_covered = self
            .activity_ids
            .iter()
            .all(|id| self.deploy_urls.contains_key(id));

        keys_subset && (!self.is_deployed || fully_covered)
    }
}

/// A pedagogical goal expressed as a formula over namespaced activity
/// metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    /// Document id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Id of the owning IAP.
    pub iap_id: String,
    /// Arithmetic expression over namespaced metric names.
    pub formula: String,
    /// Target value the instructor aims for.
    pub target_value: f64,
    /// Last computed aggregate value (mean over covered students).
    pub value: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// The platform-side identity of a student, mapping the opaque platform
/// id to the LMS-supplied student id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    /// Opaque platform id; the only id ever sent to providers.
    pub id: String,
    /// Student id as known by the LMS that launched the activity.
    pub lms_student_id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A metric value reported by a provider: quantitative metrics are
/// numbers, qualitative metrics arbitrary JSON-representable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Quantitative value; the only kind formulas can consume.
    Number(f64),
    /// Qualitative value, carried through for dashboards.
    Text(String),
}

impl MetricValue {
    /// Numeric view of this value, if it is quantitative.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }
}

/// Namespaced metric name → value, for one student.
pub type StudentMetrics = BTreeMap<String, MetricValue>;

/// Platform student id → that student's metrics, for one IAP.
///
/// Derived on demand from the providers feeding the IAP's activities and
/// never persisted, so reads always reflect provider-side data.
pub type MetricEnvironment = BTreeMap<String, StudentMetrics>;
