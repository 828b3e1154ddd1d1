//! Wire types for the Activity Provider protocol.
//!
//! These structs mirror the fixed schemas every provider must implement.
//! Analytics bodies are validated strictly: unknown fields and empty
//! names are rejected, so a malformed provider fails loudly at the
//! boundary instead of corrupting the metric environment downstream.

use crate::errors::{CoreError, Result};
use crate::models::MetricValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One configuration parameter a provider declares.
///
/// Parameter discovery is tolerant of extra fields; only the name is
/// contractual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name the activity's configuration must supply.
    pub name: String,
}

/// A metric a provider declares in its analytics contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSpec {
    /// Raw metric name, unique within the provider.
    pub name: String,
    /// Provider-declared value type (informational, e.g. "number").
    #[serde(rename = "type")]
    pub kind: String,
}

/// The declared analytics contract of a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsContract {
    /// Qualitative metrics (free-form values).
    #[serde(rename = "qualAnalytics")]
    pub qual_analytics: Vec<MetricSpec>,
    /// Quantitative metrics (numeric values, usable in formulas).
    #[serde(rename = "quantAnalytics")]
    pub quant_analytics: Vec<MetricSpec>,
}

impl AnalyticsContract {
    /// Reject specs with empty names or types.
    pub fn validate(&self) -> Result<()> {
        for spec in self.qual_analytics.iter().chain(&self.quant_analytics) {
            if spec.name.is_empty() || spec.kind.is_empty() {
                return Err(CoreError::Validation(
                    "analytics contract declares a metric with an empty name or type".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// All declared metric names, qualitative first.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.qual_analytics
            .iter()
            .chain(&self.quant_analytics)
            .map(|spec| spec.name.as_str())
    }
}

/// One reported metric value in an analytics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSample {
    /// Raw metric name, matching the contract.
    pub name: String,
    /// Provider-declared value type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Reported value.
    pub value: MetricValue,
}

/// Per-student analytics returned by a provider for one activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsRow {
    /// Opaque platform student id the values belong to.
    #[serde(rename = "inveniraStdID")]
    pub student_id: String,
    #[serde(rename = "qualAnalytics")]
    pub qual_analytics: Vec<MetricSample>,
    #[serde(rename = "quantAnalytics")]
    pub quant_analytics: Vec<MetricSample>,
}

impl AnalyticsRow {
    /// Reject rows with an empty student id or empty metric names.
    pub fn validate(&self) -> Result<()> {
        if self.student_id.is_empty() {
            return Err(CoreError::Validation(
                "analytics row has an empty student id".to_string(),
            ));
        }

        for sample in self.qual_analytics.iter().chain(&self.quant_analytics) {
            if sample.name.is_empty() {
                return Err(CoreError::Validation(format!(
                    "analytics row for student {} has a metric with an empty name",
                    self.student_id
                )));
            }
        }
        Ok(())
    }

    /// All reported samples, qualitative first.
    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.qual_analytics.iter().chain(&self.quant_analytics)
    }
}

/// Body of a deploy or student-launch response.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployResponse {
    /// URL of the deployed activity instance.
    #[serde(rename = "deployURL")]
    pub deploy_url: String,
}

/// Body POSTed to the analytics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsRequest {
    #[serde(rename = "activityID")]
    pub activity_id: String,
}

/// Body POSTed to an activity's entry URL to launch a student.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchRequest {
    #[serde(rename = "activityID")]
    pub activity_id: String,
    /// The platform's opaque student id; LMS ids never cross this boundary.
    #[serde(rename = "platformStudentId")]
    pub platform_student_id: String,
    /// The activity's configured parameters.
    #[serde(rename = "json_params")]
    pub json_params: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_parses_wire_names() {
        let body = r#"{
            "qualAnalytics": [{"name": "engagement", "type": "text"}],
            "quantAnalytics": [{"name": "score", "type": "number"}]
        }"#;

        let contract: AnalyticsContract = serde_json::from_str(body).unwrap();
        assert!(contract.validate().is_ok());
        assert_eq!(
            contract.metric_names().collect::<Vec<_>>(),
            vec!["engagement", "score"]
        );
    }

    #[test]
    fn test_contract_rejects_unknown_fields() {
        let body = r#"{
            "qualAnalytics": [],
            "quantAnalytics": [],
            "extra": true
        }"#;

        assert!(serde_json::from_str::<AnalyticsContract>(body).is_err());
    }

    #[test]
    fn test_contract_rejects_empty_metric_name() {
        let contract = AnalyticsContract {
            qual_analytics: vec![],
            quant_analytics: vec![MetricSpec {
                name: String::new(),
                kind: "number".to_string(),
            }],
        };

        assert!(contract.validate().is_err());
    }

    #[test]
    fn test_analytics_row_parses_mixed_values() {
        let body = r#"{
            "inveniraStdID": "std-1",
            "qualAnalytics": [{"name": "mood", "type": "text", "value": "focused"}],
            "quantAnalytics": [{"name": "score", "type": "number", "value": 8.5}]
        }"#;

        let row: AnalyticsRow = serde_json::from_str(body).unwrap();
        assert!(row.validate().is_ok());
        assert_eq!(row.student_id, "std-1");
        assert_eq!(
            row.quant_analytics[0].value,
            crate::models::MetricValue::Number(8.5)
        );
    }

    #[test]
    fn test_analytics_row_rejects_empty_student_id() {
        let row = AnalyticsRow {
            student_id: String::new(),
            qual_analytics: vec![],
            quant_analytics: vec![],
        };

        assert!(row.validate().is_err());
    }

    #[test]
    fn test_launch_request_wire_shape() {
        let request = LaunchRequest {
            activity_id: "act-1".to_string(),
            platform_student_id: "std-1".to_string(),
            json_params: HashMap::new(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["activityID"], "act-1");
        assert_eq!(json["platformStudentId"], "std-1");
        assert!(json["json_params"].is_object());
    }
}
