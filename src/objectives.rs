//! Objectives: formulas over aggregated activity metrics.
//!
//! An objective's formula is validated against the IAP's metric
//! vocabulary when it is written, and evaluated per student against the
//! live metric environment when it is read. The persisted aggregate is
//! the arithmetic mean over students whose metrics cover every variable
//! the formula references; partially covered students are excluded, not
//! zero-filled.

use crate::analytics::MetricsAggregator;
use crate::errors::{CoreError, Result};
use crate::formula::Formula;
use crate::models::{MetricEnvironment, Objective};
use crate::provider::ProviderClient;
use crate::store::{IapStore, NewObjective, ObjectiveStore, StudentDirectory};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One student's evaluated objective value, for dashboards.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentObjectiveValue {
    /// Opaque platform student id.
    pub platform_student_id: String,
    /// The LMS-side id from the student directory.
    pub lms_student_id: String,
    /// The formula's value for this student.
    pub value: f64,
}

/// Operations over objectives and their evaluation.
pub struct ObjectiveService<C: ProviderClient> {
    objectives: Arc<dyn ObjectiveStore>,
    iaps: Arc<dyn IapStore>,
    students: Arc<dyn StudentDirectory>,
    aggregator: MetricsAggregator<C>,
}

impl<C: ProviderClient> ObjectiveService<C> {
    pub fn new(
        objectives: Arc<dyn ObjectiveStore>,
        iaps: Arc<dyn IapStore>,
        students: Arc<dyn StudentDirectory>,
        aggregator: MetricsAggregator<C>,
    ) -> Self {
        Self {
            objectives,
            iaps,
            students,
            aggregator,
        }
    }

    /// Create an objective after validating its formula.
    ///
    /// The formula must parse, and every variable it references must be
    /// in the IAP's declared metric vocabulary. A dry run against an
    /// all-zero environment confirms it evaluates; a formula that only
    /// fails arithmetically on zeros (a division) is still accepted,
    /// with a zero placeholder aggregate.
    pub async fn create(
        &self,
        name: &str,
        iap_id: &str,
        formula_text: &str,
        target_value: f64,
    ) -> Result<Objective> {
        self.iaps
            .iap(iap_id)
            .await?
            .ok_or_else(|| CoreError::not_found("iap", iap_id))?;

        let formula = self.validate_formula(iap_id, formula_text).await?;

        let placeholder = match formula.evaluate_with_zeros() {
            Ok(value) => value,
            Err(CoreError::Formula(_)) => 0.0,
            Err(other) => return Err(other),
        };

        let objective = self
            .objectives
            .insert_objective(NewObjective {
                name: name.to_string(),
                iap_id: iap_id.to_string(),
                formula: formula_text.to_string(),
                target_value,
                value: placeholder,
            })
            .await?;

        info!(objective_id = %objective.id, iap_id = %iap_id, "objective created");
        Ok(objective)
    }

    /// Replace an objective's name and formula, revalidating the formula
    /// against the owning IAP's vocabulary.
    pub async fn update(&self, id: &str, name: &str, formula_text: &str) -> Result<Objective> {
        let objective = self.require_objective(id).await?;
        self.validate_formula(&objective.iap_id, formula_text).await?;
        self.objectives.update_objective(id, name, formula_text).await
    }

    /// Recompute the persisted aggregate from live metrics.
    ///
    /// Evaluates the formula once per fully covered student and persists
    /// the mean. If evaluation fails for any covered student, or no
    /// student is covered, nothing is written and the prior value stays.
    pub async fn recompute(&self, id: &str) -> Result<Objective> {
        let objective = self.require_objective(id).await?;
        let formula = Formula::parse(&objective.formula)?;

        let environment = self.aggregator.student_metrics(&objective.iap_id).await?;
        let per_student = evaluate_per_student(&formula, &environment)?;

        if per_student.is_empty() {
            debug!(
                objective_id = %id,
                "no student has full metric coverage; keeping prior aggregate"
            );
            return Ok(objective);
        }

        let mean: f64 =
            per_student.iter().map(|(_, value)| value).sum::<f64>() / per_student.len() as f64;

        let updated = self.objectives.set_objective_value(id, mean).await?;

        info!(
            objective_id = %id,
            students = per_student.len(),
            value = mean,
            "objective aggregate recomputed"
        );
        Ok(updated)
    }

    /// Per-student objective values, joined against the student
    /// directory.
    pub async fn per_student(&self, id: &str) -> Result<Vec<StudentObjectiveValue>> {
        let objective = self.require_objective(id).await?;
        let formula = Formula::parse(&objective.formula)?;

        let environment = self.aggregator.student_metrics(&objective.iap_id).await?;
        let per_student = evaluate_per_student(&formula, &environment)?;

        let mut values = Vec::with_capacity(per_student.len());
        for (platform_id, value) in per_student {
            let lms_student_id = match self.students.student(&platform_id).await? {
                Some(student) => student.lms_student_id,
                None => {
                    warn!(student_id = %platform_id, "no directory entry for student");
                    platform_id.clone()
                }
            };

            values.push(StudentObjectiveValue {
                platform_student_id: platform_id,
                lms_student_id,
                value,
            });
        }

        Ok(values)
    }

    /// Parse a formula and check its variables against the IAP's
    /// declared metric vocabulary.
    async fn validate_formula(&self, iap_id: &str, formula_text: &str) -> Result<Formula> {
        let formula = Formula::parse(formula_text)?;

        let available = self.aggregator.list_available_metrics(iap_id).await?;
        let unknown: Vec<String> = formula
            .variables()
            .into_iter()
            .filter(|variable| !available.contains(variable))
            .collect();

        if !unknown.is_empty() {
            return Err(CoreError::Validation(format!(
                "formula references unknown metrics: {}",
                unknown.join(", ")
            )));
        }

        Ok(formula)
    }

    async fn require_objective(&self, id: &str) -> Result<Objective> {
        self.objectives
            .objective(id)
            .await?
            .ok_or_else(|| CoreError::not_found("objective", id))
    }
}

/// Evaluate a formula for every student whose quantitative metrics bind
/// all of its variables. Returns (platform student id, value) pairs in
/// student id order.
fn evaluate_per_student(
    formula: &Formula,
    environment: &MetricEnvironment,
) -> Result<Vec<(String, f64)>> {
    let required = formula.variables();
    let mut results = Vec::new();

    for (student_id, metrics) in environment {
        let numeric: BTreeMap<String, f64> = metrics
            .iter()
            .filter_map(|(name, value)| value.as_number().map(|n| (name.clone(), n)))
            .collect();

        if !required.iter().all(|variable| numeric.contains_key(variable)) {
            continue;
        }

        results.push((student_id.clone(), formula.evaluate(&numeric)?));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{quant_row, MockProvider};
    use crate::store::{
        ActivityStore, MemoryStore, NewActivity, NewIap, NewProvider, ProviderStore,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        iap_id: String,
        activity_id: String,
    }

    /// One activity "Quiz 1" declaring the `score` metric.
    async fn fixture() -> (Fixture, MockProvider) {
        let store = MemoryStore::shared();
        let mut provider = MockProvider::default();

        let ap = store
            .insert_provider(NewProvider {
                name: "Quiz AP".to_string(),
                url: "https://ap.example.com".to_string(),
            })
            .await
            .unwrap();

        let activity = store
            .insert_activity(NewActivity {
                name: "Quiz 1".to_string(),
                activity_provider_id: ap.id,
                parameters: Default::default(),
            })
            .await
            .unwrap();

        let iap = store
            .insert_iap(NewIap {
                name: "Intro".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        store.add_activity(&iap.id, &activity.id).await.unwrap();

        provider.declare_quant_metrics("https://ap.example.com", &["score", "attempts"]);

        (
            Fixture {
                store,
                iap_id: iap.id,
                activity_id: activity.id,
            },
            provider,
        )
    }

    fn service(fixture: &Fixture, provider: MockProvider) -> ObjectiveService<MockProvider> {
        let client = Arc::new(provider);
        let aggregator = MetricsAggregator::new(
            fixture.store.clone(),
            fixture.store.clone(),
            fixture.store.clone(),
            client,
        );

        ObjectiveService::new(
            fixture.store.clone(),
            fixture.store.clone(),
            fixture.store.clone(),
            aggregator,
        )
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_variables() {
        let (fixture, provider) = fixture().await;
        let service = service(&fixture, provider);

        let err = service
            .create("Goal", &fixture.iap_id, "a + b", 10.0)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("a"));
    }

    #[tokio::test]
    async fn test_create_accepts_vocabulary_formula() {
        let (fixture, provider) = fixture().await;
        let service = service(&fixture, provider);

        let objective = service
            .create("Goal", &fixture.iap_id, "Quiz1_score * 2", 10.0)
            .await
            .unwrap();

        assert_eq!(objective.formula, "Quiz1_score * 2");
        assert_eq!(objective.value, 0.0);
    }

    #[tokio::test]
    async fn test_create_tolerates_division_in_dry_run() {
        let (fixture, provider) = fixture().await;
        let service = service(&fixture, provider);

        // Evaluates to a division by zero in the all-zero dry run, but
        // the formula itself is valid
        let objective = service
            .create(
                "Ratio",
                &fixture.iap_id,
                "Quiz1_score / Quiz1_attempts",
                1.0,
            )
            .await
            .unwrap();

        assert_eq!(objective.value, 0.0);
    }

    #[tokio::test]
    async fn test_create_against_missing_iap_is_not_found() {
        let (fixture, provider) = fixture().await;
        let service = service(&fixture, provider);

        let err = service
            .create("Goal", "missing", "Quiz1_score", 1.0)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_recompute_averages_only_covered_students() {
        let (fixture, mut provider) = fixture().await;

        // Three students; only two report a score
        provider.analytics.insert(
            fixture.activity_id.clone(),
            vec![
                quant_row("std-1", &[("score", 8.0)]),
                quant_row("std-2", &[("score", 4.0)]),
                quant_row("std-3", &[("attempts", 3.0)]),
            ],
        );

        let service = service(&fixture, provider);
        let objective = service
            .create("Goal", &fixture.iap_id, "Quiz1_score * 2", 10.0)
            .await
            .unwrap();

        let recomputed = service.recompute(&objective.id).await.unwrap();

        // Mean of 16 and 8; the uncovered student does not drag it down
        assert_eq!(recomputed.value, 12.0);
    }

    #[tokio::test]
    async fn test_recompute_without_coverage_keeps_prior_value() {
        let (fixture, provider) = fixture().await;

        let service = service(&fixture, provider);
        let objective = service
            .create("Goal", &fixture.iap_id, "Quiz1_score", 10.0)
            .await
            .unwrap();

        let recomputed = service.recompute(&objective.id).await.unwrap();
        assert_eq!(recomputed.value, objective.value);
    }

    #[tokio::test]
    async fn test_recompute_failure_retains_prior_value() {
        let (fixture, mut provider) = fixture().await;

        provider.analytics.insert(
            fixture.activity_id.clone(),
            vec![quant_row("std-1", &[("score", 0.0), ("attempts", 0.0)])],
        );

        let service = service(&fixture, provider);
        let objective = service
            .create(
                "Ratio",
                &fixture.iap_id,
                "Quiz1_score / Quiz1_attempts",
                1.0,
            )
            .await
            .unwrap();

        let err = service.recompute(&objective.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Formula(_)));

        let stored = fixture
            .store
            .objective(&objective.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value, objective.value);
    }

    #[tokio::test]
    async fn test_per_student_joins_directory() {
        let (fixture, mut provider) = fixture().await;

        let known = fixture.store.ensure_student("lms-alice").await.unwrap();

        provider.analytics.insert(
            fixture.activity_id.clone(),
            vec![
                quant_row(&known.id, &[("score", 8.0)]),
                quant_row("std-unknown", &[("score", 4.0)]),
            ],
        );

        let service = service(&fixture, provider);
        let objective = service
            .create("Goal", &fixture.iap_id, "Quiz1_score", 10.0)
            .await
            .unwrap();

        let mut breakdown = service.per_student(&objective.id).await.unwrap();
        breakdown.sort_by(|a, b| a.lms_student_id.cmp(&b.lms_student_id));

        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].lms_student_id, "lms-alice");
        assert_eq!(breakdown[0].value, 8.0);
        // Unknown students fall back to their platform id
        assert_eq!(breakdown[1].lms_student_id, "std-unknown");
        assert_eq!(breakdown[1].value, 4.0);
    }

    #[tokio::test]
    async fn test_update_revalidates_formula() {
        let (fixture, provider) = fixture().await;
        let service = service(&fixture, provider);

        let objective = service
            .create("Goal", &fixture.iap_id, "Quiz1_score", 10.0)
            .await
            .unwrap();

        let err = service
            .update(&objective.id, "Goal", "unknown_metric + 1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let updated = service
            .update(&objective.id, "Goal v2", "Quiz1_score + 1")
            .await
            .unwrap();
        assert_eq!(updated.formula, "Quiz1_score + 1");
    }
}
