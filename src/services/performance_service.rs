use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::repositories::employee_repository::EmployeeRepository;
use crate::db::repositories::performance_repository::{AssessmentRow, PerformanceRepository};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::performance::{
    AssessmentCreateInput, AssessmentUpdateInput, CoefficientResolution, CoefficientSource,
    PerformanceAssessmentRecord,
};

/// Discount applied when the coefficient comes from another period.
const FALLBACK_DISCOUNT: f64 = 0.95;
const FALLBACK_FLOOR: f64 = 0.9;

/// Score thresholds, highest first.
const SCORE_BANDS: &[(f64, f64)] = &[
    (95.0, 1.3),
    (90.0, 1.2),
    (80.0, 1.1),
    (70.0, 1.0),
    (60.0, 0.9),
    (50.0, 0.8),
];
const LOWEST_BAND_COEFFICIENT: f64 = 0.7;

/// Maps a final assessment score onto the performance coefficient table.
pub fn coefficient_for_score(score: f64) -> f64 {
    SCORE_BANDS
        .iter()
        .find(|(threshold, _)| score >= *threshold)
        .map(|(_, coefficient)| *coefficient)
        .unwrap_or(LOWEST_BAND_COEFFICIENT)
}

#[derive(Clone)]
pub struct PerformanceService {
    db: DbPool,
}

impl PerformanceService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Coefficient for `employee_id` in `period`. Storage failures degrade to the
    /// neutral coefficient instead of failing the calculation.
    pub fn resolve_coefficient(&self, employee_id: &str, period: &str) -> CoefficientResolution {
        match self
            .db
            .with_connection(|conn| Ok(Self::resolve_on(conn, employee_id, period)))
        {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(
                    target: "app::bonus",
                    employee_id,
                    period,
                    error = %err,
                    "failed to open connection for performance lookup, using neutral coefficient"
                );
                CoefficientResolution::neutral()
            }
        }
    }

    /// Same as [`resolve_coefficient`](Self::resolve_coefficient) on a caller-held connection,
    /// so a calculation run can reuse one connection for every member.
    pub fn resolve_on(conn: &Connection, employee_id: &str, period: &str) -> CoefficientResolution {
        match lookup_coefficient(conn, employee_id, period) {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(
                    target: "app::bonus",
                    employee_id,
                    period,
                    error = %err,
                    "failed to load performance assessment, using neutral coefficient"
                );
                CoefficientResolution::neutral()
            }
        }
    }

    pub fn create_assessment(
        &self,
        input: AssessmentCreateInput,
    ) -> AppResult<PerformanceAssessmentRecord> {
        let employee_id = normalize_required(&input.employee_id, "员工标识不能为空")?;
        let period = normalize_required(&input.period, "考核周期不能为空")?;
        let final_score = validate_score(input.final_score)?;
        let evaluated_at = normalize_datetime_opt(input.evaluated_at)?;
        let now = utc_timestamp(Utc::now());

        let record = PerformanceAssessmentRecord {
            id: Uuid::new_v4().to_string(),
            employee_id,
            period,
            final_score: Some(final_score),
            evaluated_at,
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.with_transaction(|conn| {
            if !EmployeeRepository::exists(conn, &record.employee_id)? {
                return Err(AppError::not_found("员工", record.employee_id.clone()));
            }
            if PerformanceRepository::find_for_period(conn, &record.employee_id, &record.period)?
                .is_some()
            {
                return Err(AppError::conflict(format!(
                    "员工 {} 在周期 {} 已有绩效记录",
                    record.employee_id, record.period
                )));
            }
            PerformanceRepository::insert(conn, &AssessmentRow::from_record(&record))
        })?;

        info!(
            target: "app::performance",
            assessment_id = %record.id,
            employee_id = %record.employee_id,
            period = %record.period,
            "performance assessment created"
        );
        Ok(record)
    }

    pub fn get_assessment(&self, id: &str) -> AppResult<PerformanceAssessmentRecord> {
        let row = self
            .db
            .with_connection(|conn| PerformanceRepository::find_by_id(conn, id))?
            .ok_or_else(|| AppError::not_found("绩效记录", id))?;
        Ok(row.into_record())
    }

    pub fn list_assessments(&self, employee_id: &str) -> AppResult<Vec<PerformanceAssessmentRecord>> {
        let rows = self
            .db
            .with_connection(|conn| PerformanceRepository::list_by_employee(conn, employee_id))?;
        Ok(rows.into_iter().map(AssessmentRow::into_record).collect())
    }

    pub fn update_assessment(
        &self,
        id: &str,
        update: AssessmentUpdateInput,
    ) -> AppResult<PerformanceAssessmentRecord> {
        let mut record = self.get_assessment(id)?;
        if let Some(score) = update.final_score {
            record.final_score = Some(validate_score(score)?);
        }
        if let Some(evaluated_at) = update.evaluated_at {
            record.evaluated_at = normalize_datetime_opt(evaluated_at)?;
        }
        record.updated_at = utc_timestamp(Utc::now());

        self.db
            .with_connection(|conn| PerformanceRepository::update(conn, &AssessmentRow::from_record(&record)))?;
        info!(target: "app::performance", assessment_id = %record.id, "performance assessment updated");
        Ok(record)
    }

    pub fn delete_assessment(&self, id: &str) -> AppResult<()> {
        self.get_assessment(id)?;
        self.db
            .with_connection(|conn| PerformanceRepository::delete(conn, id))?;
        info!(target: "app::performance", assessment_id = %id, "performance assessment deleted");
        Ok(())
    }
}

fn lookup_coefficient(
    conn: &Connection,
    employee_id: &str,
    period: &str,
) -> AppResult<CoefficientResolution> {
    if let Some(row) = PerformanceRepository::find_for_period(conn, employee_id, period)? {
        if let Some(score) = row.final_score.filter(|score| score.is_finite()) {
            return Ok(CoefficientResolution {
                coefficient: coefficient_for_score(score),
                source: CoefficientSource::Exact,
                period: Some(row.period),
                score: Some(score),
            });
        }
    }

    if let Some(row) =
        PerformanceRepository::find_latest_scored_before(conn, employee_id, period)?
    {
        if let Some(score) = row.final_score.filter(|score| score.is_finite()) {
            let coefficient = (coefficient_for_score(score) * FALLBACK_DISCOUNT).max(FALLBACK_FLOOR);
            debug!(
                target: "app::bonus",
                employee_id,
                period,
                fallback_period = %row.period,
                coefficient,
                "using fallback performance assessment"
            );
            return Ok(CoefficientResolution {
                coefficient,
                source: CoefficientSource::Fallback,
                period: Some(row.period),
                score: Some(score),
            });
        }
    }

    Ok(CoefficientResolution::neutral())
}

fn validate_score(score: f64) -> AppResult<f64> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(AppError::validation(format!(
            "绩效得分需在 0 到 100 之间: {score}"
        )));
    }
    Ok(score)
}

fn normalize_required(value: &str, message: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(message));
    }
    Ok(trimmed.to_string())
}

/// Evaluation times are stored in UTC so the fallback ordering compares instants.
fn normalize_datetime_opt(value: Option<String>) -> AppResult<Option<String>> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if value.is_empty() => Ok(None),
        Some(value) => {
            let parsed = DateTime::parse_from_rfc3339(&value)
                .map_err(|_| AppError::validation("评估时间格式非法"))?;
            Ok(Some(utc_timestamp(parsed.with_timezone(&Utc))))
        }
        None => Ok(None),
    }
}

fn utc_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::directory::EmployeeCreateInput;
    use crate::services::employee_service::EmployeeService;
    use tempfile::tempdir;

    fn setup() -> (PerformanceService, String, tempfile::TempDir) {
        let dir = tempdir().expect("temp dir");
        let pool = DbPool::new(dir.path().join("performance.sqlite")).expect("db pool");
        let employee = EmployeeService::new(pool.clone())
            .create_employee(EmployeeCreateInput {
                employee_no: "E001".into(),
                name: "张三".into(),
                ..Default::default()
            })
            .expect("create employee");
        (PerformanceService::new(pool), employee.id, dir)
    }

    fn assess(service: &PerformanceService, employee_id: &str, period: &str, score: f64, at: &str) {
        service
            .create_assessment(AssessmentCreateInput {
                employee_id: employee_id.to_string(),
                period: period.to_string(),
                final_score: score,
                evaluated_at: Some(at.to_string()),
            })
            .expect("create assessment");
    }

    #[test]
    fn score_table_boundaries() {
        assert_eq!(coefficient_for_score(100.0), 1.3);
        assert_eq!(coefficient_for_score(95.0), 1.3);
        assert_eq!(coefficient_for_score(94.99), 1.2);
        assert_eq!(coefficient_for_score(90.0), 1.2);
        assert_eq!(coefficient_for_score(80.0), 1.1);
        assert_eq!(coefficient_for_score(70.0), 1.0);
        assert_eq!(coefficient_for_score(60.0), 0.9);
        assert_eq!(coefficient_for_score(50.0), 0.8);
        assert_eq!(coefficient_for_score(49.9), 0.7);
        assert_eq!(coefficient_for_score(0.0), 0.7);
    }

    #[test]
    fn exact_period_wins() {
        let (service, employee_id, _dir) = setup();
        assess(&service, &employee_id, "2024-Q1", 92.0, "2024-04-01T00:00:00Z");
        assess(&service, &employee_id, "2024-Q2", 75.0, "2024-07-01T00:00:00Z");

        let resolution = service.resolve_coefficient(&employee_id, "2024-Q1");
        assert_eq!(resolution.source, CoefficientSource::Exact);
        assert_eq!(resolution.coefficient, 1.2);
        assert_eq!(resolution.period.as_deref(), Some("2024-Q1"));
    }

    #[test]
    fn fallback_uses_latest_assessment_with_discount() {
        let (service, employee_id, _dir) = setup();
        assess(&service, &employee_id, "2024-Q1", 70.0, "2024-04-01T00:00:00Z");
        assess(&service, &employee_id, "2024-Q2", 96.0, "2024-07-01T00:00:00Z");

        let resolution = service.resolve_coefficient(&employee_id, "2024-Q3");
        assert_eq!(resolution.source, CoefficientSource::Fallback);
        assert_eq!(resolution.period.as_deref(), Some("2024-Q2"));
        assert!((resolution.coefficient - 1.3 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn fallback_is_floored() {
        let (service, employee_id, _dir) = setup();
        assess(&service, &employee_id, "2024-Q1", 40.0, "2024-04-01T00:00:00Z");

        let resolution = service.resolve_coefficient(&employee_id, "2024-Q2");
        assert_eq!(resolution.source, CoefficientSource::Fallback);
        assert_eq!(resolution.coefficient, 0.9);
    }

    #[test]
    fn later_period_is_never_used_as_fallback() {
        let (service, employee_id, _dir) = setup();
        assess(&service, &employee_id, "2024-Q3", 96.0, "2024-10-01T00:00:00Z");

        let resolution = service.resolve_coefficient(&employee_id, "2024-Q1");
        assert_eq!(resolution, CoefficientResolution::neutral());
    }

    #[test]
    fn fallback_orders_by_instant_across_offsets() {
        let (service, employee_id, _dir) = setup();
        // 2024-06-30T21:00Z, earlier despite the larger local date.
        assess(&service, &employee_id, "2024-Q1", 96.0, "2024-07-01T05:00:00+08:00");
        assess(&service, &employee_id, "2024-Q2", 40.0, "2024-06-30T22:00:00Z");

        let resolution = service.resolve_coefficient(&employee_id, "2024-Q3");
        assert_eq!(resolution.source, CoefficientSource::Fallback);
        assert_eq!(resolution.period.as_deref(), Some("2024-Q2"));
        assert_eq!(resolution.coefficient, 0.9);
    }

    #[test]
    fn evaluated_at_is_stored_in_utc() {
        let (service, employee_id, _dir) = setup();
        let record = service
            .create_assessment(AssessmentCreateInput {
                employee_id,
                period: "2024-Q1".into(),
                final_score: 80.0,
                evaluated_at: Some("2024-07-01T05:00:00+08:00".into()),
            })
            .expect("create assessment");

        assert_eq!(
            record.evaluated_at.as_deref(),
            Some("2024-06-30T21:00:00.000000Z")
        );
        assert!(record.created_at.ends_with('Z'));
    }

    #[test]
    fn no_assessment_is_neutral() {
        let (service, employee_id, _dir) = setup();
        let resolution = service.resolve_coefficient(&employee_id, "2024-Q1");
        assert_eq!(resolution, CoefficientResolution::neutral());
        assert_eq!(resolution.coefficient, 1.0);
    }

    #[test]
    fn duplicate_period_conflicts() {
        let (service, employee_id, _dir) = setup();
        assess(&service, &employee_id, "2024-Q1", 80.0, "2024-04-01T00:00:00Z");
        let result = service.create_assessment(AssessmentCreateInput {
            employee_id: employee_id.clone(),
            period: "2024-Q1".into(),
            final_score: 85.0,
            evaluated_at: None,
        });
        assert!(matches!(result, Err(AppError::Conflict { .. })));
    }

    #[test]
    fn score_out_of_range_is_rejected() {
        let (service, employee_id, _dir) = setup();
        let result = service.create_assessment(AssessmentCreateInput {
            employee_id,
            period: "2024-Q1".into(),
            final_score: 120.0,
            evaluated_at: None,
        });
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }
}
