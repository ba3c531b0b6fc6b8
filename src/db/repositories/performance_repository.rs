use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::performance::PerformanceAssessmentRecord;

const BASE_SELECT: &str = r#"
    SELECT id, employee_id, period, final_score, evaluated_at, created_at, updated_at
    FROM performance_assessments
"#;

#[derive(Debug, Clone)]
pub struct AssessmentRow {
    pub id: String,
    pub employee_id: String,
    pub period: String,
    pub final_score: Option<f64>,
    pub evaluated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl AssessmentRow {
    pub fn from_record(record: &PerformanceAssessmentRecord) -> Self {
        Self {
            id: record.id.clone(),
            employee_id: record.employee_id.clone(),
            period: record.period.clone(),
            final_score: record.final_score,
            evaluated_at: record.evaluated_at.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> PerformanceAssessmentRecord {
        PerformanceAssessmentRecord {
            id: self.id,
            employee_id: self.employee_id,
            period: self.period,
            final_score: self.final_score,
            evaluated_at: self.evaluated_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl TryFrom<&Row<'_>> for AssessmentRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            employee_id: row.get("employee_id")?,
            period: row.get("period")?,
            final_score: row.get("final_score")?,
            evaluated_at: row.get("evaluated_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct PerformanceRepository;

impl PerformanceRepository {
    pub fn insert(conn: &Connection, row: &AssessmentRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO performance_assessments (
                    id, employee_id, period, final_score, evaluated_at, created_at, updated_at
                ) VALUES (
                    :id, :employee_id, :period, :final_score, :evaluated_at, :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":employee_id": &row.employee_id,
                ":period": &row.period,
                ":final_score": &row.final_score,
                ":evaluated_at": &row.evaluated_at,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, row: &AssessmentRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE performance_assessments SET
                    final_score = :final_score,
                    evaluated_at = :evaluated_at,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":final_score": &row.final_score,
                ":evaluated_at": &row.evaluated_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        if affected == 0 {
            return Err(AppError::not_found("绩效评估", &row.id));
        }
        Ok(())
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM performance_assessments WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found("绩效评估", id));
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<AssessmentRow>> {
        let sql = format!("{BASE_SELECT} WHERE id = :id");
        let row = conn
            .query_row(&sql, named_params! {":id": id}, |row| {
                AssessmentRow::try_from(row)
            })
            .optional()?;
        Ok(row)
    }

    pub fn find_for_period(
        conn: &Connection,
        employee_id: &str,
        period: &str,
    ) -> AppResult<Option<AssessmentRow>> {
        let sql = format!("{BASE_SELECT} WHERE employee_id = :employee_id AND period = :period");
        let row = conn
            .query_row(
                &sql,
                named_params! {":employee_id": employee_id, ":period": period},
                |row| AssessmentRow::try_from(row),
            )
            .optional()?;
        Ok(row)
    }

    /// Newest scored assessment from a period before `period`: evaluation date, then
    /// creation date, then id. Timestamps are stored as UTC micros, so text order is time order.
    pub fn find_latest_scored_before(
        conn: &Connection,
        employee_id: &str,
        period: &str,
    ) -> AppResult<Option<AssessmentRow>> {
        let sql = format!(
            r#"{BASE_SELECT}
            WHERE employee_id = :employee_id AND period < :period AND final_score IS NOT NULL
            ORDER BY COALESCE(evaluated_at, created_at) DESC, created_at DESC, id DESC
            LIMIT 1"#
        );
        let row = conn
            .query_row(
                &sql,
                named_params! {":employee_id": employee_id, ":period": period},
                |row| AssessmentRow::try_from(row),
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_by_employee(conn: &Connection, employee_id: &str) -> AppResult<Vec<AssessmentRow>> {
        let sql = format!(
            "{BASE_SELECT} WHERE employee_id = :employee_id ORDER BY period DESC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(named_params! {":employee_id": employee_id}, |row| {
                AssessmentRow::try_from(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
