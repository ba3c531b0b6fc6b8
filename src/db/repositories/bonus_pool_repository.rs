use std::convert::TryFrom;
use std::str::FromStr;

use rusqlite::{named_params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::models::bonus::{BonusPoolFilter, BonusPoolRecord, CalculationState, PoolStatus};

const BASE_SELECT: &str = r#"
    SELECT
        id,
        project_id,
        period,
        total_amount,
        profit_ratio,
        status,
        created_by,
        approved_by,
        calculation_state,
        calculation_started_at,
        last_calculated_at,
        created_at,
        updated_at
    FROM bonus_pools
"#;

#[derive(Debug, Clone)]
pub struct BonusPoolRow {
    pub id: String,
    pub project_id: String,
    pub period: String,
    pub total_amount: String,
    pub profit_ratio: Option<f64>,
    pub status: String,
    pub created_by: String,
    pub approved_by: Option<String>,
    pub calculation_state: String,
    pub calculation_started_at: Option<String>,
    pub last_calculated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl BonusPoolRow {
    pub fn from_record(record: &BonusPoolRecord) -> Self {
        Self {
            id: record.id.clone(),
            project_id: record.project_id.clone(),
            period: record.period.clone(),
            total_amount: record.total_amount.to_string(),
            profit_ratio: record.profit_ratio,
            status: record.status.as_str().to_string(),
            created_by: record.created_by.clone(),
            approved_by: record.approved_by.clone(),
            calculation_state: record.calculation_state.as_str().to_string(),
            calculation_started_at: record.calculation_started_at.clone(),
            last_calculated_at: record.last_calculated_at.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    /// Strict conversion: malformed amounts or statuses surface as validation errors.
    pub fn into_record(self) -> AppResult<BonusPoolRecord> {
        let total_amount = Decimal::from_str(self.total_amount.trim()).map_err(|err| {
            AppError::validation_with_source(
                format!("奖金池 {} 的总金额数据非法: {}", self.id, self.total_amount),
                err,
            )
        })?;
        if total_amount.is_sign_negative() {
            return Err(AppError::validation(format!(
                "奖金池 {} 的总金额不能为负数: {}",
                self.id, total_amount
            )));
        }

        if let Some(ratio) = self.profit_ratio {
            if !ratio.is_finite() {
                return Err(AppError::validation(format!(
                    "奖金池 {} 的利润比例数据非法",
                    self.id
                )));
            }
        }

        let status = PoolStatus::from_str(&self.status).map_err(|message| {
            AppError::validation(format!("奖金池 {} 状态数据非法: {message}", self.id))
        })?;
        let calculation_state =
            CalculationState::from_str(&self.calculation_state).map_err(|message| {
                AppError::validation(format!("奖金池 {} 计算状态数据非法: {message}", self.id))
            })?;

        Ok(BonusPoolRecord {
            id: self.id,
            project_id: self.project_id,
            period: self.period,
            total_amount,
            profit_ratio: self.profit_ratio,
            status,
            created_by: self.created_by,
            approved_by: self.approved_by,
            calculation_state,
            calculation_started_at: self.calculation_started_at,
            last_calculated_at: self.last_calculated_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for BonusPoolRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            period: row.get("period")?,
            total_amount: row.get("total_amount")?,
            profit_ratio: row.get("profit_ratio")?,
            status: row.get("status")?,
            created_by: row.get("created_by")?,
            approved_by: row.get("approved_by")?,
            calculation_state: row.get("calculation_state")?,
            calculation_started_at: row.get("calculation_started_at")?,
            last_calculated_at: row.get("last_calculated_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct BonusPoolRepository;

impl BonusPoolRepository {
    pub fn insert(conn: &Connection, row: &BonusPoolRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO bonus_pools (
                    id, project_id, period, total_amount, profit_ratio, status, created_by,
                    approved_by, calculation_state, calculation_started_at, last_calculated_at,
                    created_at, updated_at
                ) VALUES (
                    :id, :project_id, :period, :total_amount, :profit_ratio, :status, :created_by,
                    :approved_by, :calculation_state, :calculation_started_at, :last_calculated_at,
                    :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":project_id": &row.project_id,
                ":period": &row.period,
                ":total_amount": &row.total_amount,
                ":profit_ratio": &row.profit_ratio,
                ":status": &row.status,
                ":created_by": &row.created_by,
                ":approved_by": &row.approved_by,
                ":calculation_state": &row.calculation_state,
                ":calculation_started_at": &row.calculation_started_at,
                ":last_calculated_at": &row.last_calculated_at,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    /// Rewrites the editable fields. Only applies while the pool is still pending.
    pub fn update_details(conn: &Connection, row: &BonusPoolRow) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE bonus_pools SET
                    period = :period,
                    total_amount = :total_amount,
                    profit_ratio = :profit_ratio,
                    updated_at = :updated_at
                WHERE id = :id AND status = 'pending'
            "#,
            named_params! {
                ":id": &row.id,
                ":period": &row.period,
                ":total_amount": &row.total_amount,
                ":profit_ratio": &row.profit_ratio,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(affected > 0)
    }

    /// Moves the pool from `from` to `to`; returns false when the pool was not in `from`.
    pub fn transition_status(
        conn: &Connection,
        id: &str,
        from: PoolStatus,
        to: PoolStatus,
        actor: Option<&str>,
        updated_at: &str,
    ) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE bonus_pools SET
                    status = :to_status,
                    approved_by = CASE WHEN :to_status = 'approved' THEN :actor ELSE approved_by END,
                    updated_at = :updated_at
                WHERE id = :id AND status = :from_status
            "#,
            named_params! {
                ":id": id,
                ":from_status": from.as_str(),
                ":to_status": to.as_str(),
                ":actor": actor,
                ":updated_at": updated_at,
            },
        )?;
        Ok(affected > 0)
    }

    /// Compare-and-swap `idle → calculating`. A lease started before `stale_before`
    /// is considered abandoned and can be taken over.
    pub fn try_acquire_calculation(
        conn: &Connection,
        id: &str,
        started_at: &str,
        stale_before: &str,
    ) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE bonus_pools SET
                    calculation_state = 'calculating',
                    calculation_started_at = :started_at
                WHERE id = :id
                  AND status = 'pending'
                  AND (
                      calculation_state = 'idle'
                      OR calculation_started_at IS NULL
                      OR calculation_started_at < :stale_before
                  )
            "#,
            named_params! {
                ":id": id,
                ":started_at": started_at,
                ":stale_before": stale_before,
            },
        )?;
        Ok(affected > 0)
    }

    /// Releases the lease only if it is still the one taken at `started_at`.
    pub fn release_calculation(conn: &Connection, id: &str, started_at: &str) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE bonus_pools SET
                    calculation_state = 'idle',
                    calculation_started_at = NULL
                WHERE id = :id
                  AND calculation_state = 'calculating'
                  AND calculation_started_at = :started_at
            "#,
            named_params! {":id": id, ":started_at": started_at},
        )?;
        Ok(affected > 0)
    }

    pub fn mark_calculated(conn: &Connection, id: &str, calculated_at: &str) -> AppResult<()> {
        conn.execute(
            "UPDATE bonus_pools SET last_calculated_at = :calculated_at, updated_at = :calculated_at WHERE id = :id",
            named_params! {":id": id, ":calculated_at": calculated_at},
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<BonusPoolRow>> {
        let sql = format!("{BASE_SELECT} WHERE id = :id");
        let row = conn
            .query_row(&sql, named_params! {":id": id}, |row| {
                BonusPoolRow::try_from(row)
            })
            .optional()?;
        Ok(row)
    }

    pub fn list(conn: &Connection, filter: &BonusPoolFilter) -> AppResult<Vec<BonusPoolRow>> {
        let sql = format!(
            r#"{BASE_SELECT}
            WHERE (:project_id IS NULL OR project_id = :project_id)
              AND (:status IS NULL OR status = :status)
              AND (:include_deleted = 1 OR status <> 'deleted')
            ORDER BY created_at DESC, id ASC"#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                named_params! {
                    ":project_id": filter.project_id.as_deref(),
                    ":status": filter.status.map(|status| status.as_str()),
                    ":include_deleted": filter.include_deleted,
                },
                |row| BonusPoolRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
