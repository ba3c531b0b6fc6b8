use std::convert::TryFrom;
use std::str::FromStr;

use rusqlite::{named_params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::models::bonus::{AllocationStatus, BonusAllocationRecord};
use crate::models::performance::CoefficientSource;

const BASE_SELECT: &str = r#"
    SELECT
        id,
        pool_id,
        project_id,
        member_id,
        employee_id,
        role_id,
        role_weight,
        performance_coeff,
        coefficient_source,
        participation_ratio,
        calculated_weight,
        bonus_amount,
        default_role_assigned,
        status,
        remark,
        calculated_at,
        updated_at
    FROM bonus_allocations
"#;

#[derive(Debug, Clone)]
pub struct BonusAllocationRow {
    pub id: String,
    pub pool_id: String,
    pub project_id: String,
    pub member_id: String,
    pub employee_id: String,
    pub role_id: String,
    pub role_weight: f64,
    pub performance_coeff: f64,
    pub coefficient_source: String,
    pub participation_ratio: f64,
    pub calculated_weight: f64,
    pub bonus_amount: String,
    pub default_role_assigned: bool,
    pub status: String,
    pub remark: Option<String>,
    pub calculated_at: String,
    pub updated_at: String,
}

impl BonusAllocationRow {
    pub fn from_record(record: &BonusAllocationRecord) -> Self {
        Self {
            id: record.id.clone(),
            pool_id: record.pool_id.clone(),
            project_id: record.project_id.clone(),
            member_id: record.member_id.clone(),
            employee_id: record.employee_id.clone(),
            role_id: record.role_id.clone(),
            role_weight: record.role_weight,
            performance_coeff: record.performance_coeff,
            coefficient_source: record.coefficient_source.as_str().to_string(),
            participation_ratio: record.participation_ratio,
            calculated_weight: record.calculated_weight,
            bonus_amount: record.bonus_amount.to_string(),
            default_role_assigned: record.default_role_assigned,
            status: record.status.as_str().to_string(),
            remark: record.remark.clone(),
            calculated_at: record.calculated_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<BonusAllocationRecord> {
        let bonus_amount = Decimal::from_str(self.bonus_amount.trim()).map_err(|err| {
            AppError::validation_with_source(
                format!("奖金分配 {} 的金额数据非法: {}", self.id, self.bonus_amount),
                err,
            )
        })?;
        let status = AllocationStatus::from_str(&self.status).map_err(|message| {
            AppError::validation(format!("奖金分配 {} 状态数据非法: {message}", self.id))
        })?;
        let coefficient_source =
            CoefficientSource::from_str(&self.coefficient_source).map_err(|message| {
                AppError::validation(format!("奖金分配 {} 绩效来源数据非法: {message}", self.id))
            })?;

        Ok(BonusAllocationRecord {
            id: self.id,
            pool_id: self.pool_id,
            project_id: self.project_id,
            member_id: self.member_id,
            employee_id: self.employee_id,
            role_id: self.role_id,
            role_weight: self.role_weight,
            performance_coeff: self.performance_coeff,
            coefficient_source,
            participation_ratio: self.participation_ratio,
            calculated_weight: self.calculated_weight,
            bonus_amount,
            default_role_assigned: self.default_role_assigned,
            status,
            remark: self.remark,
            calculated_at: self.calculated_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for BonusAllocationRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            pool_id: row.get("pool_id")?,
            project_id: row.get("project_id")?,
            member_id: row.get("member_id")?,
            employee_id: row.get("employee_id")?,
            role_id: row.get("role_id")?,
            role_weight: row.get("role_weight")?,
            performance_coeff: row.get("performance_coeff")?,
            coefficient_source: row.get("coefficient_source")?,
            participation_ratio: row.get("participation_ratio")?,
            calculated_weight: row.get("calculated_weight")?,
            bonus_amount: row.get("bonus_amount")?,
            default_role_assigned: row.get("default_role_assigned")?,
            status: row.get("status")?,
            remark: row.get("remark")?,
            calculated_at: row.get("calculated_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct BonusAllocationRepository;

impl BonusAllocationRepository {
    pub fn insert(conn: &Connection, row: &BonusAllocationRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO bonus_allocations (
                    id, pool_id, project_id, member_id, employee_id, role_id, role_weight,
                    performance_coeff, coefficient_source, participation_ratio,
                    calculated_weight, bonus_amount, default_role_assigned, status, remark,
                    calculated_at, updated_at
                ) VALUES (
                    :id, :pool_id, :project_id, :member_id, :employee_id, :role_id, :role_weight,
                    :performance_coeff, :coefficient_source, :participation_ratio,
                    :calculated_weight, :bonus_amount, :default_role_assigned, :status, :remark,
                    :calculated_at, :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":pool_id": &row.pool_id,
                ":project_id": &row.project_id,
                ":member_id": &row.member_id,
                ":employee_id": &row.employee_id,
                ":role_id": &row.role_id,
                ":role_weight": &row.role_weight,
                ":performance_coeff": &row.performance_coeff,
                ":coefficient_source": &row.coefficient_source,
                ":participation_ratio": &row.participation_ratio,
                ":calculated_weight": &row.calculated_weight,
                ":bonus_amount": &row.bonus_amount,
                ":default_role_assigned": &row.default_role_assigned,
                ":status": &row.status,
                ":remark": &row.remark,
                ":calculated_at": &row.calculated_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    /// Adjusts amount and remark of a pending allocation; false if it is no longer pending.
    pub fn update_pending(conn: &Connection, row: &BonusAllocationRow) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE bonus_allocations SET
                    bonus_amount = :bonus_amount,
                    remark = :remark,
                    updated_at = :updated_at
                WHERE id = :id AND status = 'pending'
            "#,
            named_params! {
                ":id": &row.id,
                ":bonus_amount": &row.bonus_amount,
                ":remark": &row.remark,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(affected > 0)
    }

    pub fn set_status(
        conn: &Connection,
        id: &str,
        from: AllocationStatus,
        to: AllocationStatus,
        updated_at: &str,
    ) -> AppResult<bool> {
        let affected = conn.execute(
            "UPDATE bonus_allocations SET status = :to_status, updated_at = :updated_at WHERE id = :id AND status = :from_status",
            named_params! {
                ":id": id,
                ":from_status": from.as_str(),
                ":to_status": to.as_str(),
                ":updated_at": updated_at,
            },
        )?;
        Ok(affected > 0)
    }

    /// Moves every allocation of the pool in `from` to `to`; returns the count touched.
    pub fn cascade_status(
        conn: &Connection,
        pool_id: &str,
        from: AllocationStatus,
        to: AllocationStatus,
        updated_at: &str,
    ) -> AppResult<usize> {
        let affected = conn.execute(
            r#"
                UPDATE bonus_allocations SET status = :to_status, updated_at = :updated_at
                WHERE pool_id = :pool_id AND status = :from_status
            "#,
            named_params! {
                ":pool_id": pool_id,
                ":from_status": from.as_str(),
                ":to_status": to.as_str(),
                ":updated_at": updated_at,
            },
        )?;
        Ok(affected)
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<BonusAllocationRow>> {
        let sql = format!("{BASE_SELECT} WHERE id = :id");
        let row = conn
            .query_row(&sql, named_params! {":id": id}, |row| {
                BonusAllocationRow::try_from(row)
            })
            .optional()?;
        Ok(row)
    }

    pub fn list_by_pool(
        conn: &Connection,
        pool_id: &str,
        include_deleted: bool,
    ) -> AppResult<Vec<BonusAllocationRow>> {
        let sql = format!(
            r#"{BASE_SELECT}
            WHERE pool_id = :pool_id AND (:include_deleted = 1 OR status <> 'deleted')
            ORDER BY calculated_at ASC, rowid ASC"#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                named_params! {":pool_id": pool_id, ":include_deleted": include_deleted},
                |row| BonusAllocationRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_live(conn: &Connection, pool_id: &str) -> AppResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM bonus_allocations WHERE pool_id = ?1 AND status <> 'deleted'",
            [pool_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
