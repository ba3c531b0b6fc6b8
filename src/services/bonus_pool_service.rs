use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::audit_repository::{AuditRepository, AuditRow};
use crate::db::repositories::bonus_allocation_repository::{
    BonusAllocationRepository, BonusAllocationRow,
};
use crate::db::repositories::bonus_pool_repository::{BonusPoolRepository, BonusPoolRow};
use crate::db::repositories::project_repository::ProjectRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::audit::{AuditEntryRecord, ENTITY_BONUS_ALLOCATION, ENTITY_BONUS_POOL};
use crate::models::bonus::{
    AllocationStatus, AllocationUpdateInput, BonusAllocationRecord, BonusPoolCreateInput,
    BonusPoolFilter, BonusPoolRecord, BonusPoolUpdateInput, CalculationState, PoolStatus,
};
use crate::services::settings_service::SettingsService;

const MONEY_SCALE: u32 = 2;
const MAX_REMARK_CHARS: usize = 500;

/// Pool and allocation lifecycle. Every state change writes its audit entry in the
/// same transaction.
pub struct BonusPoolService {
    db: DbPool,
    settings: Arc<SettingsService>,
}

/// A pool status change and the rules it must satisfy.
struct Transition<'a> {
    from: PoolStatus,
    to: PoolStatus,
    action: &'a str,
    /// Repeating the transition on a pool already in `to` is a no-op.
    idempotent: bool,
    require_allocations: bool,
}

impl BonusPoolService {
    pub fn new(db: DbPool, settings: Arc<SettingsService>) -> Self {
        Self { db, settings }
    }

    pub fn create_pool(&self, input: BonusPoolCreateInput) -> AppResult<BonusPoolRecord> {
        let project_id = input.project_id.trim().to_string();
        if project_id.is_empty() {
            return Err(AppError::validation("项目标识不能为空"));
        }
        let created_by = input.created_by.trim().to_string();
        if created_by.is_empty() {
            return Err(AppError::validation("创建人不能为空"));
        }
        let now = Utc::now().to_rfc3339();
        let record = BonusPoolRecord {
            id: Uuid::new_v4().to_string(),
            project_id,
            period: normalize_period(&input.period)?,
            total_amount: validate_amount(input.total_amount, "奖金池总金额")?,
            profit_ratio: validate_profit_ratio(input.profit_ratio)?,
            status: PoolStatus::Pending,
            created_by,
            approved_by: None,
            calculation_state: CalculationState::Idle,
            calculation_started_at: None,
            last_calculated_at: None,
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.with_transaction(|conn| {
            if !ProjectRepository::exists(conn, &record.project_id)? {
                return Err(AppError::not_found("项目", record.project_id.clone()));
            }
            BonusPoolRepository::insert(conn, &BonusPoolRow::from_record(&record))?;
            AuditRepository::append(
                conn,
                ENTITY_BONUS_POOL,
                &record.id,
                "create",
                Some(&record.created_by),
                Some(&json!({
                    "projectId": record.project_id,
                    "period": record.period,
                    "totalAmount": record.total_amount.to_string(),
                })),
            )
        })?;

        info!(
            target: "app::bonus",
            pool_id = %record.id,
            project_id = %record.project_id,
            total_amount = %record.total_amount,
            "bonus pool created"
        );
        Ok(record)
    }

    pub fn get_pool(&self, id: &str) -> AppResult<BonusPoolRecord> {
        self.db.with_connection(|conn| load_pool(conn, id))
    }

    pub fn list_pools(&self, filter: &BonusPoolFilter) -> AppResult<Vec<BonusPoolRecord>> {
        let rows = self
            .db
            .with_connection(|conn| BonusPoolRepository::list(conn, filter))?;
        let pools = rows
            .into_iter()
            .map(BonusPoolRow::into_record)
            .collect::<AppResult<Vec<_>>>()?;
        debug!(target: "app::bonus", count = pools.len(), "bonus pools listed");
        Ok(pools)
    }

    /// Edits a pending pool. Changing the amount or period discards the pending
    /// allocations, since they were computed against the old values.
    pub fn update_pool(
        &self,
        id: &str,
        update: BonusPoolUpdateInput,
        actor: Option<&str>,
    ) -> AppResult<BonusPoolRecord> {
        let lease_seconds = self.settings.allocation()?.calculation_lease_seconds;
        let now = Utc::now().to_rfc3339();

        let (record, discarded) = self.db.with_transaction(|conn| {
            let mut record = load_pool(conn, id)?;
            ensure_status(&record, PoolStatus::Pending, "修改")?;
            ensure_not_calculating(&record, lease_seconds)?;

            let mut stale = false;
            if let Some(period) = update.period.as_deref() {
                let period = normalize_period(period)?;
                stale |= period != record.period;
                record.period = period;
            }
            if let Some(amount) = update.total_amount {
                let amount = validate_amount(amount, "奖金池总金额")?;
                stale |= amount != record.total_amount;
                record.total_amount = amount;
            }
            if let Some(ratio) = update.profit_ratio {
                record.profit_ratio = validate_profit_ratio(ratio)?;
            }
            record.updated_at = now.clone();

            if !BonusPoolRepository::update_details(conn, &BonusPoolRow::from_record(&record))? {
                return Err(AppError::conflict(format!("奖金池 {id} 状态已变化，请刷新后重试")));
            }

            let discarded = if stale {
                BonusAllocationRepository::cascade_status(
                    conn,
                    id,
                    AllocationStatus::Pending,
                    AllocationStatus::Deleted,
                    &now,
                )?
            } else {
                0
            };

            AuditRepository::append(
                conn,
                ENTITY_BONUS_POOL,
                id,
                "update",
                actor,
                Some(&json!({
                    "period": record.period,
                    "totalAmount": record.total_amount.to_string(),
                    "profitRatio": record.profit_ratio,
                    "discardedAllocations": discarded,
                })),
            )?;
            Ok((record, discarded))
        })?;

        info!(target: "app::bonus", pool_id = %id, discarded, "bonus pool updated");
        Ok(record)
    }

    pub fn delete_pool(&self, id: &str, actor: Option<&str>) -> AppResult<()> {
        self.apply_transition(
            id,
            Transition {
                from: PoolStatus::Pending,
                to: PoolStatus::Deleted,
                action: "delete",
                idempotent: false,
                require_allocations: false,
            },
            actor,
            None,
        )?;
        Ok(())
    }

    pub fn approve_pool(&self, id: &str, actor: Option<&str>) -> AppResult<BonusPoolRecord> {
        self.apply_transition(
            id,
            Transition {
                from: PoolStatus::Pending,
                to: PoolStatus::Approved,
                action: "approve",
                idempotent: true,
                require_allocations: true,
            },
            actor,
            None,
        )
    }

    pub fn reject_pool(
        &self,
        id: &str,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> AppResult<BonusPoolRecord> {
        let details = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(|reason| json!({ "reason": reason }));
        self.apply_transition(
            id,
            Transition {
                from: PoolStatus::Pending,
                to: PoolStatus::Rejected,
                action: "reject",
                idempotent: true,
                require_allocations: false,
            },
            actor,
            details,
        )
    }

    pub fn distribute_pool(&self, id: &str, actor: Option<&str>) -> AppResult<BonusPoolRecord> {
        self.apply_transition(
            id,
            Transition {
                from: PoolStatus::Approved,
                to: PoolStatus::Distributed,
                action: "distribute",
                idempotent: false,
                require_allocations: true,
            },
            actor,
            None,
        )
    }

    fn apply_transition(
        &self,
        id: &str,
        transition: Transition<'_>,
        actor: Option<&str>,
        details: Option<JsonValue>,
    ) -> AppResult<BonusPoolRecord> {
        let lease_seconds = self.settings.allocation()?.calculation_lease_seconds;
        let now = Utc::now().to_rfc3339();

        let (record, cascaded) = self.db.with_transaction(|conn| {
            let current = load_pool(conn, id)?;
            if transition.idempotent && current.status == transition.to {
                return Ok((current, None));
            }
            ensure_status(&current, transition.from, transition.action)?;
            ensure_not_calculating(&current, lease_seconds)?;

            if transition.require_allocations
                && BonusAllocationRepository::count_live(conn, id)? == 0
            {
                return Err(AppError::validation_with_details(
                    format!("奖金池 {id} 尚无分配结果，请先计算"),
                    json!({ "poolId": id, "action": transition.action }),
                ));
            }

            if !BonusPoolRepository::transition_status(
                conn,
                id,
                transition.from,
                transition.to,
                actor,
                &now,
            )? {
                return Err(AppError::conflict(format!("奖金池 {id} 状态已变化，请刷新后重试")));
            }
            let cascaded = BonusAllocationRepository::cascade_status(
                conn,
                id,
                transition.from.allocation_status(),
                transition.to.allocation_status(),
                &now,
            )?;

            let mut audit = json!({
                "from": transition.from.as_str(),
                "to": transition.to.as_str(),
                "allocations": cascaded,
            });
            if let (Some(JsonValue::Object(extra)), JsonValue::Object(target)) =
                (details.as_ref(), &mut audit)
            {
                target.extend(extra.clone());
            }
            AuditRepository::append(conn, ENTITY_BONUS_POOL, id, transition.action, actor, Some(&audit))?;

            Ok((load_pool(conn, id)?, Some(cascaded)))
        })?;

        match cascaded {
            Some(cascaded) => info!(
                target: "app::bonus",
                pool_id = %id,
                action = transition.action,
                status = record.status.as_str(),
                allocations = cascaded,
                "bonus pool status changed"
            ),
            None => debug!(
                target: "app::bonus",
                pool_id = %id,
                action = transition.action,
                "bonus pool already in target status"
            ),
        }
        Ok(record)
    }

    pub fn get_allocation(&self, id: &str) -> AppResult<BonusAllocationRecord> {
        self.db.with_connection(|conn| load_allocation(conn, id))
    }

    pub fn list_allocations(
        &self,
        pool_id: &str,
        include_deleted: bool,
    ) -> AppResult<Vec<BonusAllocationRecord>> {
        self.db.with_connection(|conn| {
            if BonusPoolRepository::find_by_id(conn, pool_id)?.is_none() {
                return Err(AppError::not_found("奖金池", pool_id));
            }
            BonusAllocationRepository::list_by_pool(conn, pool_id, include_deleted)?
                .into_iter()
                .map(BonusAllocationRow::into_record)
                .collect()
        })
    }

    /// Manual adjustment of a pending allocation's amount or remark.
    pub fn update_allocation(
        &self,
        id: &str,
        update: AllocationUpdateInput,
        actor: Option<&str>,
    ) -> AppResult<BonusAllocationRecord> {
        let now = Utc::now().to_rfc3339();
        let record = self.db.with_transaction(|conn| {
            let mut record = load_allocation(conn, id)?;
            ensure_allocation_editable(conn, &record, "修改")?;

            let previous_amount = record.bonus_amount;
            if let Some(amount) = update.bonus_amount {
                record.bonus_amount = validate_amount(amount, "分配金额")?;
            }
            if let Some(remark) = update.remark {
                record.remark = normalize_remark(remark)?;
            }
            record.updated_at = now.clone();

            if !BonusAllocationRepository::update_pending(conn, &BonusAllocationRow::from_record(&record))? {
                return Err(AppError::conflict(format!("奖金分配 {id} 状态已变化，请刷新后重试")));
            }
            AuditRepository::append(
                conn,
                ENTITY_BONUS_ALLOCATION,
                id,
                "adjust",
                actor,
                Some(&json!({
                    "poolId": record.pool_id,
                    "previousAmount": previous_amount.to_string(),
                    "bonusAmount": record.bonus_amount.to_string(),
                    "remark": record.remark,
                })),
            )?;
            Ok(record)
        })?;

        info!(
            target: "app::bonus",
            allocation_id = %id,
            pool_id = %record.pool_id,
            bonus_amount = %record.bonus_amount,
            "bonus allocation adjusted"
        );
        Ok(record)
    }

    pub fn delete_allocation(&self, id: &str, actor: Option<&str>) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        self.db.with_transaction(|conn| {
            let record = load_allocation(conn, id)?;
            ensure_allocation_editable(conn, &record, "删除")?;
            if !BonusAllocationRepository::set_status(
                conn,
                id,
                AllocationStatus::Pending,
                AllocationStatus::Deleted,
                &now,
            )? {
                return Err(AppError::conflict(format!("奖金分配 {id} 状态已变化，请刷新后重试")));
            }
            AuditRepository::append(
                conn,
                ENTITY_BONUS_ALLOCATION,
                id,
                "delete",
                actor,
                Some(&json!({
                    "poolId": record.pool_id,
                    "bonusAmount": record.bonus_amount.to_string(),
                })),
            )
        })?;
        info!(target: "app::bonus", allocation_id = %id, "bonus allocation deleted");
        Ok(())
    }

    /// Audit entries of one entity, oldest first.
    pub fn list_audit(&self, entity_type: &str, entity_id: &str) -> AppResult<Vec<AuditEntryRecord>> {
        let rows = self
            .db
            .with_connection(|conn| AuditRepository::list_for_entity(conn, entity_type, entity_id))?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }
}

fn load_pool(conn: &Connection, id: &str) -> AppResult<BonusPoolRecord> {
    BonusPoolRepository::find_by_id(conn, id)?
        .ok_or_else(|| AppError::not_found("奖金池", id))?
        .into_record()
}

fn load_allocation(conn: &Connection, id: &str) -> AppResult<BonusAllocationRecord> {
    BonusAllocationRepository::find_by_id(conn, id)?
        .ok_or_else(|| AppError::not_found("奖金分配", id))?
        .into_record()
}

fn ensure_status(pool: &BonusPoolRecord, expected: PoolStatus, action: &str) -> AppResult<()> {
    if pool.status == expected {
        return Ok(());
    }
    Err(AppError::validation_with_details(
        format!(
            "奖金池 {} 当前状态为 {}，无法执行 {}",
            pool.id,
            pool.status.as_str(),
            action
        ),
        json!({
            "poolId": pool.id,
            "status": pool.status.as_str(),
            "expected": expected.as_str(),
            "action": action,
        }),
    ))
}

/// A live calculation lease blocks state changes; an expired one does not.
fn ensure_not_calculating(pool: &BonusPoolRecord, lease_seconds: i64) -> AppResult<()> {
    if pool.calculation_state != CalculationState::Calculating {
        return Ok(());
    }
    let stale_before = (Utc::now() - Duration::seconds(lease_seconds))
        .to_rfc3339_opts(SecondsFormat::Micros, true);
    let live = pool
        .calculation_started_at
        .as_deref()
        .map_or(false, |started_at| started_at >= stale_before.as_str());
    if live {
        return Err(AppError::conflict(format!(
            "奖金池 {} 正在计算中，请稍后再试",
            pool.id
        )));
    }
    Ok(())
}

fn ensure_allocation_editable(
    conn: &Connection,
    allocation: &BonusAllocationRecord,
    action: &str,
) -> AppResult<()> {
    if allocation.status != AllocationStatus::Pending {
        return Err(AppError::validation_with_details(
            format!(
                "奖金分配 {} 当前状态为 {}，无法{}",
                allocation.id,
                allocation.status.as_str(),
                action
            ),
            json!({ "allocationId": allocation.id, "status": allocation.status.as_str() }),
        ));
    }
    let pool = load_pool(conn, &allocation.pool_id)?;
    ensure_status(&pool, PoolStatus::Pending, action)
}

fn normalize_period(period: &str) -> AppResult<String> {
    let trimmed = period.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("奖金周期不能为空"));
    }
    Ok(trimmed.to_string())
}

fn validate_amount(amount: Decimal, label: &str) -> AppResult<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::validation(format!("{label}不能为负数: {amount}")));
    }
    let normalized = amount.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(AppError::validation(format!(
            "{label}最多保留 {MONEY_SCALE} 位小数: {amount}"
        )));
    }
    Ok(normalized.abs())
}

fn validate_profit_ratio(ratio: Option<f64>) -> AppResult<Option<f64>> {
    match ratio {
        Some(value) if !value.is_finite() || !(0.0..=1.0).contains(&value) => Err(
            AppError::validation(format!("利润比例需在 0 到 1 之间: {value}")),
        ),
        other => Ok(other),
    }
}

fn normalize_remark(remark: Option<String>) -> AppResult<Option<String>> {
    let remark = remark
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if let Some(value) = remark.as_deref() {
        if value.chars().count() > MAX_REMARK_CHARS {
            return Err(AppError::validation(format!(
                "备注长度需在 {MAX_REMARK_CHARS} 字以内"
            )));
        }
    }
    Ok(remark)
}
