use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::repositories::audit_repository::AuditRepository;
use crate::db::repositories::bonus_allocation_repository::{
    BonusAllocationRepository, BonusAllocationRow,
};
use crate::db::repositories::bonus_pool_repository::{BonusPoolRepository, BonusPoolRow};
use crate::db::repositories::employee_repository::EmployeeRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::audit::ENTITY_BONUS_POOL;
use crate::models::bonus::{
    AllocationStatus, AllocationSummary, BonusAllocationRecord, BonusPoolRecord,
    CalculationResult, CalculationWarning, PoolStatus,
};
use crate::models::performance::CoefficientSource;
use crate::models::role_weight::{RoleWeights, DEFAULT_ROLE_KEY};
use crate::models::settings::AllocationSettings;
use crate::services::eligibility::MemberEligibilityFilter;
use crate::services::performance_service::PerformanceService;
use crate::services::role_weight_service::RoleWeightService;
use crate::services::settings_service::SettingsService;

const MONEY_SCALE: u32 = 2;

/// Splits a bonus pool across a project's eligible members.
pub struct AllocationCalculator {
    db: DbPool,
    role_weights: RoleWeightService,
    eligibility: MemberEligibilityFilter,
    settings: Arc<SettingsService>,
}

/// One member that made it through screening, before amounts are assigned.
#[derive(Debug, Clone)]
struct WeightedMember {
    member_id: String,
    employee_id: String,
    role_id: String,
    role_weight: f64,
    performance_coeff: f64,
    coefficient_source: CoefficientSource,
    participation_ratio: f64,
    weight: f64,
    default_role_assigned: bool,
}

#[derive(Debug)]
struct AllocationPlan {
    allocations: Vec<BonusAllocationRecord>,
    total_allocated: Decimal,
    summary: AllocationSummary,
    warnings: Vec<CalculationWarning>,
}

impl AllocationCalculator {
    pub fn new(db: DbPool, settings: Arc<SettingsService>) -> Self {
        Self {
            role_weights: RoleWeightService::new(db.clone()),
            eligibility: MemberEligibilityFilter::new(db.clone()),
            db,
            settings,
        }
    }

    /// Recomputes and persists the pool's allocations, replacing any pending batch.
    pub fn calculate(&self, pool_id: &str) -> AppResult<CalculationResult> {
        let pool = self.load_pending_pool(pool_id)?;
        let settings = self.settings.allocation()?;
        let lease = CalculationLease::acquire(&self.db, &pool, settings.calculation_lease_seconds)?;

        let plan = self.plan(&pool, &settings)?;
        let replaced = self.persist(&pool, &plan)?;
        lease.release()?;

        let pool = self.load_pool(pool_id)?;
        info!(
            target: "app::bonus",
            pool_id,
            members = plan.allocations.len(),
            skipped = plan.summary.skipped_member_count,
            replaced,
            total_allocated = %plan.total_allocated,
            "bonus pool calculated"
        );

        Ok(CalculationResult {
            total_amount: pool.total_amount,
            pool,
            total_allocated: plan.total_allocated,
            allocations: plan.allocations,
            summary: plan.summary,
            warnings: plan.warnings,
        })
    }

    /// Dry run of [`calculate`](Self::calculate): no lease, nothing written.
    pub fn preview(&self, pool_id: &str) -> AppResult<CalculationResult> {
        let pool = self.load_pending_pool(pool_id)?;
        let settings = self.settings.allocation()?;
        let plan = self.plan(&pool, &settings)?;
        debug!(target: "app::bonus", pool_id, members = plan.allocations.len(), "bonus pool previewed");

        Ok(CalculationResult {
            total_amount: pool.total_amount,
            pool,
            total_allocated: plan.total_allocated,
            allocations: plan.allocations,
            summary: plan.summary,
            warnings: plan.warnings,
        })
    }

    fn load_pool(&self, pool_id: &str) -> AppResult<BonusPoolRecord> {
        self.db
            .with_connection(|conn| BonusPoolRepository::find_by_id(conn, pool_id))?
            .ok_or_else(|| AppError::not_found("奖金池", pool_id))?
            .into_record()
    }

    fn load_pending_pool(&self, pool_id: &str) -> AppResult<BonusPoolRecord> {
        let pool = self.load_pool(pool_id)?;
        ensure_calculable(&pool)?;
        Ok(pool)
    }

    fn plan(&self, pool: &BonusPoolRecord, settings: &AllocationSettings) -> AppResult<AllocationPlan> {
        let report = self.eligibility.select_eligible(&pool.project_id)?;
        report.ensure_any(&pool.project_id)?;

        if report.eligible.len() > settings.max_members_per_run {
            return Err(AppError::validation_with_details(
                format!(
                    "项目 {} 的可分配成员数 {} 超过单次计算上限 {}",
                    pool.project_id,
                    report.eligible.len(),
                    settings.max_members_per_run
                ),
                json!({
                    "projectId": pool.project_id,
                    "eligibleCount": report.eligible.len(),
                    "maxMembersPerRun": settings.max_members_per_run,
                }),
            ));
        }

        let role_weights = self.role_weights.resolve_role_weights(&pool.project_id);
        let mut warnings = Vec::new();

        let weighted = self.db.with_connection(|conn| {
            let mut weighted = Vec::with_capacity(report.eligible.len());
            for member in &report.eligible {
                let Some(employee_id) = member.employee_id.clone() else {
                    continue;
                };
                if !EmployeeRepository::exists(conn, &employee_id)? {
                    warn!(
                        target: "app::bonus",
                        pool_id = %pool.id,
                        member_id = %member.id,
                        employee_id = %employee_id,
                        "skipping member without employee record"
                    );
                    warnings.push(CalculationWarning {
                        member_id: member.id.clone(),
                        employee_id: Some(employee_id),
                        reason: "员工档案不存在，已跳过".to_string(),
                    });
                    continue;
                }

                let (role_id, role_weight, default_role_assigned) =
                    role_for(&role_weights, member.role_id.as_deref());
                let resolution = PerformanceService::resolve_on(conn, &employee_id, &pool.period);
                let participation_ratio = member.participation_ratio.unwrap_or(1.0);
                let weight = role_weight * resolution.coefficient * participation_ratio;

                if !weight.is_finite() || weight <= 0.0 {
                    debug!(
                        target: "app::bonus",
                        pool_id = %pool.id,
                        member_id = %member.id,
                        weight,
                        "excluding member with non-positive weight"
                    );
                    warnings.push(CalculationWarning {
                        member_id: member.id.clone(),
                        employee_id: Some(employee_id),
                        reason: format!("计算权重为 {weight}，不参与分配"),
                    });
                    continue;
                }

                weighted.push(WeightedMember {
                    member_id: member.id.clone(),
                    employee_id,
                    role_id,
                    role_weight,
                    performance_coeff: resolution.coefficient,
                    coefficient_source: resolution.source,
                    participation_ratio,
                    weight,
                    default_role_assigned,
                });
            }
            Ok(weighted)
        })?;

        let total_weight: f64 = weighted.iter().map(|member| member.weight).sum();
        if weighted.is_empty() || !total_weight.is_finite() || total_weight <= 0.0 {
            return Err(AppError::validation_with_details(
                format!("奖金池 {} 的成员总权重为 0，无法分配", pool.id),
                json!({
                    "poolId": pool.id,
                    "eligibleCount": report.eligible.len(),
                    "skipped": warnings.len(),
                }),
            ));
        }

        let shares = split_amount(pool.total_amount, &weighted, total_weight)?;
        let calculated_at = Utc::now().to_rfc3339();
        let allocations: Vec<BonusAllocationRecord> = weighted
            .into_iter()
            .zip(shares)
            .map(|(member, bonus_amount)| BonusAllocationRecord {
                id: Uuid::new_v4().to_string(),
                pool_id: pool.id.clone(),
                project_id: pool.project_id.clone(),
                member_id: member.member_id,
                employee_id: member.employee_id,
                role_id: member.role_id,
                role_weight: member.role_weight,
                performance_coeff: member.performance_coeff,
                coefficient_source: member.coefficient_source,
                participation_ratio: member.participation_ratio,
                calculated_weight: member.weight,
                bonus_amount,
                default_role_assigned: member.default_role_assigned,
                status: AllocationStatus::Pending,
                remark: None,
                calculated_at: calculated_at.clone(),
                updated_at: calculated_at.clone(),
            })
            .collect();

        let total_allocated: Decimal = allocations.iter().map(|a| a.bonus_amount).sum();
        let rounding_drift = total_allocated - pool.total_amount;
        let drift_exceeds_tolerance = rounding_drift.abs() > settings.rounding_tolerance;
        if drift_exceeds_tolerance {
            warn!(
                target: "app::bonus",
                pool_id = %pool.id,
                total_amount = %pool.total_amount,
                total_allocated = %total_allocated,
                drift = %rounding_drift,
                tolerance = %settings.rounding_tolerance,
                "rounding drift exceeds tolerance"
            );
        }

        let summary = summarize(
            &allocations,
            warnings.len(),
            total_weight,
            total_allocated,
            rounding_drift,
            drift_exceeds_tolerance,
        );

        Ok(AllocationPlan {
            allocations,
            total_allocated,
            summary,
            warnings,
        })
    }

    /// Writes the batch atomically; returns how many pending allocations it replaced.
    fn persist(&self, pool: &BonusPoolRecord, plan: &AllocationPlan) -> AppResult<usize> {
        let now = Utc::now().to_rfc3339();
        self.db.with_transaction(|conn| {
            let current = BonusPoolRepository::find_by_id(conn, &pool.id)?
                .ok_or_else(|| AppError::not_found("奖金池", &pool.id))?
                .into_record()?;
            ensure_calculable(&current)?;

            let replaced = BonusAllocationRepository::cascade_status(
                conn,
                &pool.id,
                AllocationStatus::Pending,
                AllocationStatus::Deleted,
                &now,
            )?;
            for allocation in &plan.allocations {
                BonusAllocationRepository::insert(conn, &BonusAllocationRow::from_record(allocation))?;
            }
            BonusPoolRepository::mark_calculated(conn, &pool.id, &now)?;
            AuditRepository::append(
                conn,
                ENTITY_BONUS_POOL,
                &pool.id,
                "calculate",
                None,
                Some(&json!({
                    "memberCount": plan.allocations.len(),
                    "skippedCount": plan.summary.skipped_member_count,
                    "replacedCount": replaced,
                    "totalAllocated": plan.total_allocated.to_string(),
                    "roundingDrift": plan.summary.rounding_drift.to_string(),
                })),
            )?;
            Ok(replaced)
        })
    }
}

fn ensure_calculable(pool: &BonusPoolRecord) -> AppResult<()> {
    if pool.status != PoolStatus::Pending {
        return Err(AppError::validation_with_details(
            format!(
                "奖金池 {} 当前状态为 {}，仅待审批的奖金池可以计算",
                pool.id,
                pool.status.as_str()
            ),
            json!({ "poolId": pool.id, "status": pool.status.as_str() }),
        ));
    }
    Ok(())
}

/// Role id, weight, and whether the default weight stood in for a missing or unknown role.
fn role_for(weights: &RoleWeights, role_id: Option<&str>) -> (String, f64, bool) {
    match role_id.and_then(|role| weights.get(role).map(|weight| (role, weight))) {
        Some((role, weight)) => (role.to_string(), weight, false),
        None => (
            role_id.unwrap_or(DEFAULT_ROLE_KEY).to_string(),
            weights.default_weight(),
            true,
        ),
    }
}

/// share = total × weight / totalWeight, rounded half away from zero to cents, never negative.
fn split_amount(
    total_amount: Decimal,
    members: &[WeightedMember],
    total_weight: f64,
) -> AppResult<Vec<Decimal>> {
    let total_weight = to_decimal(total_weight)?;
    members
        .iter()
        .map(|member| {
            let weight = to_decimal(member.weight)?;
            let share = weight
                .checked_div(total_weight)
                .and_then(|fraction| total_amount.checked_mul(fraction))
                .ok_or_else(|| {
                    AppError::validation(format!(
                        "成员 {} 的奖金金额超出可计算范围",
                        member.member_id
                    ))
                })?;
            Ok(share
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
                .max(Decimal::ZERO))
        })
        .collect()
}

fn to_decimal(value: f64) -> AppResult<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| AppError::validation(format!("权重无法转换为精确数值: {value}")))
}

fn summarize(
    allocations: &[BonusAllocationRecord],
    skipped: usize,
    total_weight: f64,
    total_allocated: Decimal,
    rounding_drift: Decimal,
    drift_exceeds_tolerance: bool,
) -> AllocationSummary {
    let count = allocations.len();
    let average_bonus = match Decimal::from_usize(count) {
        Some(divisor) if !divisor.is_zero() => (total_allocated / divisor)
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        _ => Decimal::ZERO,
    };
    let max_bonus = allocations
        .iter()
        .map(|a| a.bonus_amount)
        .max()
        .unwrap_or(Decimal::ZERO);
    let min_bonus = allocations
        .iter()
        .map(|a| a.bonus_amount)
        .min()
        .unwrap_or(Decimal::ZERO);

    AllocationSummary {
        valid_member_count: count,
        skipped_member_count: skipped,
        default_role_count: allocations.iter().filter(|a| a.default_role_assigned).count(),
        total_weight,
        average_bonus,
        max_bonus,
        min_bonus,
        rounding_drift,
        drift_exceeds_tolerance,
    }
}

/// Holds the pool's `calculating` state for one run. Dropping without
/// [`release`](Self::release) still hands the lease back.
struct CalculationLease<'a> {
    db: &'a DbPool,
    pool_id: String,
    started_at: String,
    released: bool,
}

impl<'a> CalculationLease<'a> {
    fn acquire(db: &'a DbPool, pool: &BonusPoolRecord, lease_seconds: i64) -> AppResult<Self> {
        let now = Utc::now();
        let started_at = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let stale_before =
            (now - Duration::seconds(lease_seconds)).to_rfc3339_opts(SecondsFormat::Micros, true);

        let acquired = db.with_connection(|conn| {
            BonusPoolRepository::try_acquire_calculation(conn, &pool.id, &started_at, &stale_before)
        })?;

        if !acquired {
            let current = db
                .with_connection(|conn| BonusPoolRepository::find_by_id(conn, &pool.id))?
                .map(BonusPoolRow::into_record)
                .transpose()?
                .ok_or_else(|| AppError::not_found("奖金池", &pool.id))?;
            ensure_calculable(&current)?;
            return Err(AppError::conflict(format!(
                "奖金池 {} 正在计算中 (开始于 {})",
                pool.id,
                current.calculation_started_at.as_deref().unwrap_or("未知时间")
            )));
        }

        debug!(target: "app::bonus", pool_id = %pool.id, %started_at, "calculation lease acquired");
        Ok(Self {
            db,
            pool_id: pool.id.clone(),
            started_at,
            released: false,
        })
    }

    fn release(mut self) -> AppResult<()> {
        self.released = true;
        let released = self.db.with_connection(|conn| {
            BonusPoolRepository::release_calculation(conn, &self.pool_id, &self.started_at)
        })?;
        if !released {
            warn!(
                target: "app::bonus",
                pool_id = %self.pool_id,
                started_at = %self.started_at,
                "calculation lease was taken over before release"
            );
        }
        Ok(())
    }
}

impl Drop for CalculationLease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let result = self.db.with_connection(|conn| {
            BonusPoolRepository::release_calculation(conn, &self.pool_id, &self.started_at)
        });
        if let Err(err) = result {
            warn!(
                target: "app::bonus",
                pool_id = %self.pool_id,
                error = %err,
                "failed to release calculation lease"
            );
        }
    }
}
