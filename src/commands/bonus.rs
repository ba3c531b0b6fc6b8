use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::models::audit::AuditEntryRecord;
use crate::models::bonus::{
    AllocationUpdateInput, BonusAllocationRecord, BonusPoolCreateInput, BonusPoolFilter,
    BonusPoolRecord, BonusPoolUpdateInput, CalculationResult,
};
use crate::models::role_weight::{RoleWeightConfigRecord, RoleWeights};

use super::{run_blocking, ApiResponse, AppState, CommandResult};

/// Who triggered a state change, recorded in the audit trail.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActorContext {
    pub actor: Option<String>,
    pub reason: Option<String>,
}

pub async fn bonus_pool_create(
    state: &AppState,
    input: BonusPoolCreateInput,
) -> CommandResult<BonusPoolRecord> {
    let service = state.bonus_pools();
    let pool = run_blocking(move || service.create_pool(input)).await?;
    Ok(ApiResponse::ok("奖金池创建成功", pool))
}

pub async fn bonus_pool_get(state: &AppState, pool_id: String) -> CommandResult<BonusPoolRecord> {
    let service = state.bonus_pools();
    let pool = run_blocking(move || service.get_pool(&pool_id)).await?;
    Ok(ApiResponse::ok("查询成功", pool))
}

pub async fn bonus_pool_list(
    state: &AppState,
    filter: Option<BonusPoolFilter>,
) -> CommandResult<Vec<BonusPoolRecord>> {
    let service = state.bonus_pools();
    let filter = filter.unwrap_or_default();
    let pools = run_blocking(move || service.list_pools(&filter)).await?;
    debug!(target: "app::command", count = pools.len(), "bonus pools listed");
    Ok(ApiResponse::ok("查询成功", pools))
}

pub async fn bonus_pool_update(
    state: &AppState,
    pool_id: String,
    update: BonusPoolUpdateInput,
    context: Option<ActorContext>,
) -> CommandResult<BonusPoolRecord> {
    let service = state.bonus_pools();
    let context = context.unwrap_or_default();
    let pool =
        run_blocking(move || service.update_pool(&pool_id, update, context.actor.as_deref()))
            .await?;
    Ok(ApiResponse::ok("奖金池已更新", pool))
}

pub async fn bonus_pool_delete(
    state: &AppState,
    pool_id: String,
    context: Option<ActorContext>,
) -> CommandResult<()> {
    let service = state.bonus_pools();
    let context = context.unwrap_or_default();
    run_blocking(move || service.delete_pool(&pool_id, context.actor.as_deref())).await?;
    Ok(ApiResponse::ok("奖金池已删除", ()))
}

pub async fn bonus_pool_calculate(
    state: &AppState,
    pool_id: String,
) -> CommandResult<CalculationResult> {
    let calculator = state.calculator();
    let result = run_blocking(move || calculator.calculate(&pool_id)).await?;
    let message = if result.warnings.is_empty() {
        format!("计算完成，共 {} 名成员参与分配", result.allocations.len())
    } else {
        format!(
            "计算完成，共 {} 名成员参与分配，{} 名成员被跳过",
            result.allocations.len(),
            result.warnings.len()
        )
    };
    Ok(ApiResponse::ok(message, result))
}

pub async fn bonus_pool_preview(
    state: &AppState,
    pool_id: String,
) -> CommandResult<CalculationResult> {
    let calculator = state.calculator();
    let result = run_blocking(move || calculator.preview(&pool_id)).await?;
    Ok(ApiResponse::ok("预览计算完成", result))
}

pub async fn bonus_pool_approve(
    state: &AppState,
    pool_id: String,
    context: Option<ActorContext>,
) -> CommandResult<BonusPoolRecord> {
    let service = state.bonus_pools();
    let context = context.unwrap_or_default();
    let pool =
        run_blocking(move || service.approve_pool(&pool_id, context.actor.as_deref())).await?;
    Ok(ApiResponse::ok("奖金池已审批", pool))
}

pub async fn bonus_pool_reject(
    state: &AppState,
    pool_id: String,
    context: Option<ActorContext>,
) -> CommandResult<BonusPoolRecord> {
    let service = state.bonus_pools();
    let context = context.unwrap_or_default();
    let pool = run_blocking(move || {
        service.reject_pool(
            &pool_id,
            context.actor.as_deref(),
            context.reason.as_deref(),
        )
    })
    .await?;
    Ok(ApiResponse::ok("奖金池已驳回", pool))
}

pub async fn bonus_pool_distribute(
    state: &AppState,
    pool_id: String,
    context: Option<ActorContext>,
) -> CommandResult<BonusPoolRecord> {
    let service = state.bonus_pools();
    let context = context.unwrap_or_default();
    let pool =
        run_blocking(move || service.distribute_pool(&pool_id, context.actor.as_deref())).await?;
    Ok(ApiResponse::ok("奖金已发放", pool))
}

pub async fn bonus_audit_list(
    state: &AppState,
    entity_type: String,
    entity_id: String,
) -> CommandResult<Vec<AuditEntryRecord>> {
    let service = state.bonus_pools();
    let entries = run_blocking(move || service.list_audit(&entity_type, &entity_id)).await?;
    Ok(ApiResponse::ok("查询成功", entries))
}

pub async fn bonus_allocation_list(
    state: &AppState,
    pool_id: String,
    include_deleted: Option<bool>,
) -> CommandResult<Vec<BonusAllocationRecord>> {
    let service = state.bonus_pools();
    let include_deleted = include_deleted.unwrap_or(false);
    let allocations =
        run_blocking(move || service.list_allocations(&pool_id, include_deleted)).await?;
    Ok(ApiResponse::ok("查询成功", allocations))
}

pub async fn bonus_allocation_update(
    state: &AppState,
    allocation_id: String,
    update: AllocationUpdateInput,
    context: Option<ActorContext>,
) -> CommandResult<BonusAllocationRecord> {
    let service = state.bonus_pools();
    let context = context.unwrap_or_default();
    let allocation = run_blocking(move || {
        service.update_allocation(&allocation_id, update, context.actor.as_deref())
    })
    .await?;
    Ok(ApiResponse::ok("分配结果已调整", allocation))
}

pub async fn bonus_allocation_delete(
    state: &AppState,
    allocation_id: String,
    context: Option<ActorContext>,
) -> CommandResult<()> {
    let service = state.bonus_pools();
    let context = context.unwrap_or_default();
    run_blocking(move || service.delete_allocation(&allocation_id, context.actor.as_deref()))
        .await?;
    Ok(ApiResponse::ok("分配结果已删除", ()))
}

/// Effective weights for the project: defaults merged with any stored override.
pub async fn role_weights_get(state: &AppState, project_id: String) -> CommandResult<RoleWeights> {
    let service = state.role_weights();
    let weights = run_blocking(move || Ok(service.resolve_role_weights(&project_id))).await?;
    Ok(ApiResponse::ok("查询成功", weights))
}

pub async fn role_weights_upsert(
    state: &AppState,
    project_id: String,
    weights: BTreeMap<String, f64>,
) -> CommandResult<RoleWeightConfigRecord> {
    let service = state.role_weights();
    let config = run_blocking(move || service.upsert_config(&project_id, weights)).await?;
    Ok(ApiResponse::ok("角色权重已保存", config))
}

pub async fn role_weights_clear(state: &AppState, project_id: String) -> CommandResult<bool> {
    let service = state.role_weights();
    let removed = run_blocking(move || service.clear_config(&project_id)).await?;
    let message = if removed {
        "角色权重已恢复默认"
    } else {
        "项目未配置自定义角色权重"
    };
    Ok(ApiResponse::ok(message, removed))
}
