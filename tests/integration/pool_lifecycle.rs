// Pool status transitions and their cascade onto allocations

mod common;

use common::Fixture;
use hr_bonus_lib::error::AppError;
use hr_bonus_lib::models::audit::ENTITY_BONUS_POOL;
use hr_bonus_lib::models::bonus::{
    AllocationStatus, AllocationUpdateInput, BonusPoolRecord, BonusPoolUpdateInput, PoolStatus,
};
use rust_decimal::Decimal;

fn calculated_pool(fx: &Fixture, code: &str) -> BonusPoolRecord {
    let project = fx.project(code);
    fx.active_member(&project.id, "E001", Some("developer"));
    fx.active_member(&project.id, "E002", Some("tester"));
    let pool = fx.bonus_pool(&project.id, Decimal::new(38_000, 0));
    fx.state.calculator().calculate(&pool.id).expect("calculate");
    pool
}

fn statuses(fx: &Fixture, pool_id: &str) -> Vec<AllocationStatus> {
    fx.state
        .bonus_pools()
        .list_allocations(pool_id, false)
        .expect("list allocations")
        .into_iter()
        .map(|allocation| allocation.status)
        .collect()
}

fn audit_actions(fx: &Fixture, pool_id: &str) -> Vec<String> {
    fx.state
        .bonus_pools()
        .list_audit(ENTITY_BONUS_POOL, pool_id)
        .expect("audit")
        .into_iter()
        .map(|entry| entry.action)
        .collect()
}

#[test]
fn approve_then_distribute_cascades_to_allocations() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "FLOW");
    let service = fx.state.bonus_pools();

    let approved = service.approve_pool(&pool.id, Some("finance")).expect("approve");
    assert_eq!(approved.status, PoolStatus::Approved);
    assert_eq!(approved.approved_by.as_deref(), Some("finance"));
    assert_eq!(statuses(&fx, &pool.id), vec![AllocationStatus::Approved; 2]);

    let distributed = service
        .distribute_pool(&pool.id, Some("payroll"))
        .expect("distribute");
    assert_eq!(distributed.status, PoolStatus::Distributed);
    assert_eq!(statuses(&fx, &pool.id), vec![AllocationStatus::Distributed; 2]);

    assert_eq!(
        audit_actions(&fx, &pool.id),
        vec!["create", "calculate", "approve", "distribute"]
    );
}

#[test]
fn repeated_approval_is_a_no_op() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "TWICE");
    let service = fx.state.bonus_pools();

    service.approve_pool(&pool.id, Some("finance")).expect("approve");
    let total_before = service
        .list_allocations(&pool.id, true)
        .expect("all allocations")
        .len();
    let again = service
        .approve_pool(&pool.id, Some("someone-else"))
        .expect("approve again");

    assert_eq!(again.status, PoolStatus::Approved);
    assert_eq!(again.approved_by.as_deref(), Some("finance"));
    let approvals = audit_actions(&fx, &pool.id)
        .into_iter()
        .filter(|action| action == "approve")
        .count();
    assert_eq!(approvals, 1);
    assert_eq!(fx.live_allocation_count(&pool.id), 2);
    assert_eq!(
        service
            .list_allocations(&pool.id, true)
            .expect("all allocations")
            .len(),
        total_before
    );
}

#[test]
fn distributing_twice_names_current_status() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "PAYOUT");
    let service = fx.state.bonus_pools();
    service.approve_pool(&pool.id, None).expect("approve");
    service.distribute_pool(&pool.id, None).expect("distribute");

    let err = service
        .distribute_pool(&pool.id, None)
        .expect_err("second distribution");
    assert!(matches!(err, AppError::Validation { .. }));
    assert!(err.to_string().contains("distributed"));
}

#[test]
fn distributing_pending_pool_is_rejected() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "EARLY");

    let err = fx
        .state
        .bonus_pools()
        .distribute_pool(&pool.id, None)
        .expect_err("distribute before approval");
    assert!(err.to_string().contains("pending"));
    assert_eq!(err.details().expect("details")["expected"], "approved");
}

#[test]
fn approved_pool_cannot_be_recalculated() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "LOCKED");
    fx.state
        .bonus_pools()
        .approve_pool(&pool.id, None)
        .expect("approve");

    let err = fx
        .state
        .calculator()
        .calculate(&pool.id)
        .expect_err("recalculate approved pool");
    assert!(matches!(err, AppError::Validation { .. }));
    assert!(err.to_string().contains("approved"));
    assert_eq!(statuses(&fx, &pool.id), vec![AllocationStatus::Approved; 2]);
}

#[test]
fn rejection_carries_reason_and_cascades() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "NOPE");

    let rejected = fx
        .state
        .bonus_pools()
        .reject_pool(&pool.id, Some("director"), Some("利润未达标"))
        .expect("reject");

    assert_eq!(rejected.status, PoolStatus::Rejected);
    assert_eq!(statuses(&fx, &pool.id), vec![AllocationStatus::Rejected; 2]);
    let audit = fx
        .state
        .bonus_pools()
        .list_audit(ENTITY_BONUS_POOL, &pool.id)
        .expect("audit");
    let last = audit.last().expect("reject entry");
    assert_eq!(last.action, "reject");
    assert_eq!(last.actor.as_deref(), Some("director"));
    let details = last.details.as_ref().expect("details");
    assert_eq!(details["reason"], "利润未达标");
    assert_eq!(details["allocations"], 2);
}

#[test]
fn deleting_pool_soft_deletes_allocations() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "GONE");
    let service = fx.state.bonus_pools();

    service.delete_pool(&pool.id, Some("hr-admin")).expect("delete");

    assert_eq!(service.get_pool(&pool.id).expect("pool").status, PoolStatus::Deleted);
    assert_eq!(fx.live_allocation_count(&pool.id), 0);
    let history = service
        .list_allocations(&pool.id, true)
        .expect("list with deleted");
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|allocation| allocation.status == AllocationStatus::Deleted));

    let err = service
        .delete_pool(&pool.id, None)
        .expect_err("delete twice");
    assert!(err.to_string().contains("deleted"));
}

#[test]
fn changing_amount_discards_stale_allocations() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "EDIT");
    let service = fx.state.bonus_pools();

    service
        .update_pool(
            &pool.id,
            BonusPoolUpdateInput {
                profit_ratio: Some(Some(0.2)),
                ..Default::default()
            },
            Some("hr-admin"),
        )
        .expect("ratio only");
    assert_eq!(fx.live_allocation_count(&pool.id), 2);

    let updated = service
        .update_pool(
            &pool.id,
            BonusPoolUpdateInput {
                total_amount: Some(Decimal::new(40_000, 0)),
                ..Default::default()
            },
            Some("hr-admin"),
        )
        .expect("new amount");
    assert_eq!(updated.total_amount, Decimal::new(40_000, 0));
    assert_eq!(fx.live_allocation_count(&pool.id), 0);

    let err = service
        .approve_pool(&pool.id, None)
        .expect_err("approve without allocations");
    assert!(matches!(err, AppError::Validation { .. }));
}

#[test]
fn manual_adjustment_is_audited_and_locked_after_approval() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "ADJUST");
    let service = fx.state.bonus_pools();
    let allocation = service
        .list_allocations(&pool.id, false)
        .expect("allocations")
        .remove(0);

    let sub_cent = service.update_allocation(
        &allocation.id,
        AllocationUpdateInput {
            bonus_amount: Some(Decimal::new(10_005, 3)),
            remark: None,
        },
        None,
    );
    assert!(matches!(sub_cent, Err(AppError::Validation { .. })));

    let adjusted = service
        .update_allocation(
            &allocation.id,
            AllocationUpdateInput {
                bonus_amount: Some(Decimal::new(2_000_050, 2)),
                remark: Some(Some("  项目加急补贴  ".into())),
            },
            Some("hr-admin"),
        )
        .expect("adjust");
    assert_eq!(adjusted.bonus_amount, Decimal::new(2_000_050, 2));
    assert_eq!(adjusted.remark.as_deref(), Some("项目加急补贴"));

    let trail = service
        .list_audit("bonus_allocation", &allocation.id)
        .expect("allocation audit");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, "adjust");

    service.approve_pool(&pool.id, None).expect("approve");
    let locked = service.update_allocation(
        &allocation.id,
        AllocationUpdateInput {
            bonus_amount: Some(Decimal::new(1, 0)),
            remark: None,
        },
        None,
    );
    assert!(matches!(locked, Err(AppError::Validation { .. })));
}

#[test]
fn single_allocation_can_be_withdrawn_before_approval() {
    let fx = Fixture::new();
    let pool = calculated_pool(&fx, "WITHDRAW");
    let service = fx.state.bonus_pools();
    let allocation = service
        .list_allocations(&pool.id, false)
        .expect("allocations")
        .remove(0);

    service
        .delete_allocation(&allocation.id, Some("hr-admin"))
        .expect("delete allocation");

    assert_eq!(fx.live_allocation_count(&pool.id), 1);
    assert_eq!(
        service.get_allocation(&allocation.id).expect("allocation").status,
        AllocationStatus::Deleted
    );
    let again = service.delete_allocation(&allocation.id, None);
    assert!(matches!(again, Err(AppError::Validation { .. })));
}
