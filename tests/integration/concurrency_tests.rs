// Calculation lease behaviour under contention

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, SecondsFormat, Utc};
use common::Fixture;
use hr_bonus_lib::commands::bonus::bonus_pool_calculate;
use hr_bonus_lib::commands::respond;
use hr_bonus_lib::error::AppError;
use hr_bonus_lib::models::bonus::{BonusPoolRecord, BonusPoolUpdateInput, CalculationState};
use rust_decimal::Decimal;

fn pool_with_members(fx: &Fixture, code: &str, members: usize) -> BonusPoolRecord {
    let project = fx.project(code);
    for index in 0..members {
        fx.active_member(&project.id, &format!("{code}-{index:03}"), Some("developer"));
    }
    fx.bonus_pool(&project.id, Decimal::new(120_000, 0))
}

fn hold_lease(fx: &Fixture, pool_id: &str, age: Duration) {
    let started_at = (Utc::now() - age).to_rfc3339_opts(SecondsFormat::Micros, true);
    fx.pool
        .with_connection(|conn| {
            conn.execute(
                "UPDATE bonus_pools SET calculation_state = 'calculating', calculation_started_at = ?1 WHERE id = ?2",
                [started_at.as_str(), pool_id],
            )?;
            Ok(())
        })
        .expect("hold lease");
}

#[test]
fn live_lease_blocks_calculation_and_edits() {
    let fx = Fixture::new();
    let pool = pool_with_members(&fx, "BUSY", 2);
    hold_lease(&fx, &pool.id, Duration::seconds(5));

    let calculated = fx.state.calculator().calculate(&pool.id);
    assert!(matches!(calculated, Err(AppError::Conflict { .. })));

    let updated = fx.state.bonus_pools().update_pool(
        &pool.id,
        BonusPoolUpdateInput {
            total_amount: Some(Decimal::new(1, 0)),
            ..Default::default()
        },
        None,
    );
    assert!(matches!(updated, Err(AppError::Conflict { .. })));

    let rejected = fx.state.bonus_pools().reject_pool(&pool.id, None, None);
    assert!(matches!(rejected, Err(AppError::Conflict { .. })));
    assert_eq!(fx.live_allocation_count(&pool.id), 0);
}

#[test]
fn abandoned_lease_is_taken_over() {
    let fx = Fixture::new();
    let pool = pool_with_members(&fx, "STALE", 3);
    hold_lease(&fx, &pool.id, Duration::hours(1));

    let result = fx
        .state
        .calculator()
        .calculate(&pool.id)
        .expect("take over stale lease");

    assert_eq!(result.allocations.len(), 3);
    assert_eq!(result.pool.calculation_state, CalculationState::Idle);
    assert!(result.pool.calculation_started_at.is_none());
}

#[test]
fn lease_is_released_after_failed_run() {
    let fx = Fixture::new();
    let project = fx.project("FAIL");
    let pool = fx.bonus_pool(&project.id, Decimal::new(100, 0));

    fx.state
        .calculator()
        .calculate(&pool.id)
        .expect_err("no members");

    let stored = fx.state.bonus_pools().get_pool(&pool.id).expect("pool");
    assert_eq!(stored.calculation_state, CalculationState::Idle);
}

#[test]
fn parallel_runs_leave_one_live_batch() {
    let fx = Fixture::new();
    let members = 12;
    let pool = pool_with_members(&fx, "RACE", members);
    let calculator = fx.state.calculator();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let calculator = Arc::clone(&calculator);
            let barrier = Arc::clone(&barrier);
            let pool_id = pool.id.clone();
            thread::spawn(move || {
                barrier.wait();
                calculator.calculate(&pool_id)
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker thread"))
        .collect();

    let succeeded = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert!(succeeded >= 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(matches!(err, AppError::Conflict { .. }), "unexpected error: {err}");
        }
    }
    assert_eq!(fx.live_allocation_count(&pool.id), members as i64);

    let stored = fx.state.bonus_pools().get_pool(&pool.id).expect("pool");
    assert_eq!(stored.calculation_state, CalculationState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_commands_report_conflict_or_success() {
    let fx = Fixture::new();
    let pool = pool_with_members(&fx, "CMD", 5);

    let (first, second) = tokio::join!(
        bonus_pool_calculate(&fx.state, pool.id.clone()),
        bonus_pool_calculate(&fx.state, pool.id.clone()),
    );

    let statuses = [respond(first).0, respond(second).0];
    assert!(statuses.contains(&200));
    assert!(statuses.iter().all(|status| *status == 200 || *status == 409));
    assert_eq!(fx.live_allocation_count(&pool.id), 5);
}
