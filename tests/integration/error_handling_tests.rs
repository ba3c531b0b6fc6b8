// Error handling and edge case tests

mod common;

use common::{Fixture, PERIOD};
use hr_bonus_lib::commands::bonus::{bonus_pool_calculate, bonus_pool_get};
use hr_bonus_lib::commands::directory::project_create;
use hr_bonus_lib::commands::respond;
use hr_bonus_lib::error::AppError;
use hr_bonus_lib::models::performance::AssessmentCreateInput;
use hr_bonus_lib::models::project::{MemberStatus, ProjectCreateInput};
use hr_bonus_lib::models::settings::AllocationSettingsUpdate;
use rust_decimal::Decimal;

#[test]
fn no_eligible_members_reports_status_histogram() {
    let fx = Fixture::new();
    let project = fx.project("EMPTY");
    for no in ["E001", "E002"] {
        let employee = fx.employee(no);
        fx.member(&project.id, &employee.id, Some("developer"), MemberStatus::Pending, None);
    }
    let (_, removed) = fx.active_member(&project.id, "E003", Some("developer"));
    fx.state.projects().remove_member(&removed.id).expect("remove");
    let pool = fx.bonus_pool(&project.id, Decimal::new(1_000, 0));

    let err = fx
        .state
        .calculator()
        .calculate(&pool.id)
        .expect_err("nobody eligible");

    assert!(matches!(err, AppError::Validation { .. }));
    let message = err.to_string();
    assert!(message.contains("pending=2"), "{message}");
    assert!(message.contains("removed=1"), "{message}");
    let details = err.details().expect("details");
    assert_eq!(details["statusHistogram"]["pending"], 2);
    assert_eq!(details["statusHistogram"]["removed"], 1);
    assert_eq!(fx.live_allocation_count(&pool.id), 0);
}

#[test]
fn project_without_members_cannot_be_calculated() {
    let fx = Fixture::new();
    let project = fx.project("LONELY");
    let pool = fx.bonus_pool(&project.id, Decimal::new(1_000, 0));

    let err = fx
        .state
        .calculator()
        .calculate(&pool.id)
        .expect_err("no members");
    assert!(matches!(err, AppError::Validation { .. }));
}

#[test]
fn zero_participation_leaves_nothing_to_split() {
    let fx = Fixture::new();
    let project = fx.project("IDLE");
    let employee = fx.employee("E001");
    fx.member(&project.id, &employee.id, Some("developer"), MemberStatus::Active, Some(0.0));
    let pool = fx.bonus_pool(&project.id, Decimal::new(1_000, 0));

    let err = fx
        .state
        .calculator()
        .calculate(&pool.id)
        .expect_err("zero total weight");
    assert!(matches!(err, AppError::Validation { .. }));

    let refreshed = fx.state.bonus_pools().get_pool(&pool.id).expect("pool");
    assert!(refreshed.calculation_started_at.is_none());
}

#[test]
fn malformed_stored_amount_is_a_validation_error() {
    let fx = Fixture::new();
    let project = fx.project("CORRUPT");
    fx.active_member(&project.id, "E001", Some("developer"));
    let pool = fx.bonus_pool(&project.id, Decimal::new(1_000, 0));
    fx.pool
        .with_connection(|conn| {
            conn.execute(
                "UPDATE bonus_pools SET total_amount = 'twelve' WHERE id = ?1",
                [&pool.id],
            )?;
            Ok(())
        })
        .expect("corrupt amount");

    let read = fx.state.bonus_pools().get_pool(&pool.id);
    assert!(matches!(read, Err(AppError::Validation { .. })));
    let calculated = fx.state.calculator().calculate(&pool.id);
    assert!(matches!(calculated, Err(AppError::Validation { .. })));
}

#[test]
fn out_of_range_stored_ratio_is_a_validation_error() {
    let fx = Fixture::new();
    let project = fx.project("RATIO");
    let (_, member) = fx.active_member(&project.id, "E001", Some("developer"));
    fx.pool
        .with_connection(|conn| {
            conn.execute(
                "UPDATE project_members SET participation_ratio = 1.5 WHERE id = ?1",
                [&member.id],
            )?;
            Ok(())
        })
        .expect("corrupt ratio");
    let pool = fx.bonus_pool(&project.id, Decimal::new(1_000, 0));

    let err = fx
        .state
        .calculator()
        .calculate(&pool.id)
        .expect_err("bad ratio");
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(fx.live_allocation_count(&pool.id), 0);
}

#[test]
fn member_cap_is_enforced() {
    let fx = Fixture::new();
    let project = fx.project("CROWD");
    for no in ["E001", "E002", "E003"] {
        fx.active_member(&project.id, no, Some("developer"));
    }
    fx.state
        .settings()
        .update_allocation(AllocationSettingsUpdate {
            max_members_per_run: Some(2),
            ..Default::default()
        })
        .expect("lower cap");
    let pool = fx.bonus_pool(&project.id, Decimal::new(3_000, 0));

    let err = fx
        .state
        .calculator()
        .calculate(&pool.id)
        .expect_err("too many members");
    assert_eq!(err.details().expect("details")["maxMembersPerRun"], 2);
}

#[test]
fn unknown_pool_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .state
        .calculator()
        .calculate("missing-pool")
        .expect_err("missing pool");
    assert!(err.is_not_found());

    let listing = fx.state.bonus_pools().list_allocations("missing-pool", false);
    assert!(matches!(listing, Err(AppError::NotFound { .. })));
}

#[test]
fn assessment_rules_are_enforced() {
    let fx = Fixture::new();
    let employee = fx.employee("E001");
    let performance = fx.state.performance();

    let out_of_range = performance.create_assessment(AssessmentCreateInput {
        employee_id: employee.id.clone(),
        period: PERIOD.into(),
        final_score: 101.0,
        evaluated_at: None,
    });
    assert!(matches!(out_of_range, Err(AppError::Validation { .. })));

    fx.assessment(&employee.id, PERIOD, 88.0);
    let duplicate = performance.create_assessment(AssessmentCreateInput {
        employee_id: employee.id.clone(),
        period: PERIOD.into(),
        final_score: 70.0,
        evaluated_at: None,
    });
    assert!(matches!(duplicate, Err(AppError::Conflict { .. })));

    let orphan = performance.create_assessment(AssessmentCreateInput {
        employee_id: "nobody".into(),
        period: PERIOD.into(),
        final_score: 70.0,
        evaluated_at: None,
    });
    assert!(matches!(orphan, Err(AppError::NotFound { .. })));
}

#[tokio::test]
async fn command_envelope_carries_validation_details() {
    let fx = Fixture::new();
    let project = fx.project("ENVELOPE");
    let employee = fx.employee("E001");
    fx.member(&project.id, &employee.id, None, MemberStatus::Pending, None);
    let pool = fx.bonus_pool(&project.id, Decimal::new(1_000, 0));

    let (status, envelope) = respond(bonus_pool_calculate(&fx.state, pool.id.clone()).await);

    assert_eq!(status, 400);
    assert!(!envelope.success);
    assert!(envelope.data.is_none());
    assert_eq!(envelope.code.as_deref(), Some("VALIDATION_ERROR"));
    let details = envelope.details.expect("details");
    assert_eq!(details["statusHistogram"]["pending"], 1);
    assert_eq!(details["projectId"], project.id.as_str());
}

#[tokio::test]
async fn command_envelope_maps_missing_and_duplicate() {
    let fx = Fixture::new();

    let (status, envelope) = respond(bonus_pool_get(&fx.state, "nope".into()).await);
    assert_eq!(status, 404);
    assert_eq!(envelope.code.as_deref(), Some("NOT_FOUND"));

    let input = ProjectCreateInput {
        code: "DUP".into(),
        name: "重复项目".into(),
        ..Default::default()
    };
    let (status, envelope) = respond(project_create(&fx.state, input.clone()).await);
    assert_eq!(status, 200);
    assert!(envelope.success);
    assert_eq!(envelope.data.expect("project").code, "DUP");

    let (status, envelope) = respond(project_create(&fx.state, input).await);
    assert_eq!(status, 409);
    assert_eq!(envelope.code.as_deref(), Some("CONFLICT"));
}
