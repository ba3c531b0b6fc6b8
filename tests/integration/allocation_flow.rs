// End-to-end allocation runs through the service layer

mod common;

use std::collections::BTreeMap;

use common::{Fixture, PERIOD};
use hr_bonus_lib::models::bonus::AllocationStatus;
use hr_bonus_lib::models::performance::CoefficientSource;
use hr_bonus_lib::models::project::MemberStatus;
use hr_bonus_lib::models::role_weight::DEFAULT_ROLE_KEY;
use rust_decimal::Decimal;

fn approx(left: f64, right: f64) -> bool {
    (left - right).abs() < 1e-9
}

#[test]
fn weighted_split_of_reference_pool() {
    let fx = Fixture::new();
    let project = fx.project("ALPHA");
    let (lead, lead_member) = fx.active_member(&project.id, "E001", Some("tech_lead"));
    let (_dev, dev_member) = fx.active_member(&project.id, "E002", Some("developer"));
    fx.assessment(&lead.id, PERIOD, 85.0);
    let pool = fx.bonus_pool(&project.id, Decimal::new(150_000, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");

    assert_eq!(result.allocations.len(), 2);
    let by_member: BTreeMap<_, _> = result
        .allocations
        .iter()
        .map(|allocation| (allocation.member_id.clone(), allocation))
        .collect();

    let lead_share = by_member[&lead_member.id];
    assert_eq!(lead_share.bonus_amount, Decimal::new(9_339_623, 2));
    assert!(approx(lead_share.performance_coeff, 1.1));
    assert_eq!(lead_share.coefficient_source, CoefficientSource::Exact);
    assert!(approx(lead_share.calculated_weight, 3.3));

    let dev_share = by_member[&dev_member.id];
    assert_eq!(dev_share.bonus_amount, Decimal::new(5_660_377, 2));
    assert!(approx(dev_share.performance_coeff, 1.0));
    assert_eq!(dev_share.coefficient_source, CoefficientSource::Neutral);

    assert_eq!(result.total_allocated, Decimal::new(150_000, 0));
    assert!(result.summary.rounding_drift.is_zero());
    assert!(!result.summary.drift_exceeds_tolerance);
    assert_eq!(result.summary.valid_member_count, 2);
    assert!(result.pool.last_calculated_at.is_some());
    assert_eq!(fx.live_allocation_count(&pool.id), 2);
}

#[test]
fn member_without_role_uses_default_weight() {
    let fx = Fixture::new();
    let project = fx.project("BETA");
    fx.active_member(&project.id, "E001", None);
    fx.active_member(&project.id, "E002", Some("not_a_known_role"));
    fx.active_member(&project.id, "E003", Some("developer"));
    let pool = fx.bonus_pool(&project.id, Decimal::new(5_000, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");

    let defaulted: Vec<_> = result
        .allocations
        .iter()
        .filter(|allocation| allocation.default_role_assigned)
        .collect();
    assert_eq!(defaulted.len(), 2);
    assert!(defaulted.iter().all(|allocation| approx(allocation.role_weight, 1.5)));
    assert!(defaulted
        .iter()
        .any(|allocation| allocation.role_id == DEFAULT_ROLE_KEY));
    assert!(defaulted
        .iter()
        .any(|allocation| allocation.role_id == "not_a_known_role"));
    assert_eq!(result.summary.default_role_count, 2);
}

#[test]
fn other_period_assessment_is_discounted() {
    let fx = Fixture::new();
    let project = fx.project("GAMMA");
    let (employee, _) = fx.active_member(&project.id, "E001", Some("developer"));
    fx.active_member(&project.id, "E002", Some("developer"));
    fx.assessment(&employee.id, "2023-Q4", 92.0);
    let pool = fx.bonus_pool(&project.id, Decimal::new(10_000, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");
    let fallback = result
        .allocations
        .iter()
        .find(|allocation| allocation.employee_id == employee.id)
        .expect("allocation for assessed employee");

    assert_eq!(fallback.coefficient_source, CoefficientSource::Fallback);
    assert!(approx(fallback.performance_coeff, 1.2 * 0.95));
}

#[test]
fn low_fallback_score_is_floored() {
    let fx = Fixture::new();
    let employee = fx.employee("E001");
    fx.assessment(&employee.id, "2023-Q4", 40.0);

    let resolution = fx
        .state
        .performance()
        .resolve_coefficient(&employee.id, PERIOD);
    assert_eq!(resolution.source, CoefficientSource::Fallback);
    assert!(approx(resolution.coefficient, 0.9));
}

#[test]
fn only_participating_members_are_paid() {
    let fx = Fixture::new();
    let project = fx.project("DELTA");
    let (_, active) = fx.active_member(&project.id, "E001", Some("developer"));
    let pending = fx.employee("E002");
    fx.member(&project.id, &pending.id, Some("developer"), MemberStatus::Pending, None);
    let approved = fx.employee("E003");
    let approved_member = fx.member(
        &project.id,
        &approved.id,
        Some("developer"),
        MemberStatus::Approved,
        None,
    );
    let (_, removed) = fx.active_member(&project.id, "E004", Some("developer"));
    fx.state
        .projects()
        .remove_member(&removed.id)
        .expect("remove member");
    let pool = fx.bonus_pool(&project.id, Decimal::new(1_000, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");

    let mut paid: Vec<_> = result
        .allocations
        .iter()
        .map(|allocation| allocation.member_id.clone())
        .collect();
    paid.sort();
    let mut expected = vec![active.id, approved_member.id];
    expected.sort();
    assert_eq!(paid, expected);
    assert!(result
        .allocations
        .iter()
        .all(|allocation| allocation.bonus_amount == Decimal::new(500, 0)));
}

#[test]
fn participation_ratio_scales_share() {
    let fx = Fixture::new();
    let project = fx.project("EPS");
    let full = fx.employee("E001");
    let half = fx.employee("E002");
    fx.member(&project.id, &full.id, Some("developer"), MemberStatus::Active, Some(1.0));
    fx.member(&project.id, &half.id, Some("developer"), MemberStatus::Active, Some(0.5));
    let pool = fx.bonus_pool(&project.id, Decimal::new(3_000, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");
    let amount_of = |employee_id: &str| {
        result
            .allocations
            .iter()
            .find(|allocation| allocation.employee_id == employee_id)
            .map(|allocation| allocation.bonus_amount)
            .expect("allocation")
    };

    assert_eq!(amount_of(&full.id), Decimal::new(2_000, 0));
    assert_eq!(amount_of(&half.id), Decimal::new(1_000, 0));
}

#[test]
fn project_role_weights_override_defaults() {
    let fx = Fixture::new();
    let project = fx.project("ZETA");
    let (_, designer) = fx.active_member(&project.id, "E001", Some("designer"));
    fx.active_member(&project.id, "E002", Some("developer"));
    fx.state
        .role_weights()
        .upsert_config(
            &project.id,
            BTreeMap::from([("designer".to_string(), 2.0)]),
        )
        .expect("override weights");
    let pool = fx.bonus_pool(&project.id, Decimal::new(800, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");

    assert!(result
        .allocations
        .iter()
        .all(|allocation| allocation.bonus_amount == Decimal::new(400, 0)));
    let designer_share = result
        .allocations
        .iter()
        .find(|allocation| allocation.member_id == designer.id)
        .expect("designer allocation");
    assert!(approx(designer_share.role_weight, 2.0));
}

#[test]
fn rounding_drift_is_reported() {
    let fx = Fixture::new();
    let project = fx.project("ETA");
    for no in ["E001", "E002", "E003"] {
        fx.active_member(&project.id, no, Some("developer"));
    }
    let pool = fx.bonus_pool(&project.id, Decimal::new(100, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");

    assert!(result
        .allocations
        .iter()
        .all(|allocation| allocation.bonus_amount == Decimal::new(3_333, 2)));
    assert_eq!(result.total_allocated, Decimal::new(9_999, 2));
    assert_eq!(result.summary.rounding_drift, Decimal::new(-1, 2));
    assert!(!result.summary.drift_exceeds_tolerance);
}

#[test]
fn recalculation_replaces_pending_batch() {
    let fx = Fixture::new();
    let project = fx.project("THETA");
    fx.active_member(&project.id, "E001", Some("developer"));
    fx.active_member(&project.id, "E002", Some("tester"));
    let pool = fx.bonus_pool(&project.id, Decimal::new(20_000, 0));
    let calculator = fx.state.calculator();

    let first = calculator.calculate(&pool.id).expect("first run");
    let second = calculator.calculate(&pool.id).expect("second run");

    assert_eq!(fx.live_allocation_count(&pool.id), 2);
    let history = fx
        .state
        .bonus_pools()
        .list_allocations(&pool.id, true)
        .expect("list with deleted");
    assert_eq!(history.len(), 4);
    for old in &first.allocations {
        let stored = history
            .iter()
            .find(|allocation| allocation.id == old.id)
            .expect("first batch kept for history");
        assert_eq!(stored.status, AllocationStatus::Deleted);
    }
    let live = fx
        .state
        .bonus_pools()
        .list_allocations(&pool.id, false)
        .expect("list live");
    let mut live_ids: Vec<_> = live.iter().map(|allocation| allocation.id.clone()).collect();
    let mut second_ids: Vec<_> = second
        .allocations
        .iter()
        .map(|allocation| allocation.id.clone())
        .collect();
    live_ids.sort();
    second_ids.sort();
    assert_eq!(live_ids, second_ids);

    // Same inputs, same outcome.
    assert_eq!(first.summary.total_weight, second.summary.total_weight);
    let shares = |allocations: &[hr_bonus_lib::models::bonus::BonusAllocationRecord]| {
        allocations
            .iter()
            .map(|allocation| (allocation.member_id.clone(), allocation.bonus_amount))
            .collect::<BTreeMap<_, _>>()
    };
    assert_eq!(shares(&first.allocations[..]), shares(&second.allocations[..]));
}

#[test]
fn many_rounding_ties_stay_within_tolerance() {
    let fx = Fixture::new();
    let project = fx.project("SEVEN");
    for index in 1..=7 {
        fx.active_member(&project.id, &format!("E{index:03}"), Some("developer"));
    }
    let pool = fx.bonus_pool(&project.id, Decimal::new(100, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");

    assert_eq!(result.allocations.len(), 7);
    assert!(result
        .allocations
        .iter()
        .all(|allocation| allocation.bonus_amount == Decimal::new(1_429, 2)));
    assert_eq!(result.total_allocated, Decimal::new(10_003, 2));
    assert_eq!(result.summary.rounding_drift, Decimal::new(3, 2));
    assert!(result.summary.rounding_drift.abs() <= Decimal::ONE);
    assert!(!result.summary.drift_exceeds_tolerance);
}

#[test]
fn preview_leaves_storage_untouched() {
    let fx = Fixture::new();
    let project = fx.project("IOTA");
    fx.active_member(&project.id, "E001", Some("developer"));
    let pool = fx.bonus_pool(&project.id, Decimal::new(1_234, 0));

    let preview = fx.state.calculator().preview(&pool.id).expect("preview");

    assert_eq!(preview.allocations.len(), 1);
    assert_eq!(preview.allocations[0].bonus_amount, Decimal::new(1_234, 0));
    assert_eq!(fx.live_allocation_count(&pool.id), 0);
    let stored = fx.state.bonus_pools().get_pool(&pool.id).expect("pool");
    assert!(stored.last_calculated_at.is_none());
}

#[test]
fn member_without_employee_record_is_skipped() {
    let fx = Fixture::new();
    let project = fx.project("KAPPA");
    fx.active_member(&project.id, "E001", Some("developer"));
    fx.pool
        .with_connection(|conn| {
            conn.execute(
                "INSERT INTO project_members (id, project_id, employee_id, role_id, status, participation_ratio, created_at, updated_at)
                 VALUES ('ghost-member', ?1, 'ghost-employee', 'developer', 'active', NULL, datetime('now'), datetime('now'))",
                [&project.id],
            )?;
            Ok(())
        })
        .expect("insert orphan member");
    let pool = fx.bonus_pool(&project.id, Decimal::new(900, 0));

    let result = fx.state.calculator().calculate(&pool.id).expect("calculate");

    assert_eq!(result.allocations.len(), 1);
    assert_eq!(result.allocations[0].bonus_amount, Decimal::new(900, 0));
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].member_id, "ghost-member");
    assert_eq!(result.summary.skipped_member_count, 1);
}

#[test]
fn calculation_is_audited() {
    let fx = Fixture::new();
    let project = fx.project("LAMBDA");
    fx.active_member(&project.id, "E001", Some("developer"));
    let pool = fx.bonus_pool(&project.id, Decimal::new(500, 0));

    fx.state.calculator().calculate(&pool.id).expect("calculate");

    let audit = fx
        .state
        .bonus_pools()
        .list_audit("bonus_pool", &pool.id)
        .expect("audit");
    let actions: Vec<_> = audit.iter().map(|entry| entry.action.as_str()).collect();
    assert_eq!(actions, vec!["create", "calculate"]);
    let details = audit[1].details.as_ref().expect("details");
    assert_eq!(details["memberCount"], 1);
    let total: Decimal = details["totalAllocated"]
        .as_str()
        .expect("amount string")
        .parse()
        .expect("decimal");
    assert_eq!(total, Decimal::new(500, 0));
}
