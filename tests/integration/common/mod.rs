#![allow(dead_code)]

use hr_bonus_lib::commands::AppState;
use hr_bonus_lib::db::DbPool;
use hr_bonus_lib::models::bonus::{BonusPoolCreateInput, BonusPoolRecord};
use hr_bonus_lib::models::directory::{EmployeeCreateInput, EmployeeRecord};
use hr_bonus_lib::models::performance::AssessmentCreateInput;
use hr_bonus_lib::models::project::{
    MemberCreateInput, MemberStatus, ProjectCreateInput, ProjectMemberRecord, ProjectRecord,
};
use rust_decimal::Decimal;
use tempfile::TempDir;

pub const PERIOD: &str = "2024-Q1";

/// One isolated database plus the wired-up services.
pub struct Fixture {
    pub state: AppState,
    pub pool: DbPool,
    _dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let pool = DbPool::new(dir.path().join("bonus.sqlite")).expect("db pool");
        Self {
            state: AppState::new(pool.clone()),
            pool,
            _dir: dir,
        }
    }

    pub fn project(&self, code: &str) -> ProjectRecord {
        self.state
            .projects()
            .create_project(ProjectCreateInput {
                code: code.to_string(),
                name: format!("项目 {code}"),
                ..Default::default()
            })
            .expect("create project")
    }

    pub fn employee(&self, employee_no: &str) -> EmployeeRecord {
        self.state
            .employees()
            .create_employee(EmployeeCreateInput {
                employee_no: employee_no.to_string(),
                name: format!("员工 {employee_no}"),
                ..Default::default()
            })
            .expect("create employee")
    }

    pub fn member(
        &self,
        project_id: &str,
        employee_id: &str,
        role_id: Option<&str>,
        status: MemberStatus,
        participation_ratio: Option<f64>,
    ) -> ProjectMemberRecord {
        self.state
            .projects()
            .add_member(
                project_id,
                MemberCreateInput {
                    employee_id: employee_id.to_string(),
                    role_id: role_id.map(str::to_string),
                    status: Some(status),
                    participation_ratio,
                },
            )
            .expect("add member")
    }

    /// Employee plus an active membership in one call.
    pub fn active_member(
        &self,
        project_id: &str,
        employee_no: &str,
        role_id: Option<&str>,
    ) -> (EmployeeRecord, ProjectMemberRecord) {
        let employee = self.employee(employee_no);
        let member = self.member(project_id, &employee.id, role_id, MemberStatus::Active, None);
        (employee, member)
    }

    pub fn assessment(&self, employee_id: &str, period: &str, score: f64) {
        self.state
            .performance()
            .create_assessment(AssessmentCreateInput {
                employee_id: employee_id.to_string(),
                period: period.to_string(),
                final_score: score,
                evaluated_at: None,
            })
            .expect("create assessment");
    }

    pub fn bonus_pool(&self, project_id: &str, total_amount: Decimal) -> BonusPoolRecord {
        self.state
            .bonus_pools()
            .create_pool(BonusPoolCreateInput {
                project_id: project_id.to_string(),
                period: PERIOD.to_string(),
                total_amount,
                profit_ratio: None,
                created_by: "hr-admin".to_string(),
            })
            .expect("create bonus pool")
    }

    pub fn live_allocation_count(&self, pool_id: &str) -> i64 {
        self.pool
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM bonus_allocations WHERE pool_id = ?1 AND status <> 'deleted'",
                    [pool_id],
                    |row| row.get(0),
                )?)
            })
            .expect("count allocations")
    }
}
