use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::db::repositories::project_repository::{ProjectMemberRow, ProjectRepository};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::project::ProjectMemberRecord;

/// Outcome of screening a project's members for allocation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityReport {
    pub eligible: Vec<ProjectMemberRecord>,
    /// Member count per stored status, eligible or not.
    pub status_histogram: BTreeMap<String, usize>,
    pub rejected_by_status: usize,
    pub missing_employee_count: usize,
    /// Eligible members that will fall back to the default role.
    pub missing_role_count: usize,
}

impl EligibilityReport {
    pub fn total_members(&self) -> usize {
        self.status_histogram.values().sum()
    }

    /// Fails with the full status histogram when nobody qualifies.
    pub fn ensure_any(&self, project_id: &str) -> AppResult<()> {
        if !self.eligible.is_empty() {
            return Ok(());
        }

        let histogram = if self.status_histogram.is_empty() {
            "无成员".to_string()
        } else {
            self.status_histogram
                .iter()
                .map(|(status, count)| format!("{status}={count}"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        Err(AppError::validation_with_details(
            format!("项目 {project_id} 没有符合分配条件的成员 (成员状态分布: {histogram})"),
            serde_json::json!({
                "projectId": project_id,
                "statusHistogram": self.status_histogram,
                "missingEmployeeCount": self.missing_employee_count,
            }),
        ))
    }
}

pub struct MemberEligibilityFilter {
    db: DbPool,
}

impl MemberEligibilityFilter {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn select_eligible(&self, project_id: &str) -> AppResult<EligibilityReport> {
        let rows = self
            .db
            .with_connection(|conn| ProjectRepository::list_members(conn, project_id))?;
        let members = rows
            .into_iter()
            .map(ProjectMemberRow::into_record)
            .collect::<AppResult<Vec<_>>>()?;

        let report = screen(members);
        debug!(
            target: "app::bonus",
            project_id,
            eligible = report.eligible.len(),
            total = report.total_members(),
            rejected_by_status = report.rejected_by_status,
            missing_employee = report.missing_employee_count,
            "member eligibility screened"
        );
        Ok(report)
    }
}

/// Keeps members with an employee reference and a participating status, preserving order.
pub fn screen(members: Vec<ProjectMemberRecord>) -> EligibilityReport {
    let mut report = EligibilityReport {
        eligible: Vec::new(),
        status_histogram: BTreeMap::new(),
        rejected_by_status: 0,
        missing_employee_count: 0,
        missing_role_count: 0,
    };

    for member in members {
        *report
            .status_histogram
            .entry(member.status.as_str().to_string())
            .or_insert(0) += 1;

        if !member.status.participates_in_allocation() {
            report.rejected_by_status += 1;
            continue;
        }
        if member.employee_id.is_none() {
            report.missing_employee_count += 1;
            continue;
        }
        if member.role_id.is_none() {
            report.missing_role_count += 1;
        }
        report.eligible.push(member);
    }

    report
}
