use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::employee_repository::EmployeeRepository;
use crate::db::repositories::project_repository::{ProjectMemberRow, ProjectRepository, ProjectRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::project::{
    MemberCreateInput, MemberStatus, MemberUpdateInput, ProjectCreateInput, ProjectMemberRecord,
    ProjectRecord, ProjectStatus, ProjectUpdateInput,
};

#[derive(Clone)]
pub struct ProjectService {
    db: DbPool,
}

impl ProjectService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn create_project(&self, input: ProjectCreateInput) -> AppResult<ProjectRecord> {
        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(AppError::validation("项目编号不能为空"));
        }
        let name = normalize_name(&input.name)?;
        let now = Utc::now().to_rfc3339();
        let record = ProjectRecord {
            id: Uuid::new_v4().to_string(),
            code,
            name,
            status: input.status.unwrap_or(ProjectStatus::Active),
            manager_id: normalize_optional_string(input.manager_id),
            created_at: now.clone(),
            updated_at: now,
        };

        // A duplicate code trips the unique index and surfaces as a conflict.
        self.db
            .with_connection(|conn| ProjectRepository::insert(conn, &ProjectRow::from_record(&record)))?;
        info!(target: "app::project", project_id = %record.id, code = %record.code, "project created");
        Ok(record)
    }

    pub fn get_project(&self, id: &str) -> AppResult<ProjectRecord> {
        self.db
            .with_connection(|conn| ProjectRepository::find_by_id(conn, id))?
            .ok_or_else(|| AppError::not_found("项目", id))?
            .into_record()
    }

    pub fn list_projects(&self) -> AppResult<Vec<ProjectRecord>> {
        let rows = self.db.with_connection(ProjectRepository::list)?;
        rows.into_iter().map(ProjectRow::into_record).collect()
    }

    pub fn update_project(&self, id: &str, update: ProjectUpdateInput) -> AppResult<ProjectRecord> {
        let mut record = self.get_project(id)?;
        if let Some(name) = update.name {
            record.name = normalize_name(&name)?;
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(manager_id) = update.manager_id {
            record.manager_id = normalize_optional_string(manager_id);
        }
        record.updated_at = Utc::now().to_rfc3339();

        self.db
            .with_connection(|conn| ProjectRepository::update(conn, &ProjectRow::from_record(&record)))?;
        info!(target: "app::project", project_id = %record.id, "project updated");
        Ok(record)
    }

    pub fn add_member(
        &self,
        project_id: &str,
        input: MemberCreateInput,
    ) -> AppResult<ProjectMemberRecord> {
        let employee_id = normalize_optional_string(Some(input.employee_id))
            .ok_or_else(|| AppError::validation("成员员工标识不能为空"))?;
        let participation_ratio = validate_ratio(input.participation_ratio)?;
        let now = Utc::now().to_rfc3339();
        let record = ProjectMemberRecord {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            employee_id: Some(employee_id),
            role_id: normalize_optional_string(input.role_id),
            status: input.status.unwrap_or(MemberStatus::Pending),
            participation_ratio,
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.with_transaction(|conn| {
            if !ProjectRepository::exists(conn, project_id)? {
                return Err(AppError::not_found("项目", project_id));
            }
            if let Some(employee_id) = record.employee_id.as_deref() {
                if !EmployeeRepository::exists(conn, employee_id)? {
                    return Err(AppError::not_found("员工", employee_id));
                }
            }
            ProjectRepository::insert_member(conn, &ProjectMemberRow::from_record(&record))
        })?;

        info!(
            target: "app::project",
            project_id,
            member_id = %record.id,
            status = record.status.as_str(),
            "project member added"
        );
        Ok(record)
    }

    pub fn get_member(&self, member_id: &str) -> AppResult<ProjectMemberRecord> {
        self.db
            .with_connection(|conn| ProjectRepository::find_member_by_id(conn, member_id))?
            .ok_or_else(|| AppError::not_found("项目成员", member_id))?
            .into_record()
    }

    pub fn update_member(
        &self,
        member_id: &str,
        update: MemberUpdateInput,
    ) -> AppResult<ProjectMemberRecord> {
        let mut record = self.get_member(member_id)?;
        if let Some(role_id) = update.role_id {
            record.role_id = normalize_optional_string(role_id);
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(ratio) = update.participation_ratio {
            record.participation_ratio = validate_ratio(ratio)?;
        }
        record.updated_at = Utc::now().to_rfc3339();

        self.db.with_connection(|conn| {
            ProjectRepository::update_member(conn, &ProjectMemberRow::from_record(&record))
        })?;
        info!(
            target: "app::project",
            member_id = %record.id,
            status = record.status.as_str(),
            "project member updated"
        );
        Ok(record)
    }

    /// Marks the member as removed; the row stays for history.
    pub fn remove_member(&self, member_id: &str) -> AppResult<ProjectMemberRecord> {
        self.update_member(
            member_id,
            MemberUpdateInput {
                status: Some(MemberStatus::Removed),
                ..Default::default()
            },
        )
    }

    pub fn list_members(&self, project_id: &str) -> AppResult<Vec<ProjectMemberRecord>> {
        let rows = self
            .db
            .with_connection(|conn| ProjectRepository::list_members(conn, project_id))?;
        let members = rows
            .into_iter()
            .map(ProjectMemberRow::into_record)
            .collect::<AppResult<Vec<_>>>()?;
        debug!(target: "app::project", project_id, count = members.len(), "project members listed");
        Ok(members)
    }
}

fn normalize_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("项目名称不能为空"));
    }
    if trimmed.chars().count() > 120 {
        return Err(AppError::validation("项目名称长度需在 120 字以内"));
    }
    Ok(trimmed.to_string())
}

fn validate_ratio(ratio: Option<f64>) -> AppResult<Option<f64>> {
    match ratio {
        Some(value) if !value.is_finite() || !(0.0..=1.0).contains(&value) => Err(
            AppError::validation(format!("参与比例需在 0 到 1 之间: {value}")),
        ),
        other => Ok(other),
    }
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value.and_then(|val| {
        let trimmed = val.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
