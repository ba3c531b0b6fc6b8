use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::project::{MemberStatus, ProjectMemberRecord, ProjectRecord, ProjectStatus};

const PROJECT_SELECT: &str = r#"
    SELECT id, code, name, status, manager_id, created_at, updated_at
    FROM projects
"#;

const MEMBER_SELECT: &str = r#"
    SELECT
        id,
        project_id,
        employee_id,
        role_id,
        status,
        participation_ratio,
        created_at,
        updated_at
    FROM project_members
"#;

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub status: String,
    pub manager_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProjectRow {
    pub fn from_record(record: &ProjectRecord) -> Self {
        Self {
            id: record.id.clone(),
            code: record.code.clone(),
            name: record.name.clone(),
            status: record.status.as_str().to_string(),
            manager_id: record.manager_id.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<ProjectRecord> {
        let status = ProjectStatus::from_str(&self.status).map_err(|message| {
            AppError::validation(format!("项目 {} 状态数据非法: {message}", self.id))
        })?;
        Ok(ProjectRecord {
            id: self.id,
            code: self.code,
            name: self.name,
            status,
            manager_id: self.manager_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for ProjectRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            name: row.get("name")?,
            status: row.get("status")?,
            manager_id: row.get("manager_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProjectMemberRow {
    pub id: String,
    pub project_id: String,
    pub employee_id: Option<String>,
    pub role_id: Option<String>,
    pub status: String,
    pub participation_ratio: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProjectMemberRow {
    pub fn from_record(record: &ProjectMemberRecord) -> Self {
        Self {
            id: record.id.clone(),
            project_id: record.project_id.clone(),
            employee_id: record.employee_id.clone(),
            role_id: record.role_id.clone(),
            status: record.status.as_str().to_string(),
            participation_ratio: record.participation_ratio,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    /// Converts the stored row, rejecting statuses and ratios that cannot be trusted.
    pub fn into_record(self) -> AppResult<ProjectMemberRecord> {
        let status = MemberStatus::from_str(&self.status).map_err(|message| {
            AppError::validation(format!("项目成员 {} 状态数据非法: {message}", self.id))
        })?;

        if let Some(ratio) = self.participation_ratio {
            if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
                return Err(AppError::validation_with_details(
                    format!("项目成员 {} 的参与比例非法: {ratio}", self.id),
                    serde_json::json!({ "memberId": self.id, "participationRatio": ratio.to_string() }),
                ));
            }
        }

        Ok(ProjectMemberRecord {
            id: self.id,
            project_id: self.project_id,
            employee_id: self
                .employee_id
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            role_id: self
                .role_id
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            status,
            participation_ratio: self.participation_ratio,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for ProjectMemberRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            employee_id: row.get("employee_id")?,
            role_id: row.get("role_id")?,
            status: row.get("status")?,
            participation_ratio: row.get("participation_ratio")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct ProjectRepository;

impl ProjectRepository {
    pub fn insert(conn: &Connection, row: &ProjectRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO projects (id, code, name, status, manager_id, created_at, updated_at)
                VALUES (:id, :code, :name, :status, :manager_id, :created_at, :updated_at)
            "#,
            named_params! {
                ":id": &row.id,
                ":code": &row.code,
                ":name": &row.name,
                ":status": &row.status,
                ":manager_id": &row.manager_id,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, row: &ProjectRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE projects SET
                    name = :name,
                    status = :status,
                    manager_id = :manager_id,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":status": &row.status,
                ":manager_id": &row.manager_id,
                ":updated_at": &row.updated_at,
            },
        )?;
        if affected == 0 {
            return Err(AppError::not_found("项目", &row.id));
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<ProjectRow>> {
        let sql = format!("{PROJECT_SELECT} WHERE id = :id");
        let row = conn
            .query_row(&sql, named_params! {":id": id}, |row| {
                ProjectRow::try_from(row)
            })
            .optional()?;
        Ok(row)
    }

    pub fn exists(conn: &Connection, id: &str) -> AppResult<bool> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM projects WHERE id = ?1", [id], |row| {
                row.get(0)
            })?;
        Ok(count > 0)
    }

    pub fn list(conn: &Connection) -> AppResult<Vec<ProjectRow>> {
        let sql = format!("{PROJECT_SELECT} ORDER BY code ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| ProjectRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_member(conn: &Connection, row: &ProjectMemberRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO project_members (
                    id, project_id, employee_id, role_id, status, participation_ratio,
                    created_at, updated_at
                ) VALUES (
                    :id, :project_id, :employee_id, :role_id, :status, :participation_ratio,
                    :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":project_id": &row.project_id,
                ":employee_id": &row.employee_id,
                ":role_id": &row.role_id,
                ":status": &row.status,
                ":participation_ratio": &row.participation_ratio,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update_member(conn: &Connection, row: &ProjectMemberRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE project_members SET
                    role_id = :role_id,
                    status = :status,
                    participation_ratio = :participation_ratio,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":role_id": &row.role_id,
                ":status": &row.status,
                ":participation_ratio": &row.participation_ratio,
                ":updated_at": &row.updated_at,
            },
        )?;
        if affected == 0 {
            return Err(AppError::not_found("项目成员", &row.id));
        }
        Ok(())
    }

    pub fn find_member_by_id(conn: &Connection, id: &str) -> AppResult<Option<ProjectMemberRow>> {
        let sql = format!("{MEMBER_SELECT} WHERE id = :id");
        let row = conn
            .query_row(&sql, named_params! {":id": id}, |row| {
                ProjectMemberRow::try_from(row)
            })
            .optional()?;
        Ok(row)
    }

    /// Members of a project in insertion order; the order is stable across runs.
    pub fn list_members(conn: &Connection, project_id: &str) -> AppResult<Vec<ProjectMemberRow>> {
        let sql = format!(
            "{MEMBER_SELECT} WHERE project_id = :project_id ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(named_params! {":project_id": project_id}, |row| {
                ProjectMemberRow::try_from(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
