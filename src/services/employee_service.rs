use chrono::{NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::department_repository::{
    DepartmentRepository, DepartmentRow, RoleRepository, RoleRow,
};
use crate::db::repositories::employee_repository::{EmployeeRepository, EmployeeRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::directory::{
    DepartmentInput, DepartmentRecord, EmployeeCreateInput, EmployeeRecord, EmployeeStatus,
    EmployeeUpdateInput, RoleInput, RoleRecord,
};

const MAX_NAME_CHARS: usize = 80;

/// Employees, departments and project roles.
#[derive(Clone)]
pub struct EmployeeService {
    db: DbPool,
}

impl EmployeeService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn create_employee(&self, input: EmployeeCreateInput) -> AppResult<EmployeeRecord> {
        let now = Utc::now().to_rfc3339();
        let record = EmployeeRecord {
            id: Uuid::new_v4().to_string(),
            employee_no: normalize_required(&input.employee_no, "员工编号不能为空")?,
            name: normalize_name(&input.name, "员工姓名")?,
            email: normalize_email(input.email)?,
            department_id: normalize_optional_string(input.department_id),
            status: input.status.unwrap_or(EmployeeStatus::Active),
            hired_on: normalize_date_opt(input.hired_on)?,
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.with_transaction(|conn| {
            ensure_department(conn, record.department_id.as_deref())?;
            if EmployeeRepository::employee_no_taken(conn, &record.employee_no)? {
                return Err(AppError::conflict(format!(
                    "员工编号已存在: {}",
                    record.employee_no
                )));
            }
            EmployeeRepository::insert(conn, &EmployeeRow::from_record(&record))
        })?;

        info!(target: "app::directory", employee_id = %record.id, "employee created");
        Ok(record)
    }

    pub fn get_employee(&self, id: &str) -> AppResult<EmployeeRecord> {
        self.db
            .with_connection(|conn| EmployeeRepository::find_by_id(conn, id))?
            .ok_or_else(|| AppError::not_found("员工", id))?
            .into_record()
    }

    pub fn list_employees(&self, department_id: Option<&str>) -> AppResult<Vec<EmployeeRecord>> {
        let rows = self
            .db
            .with_connection(|conn| EmployeeRepository::list(conn, department_id))?;
        let employees = rows
            .into_iter()
            .map(EmployeeRow::into_record)
            .collect::<AppResult<Vec<_>>>()?;
        debug!(target: "app::directory", count = employees.len(), "employees listed");
        Ok(employees)
    }

    pub fn update_employee(&self, id: &str, update: EmployeeUpdateInput) -> AppResult<EmployeeRecord> {
        let mut record = self.get_employee(id)?;
        if let Some(name) = update.name {
            record.name = normalize_name(&name, "员工姓名")?;
        }
        if let Some(email) = update.email {
            record.email = normalize_email(email)?;
        }
        if let Some(department_id) = update.department_id {
            record.department_id = normalize_optional_string(department_id);
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(hired_on) = update.hired_on {
            record.hired_on = normalize_date_opt(hired_on)?;
        }
        record.updated_at = Utc::now().to_rfc3339();

        self.db.with_transaction(|conn| {
            ensure_department(conn, record.department_id.as_deref())?;
            EmployeeRepository::update(conn, &EmployeeRow::from_record(&record))
        })?;
        info!(target: "app::directory", employee_id = %record.id, "employee updated");
        Ok(record)
    }

    pub fn delete_employee(&self, id: &str) -> AppResult<()> {
        self.db
            .with_connection(|conn| EmployeeRepository::delete(conn, id))?;
        info!(target: "app::directory", employee_id = %id, "employee deleted");
        Ok(())
    }

    pub fn create_department(&self, input: DepartmentInput) -> AppResult<DepartmentRecord> {
        let now = Utc::now().to_rfc3339();
        let record = DepartmentRecord {
            id: Uuid::new_v4().to_string(),
            name: normalize_name(&input.name, "部门名称")?,
            parent_id: normalize_optional_string(input.parent_id),
            manager_id: normalize_optional_string(input.manager_id),
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.with_transaction(|conn| {
            ensure_department(conn, record.parent_id.as_deref())?;
            ensure_unique_department_name(conn, &record.name, None)?;
            DepartmentRepository::insert(conn, &DepartmentRow::from_record(&record))
        })?;

        info!(target: "app::directory", department_id = %record.id, "department created");
        Ok(record)
    }

    pub fn get_department(&self, id: &str) -> AppResult<DepartmentRecord> {
        let row = self
            .db
            .with_connection(|conn| DepartmentRepository::find_by_id(conn, id))?
            .ok_or_else(|| AppError::not_found("部门", id))?;
        Ok(row.into_record())
    }

    pub fn list_departments(&self) -> AppResult<Vec<DepartmentRecord>> {
        let rows = self.db.with_connection(DepartmentRepository::list)?;
        Ok(rows.into_iter().map(DepartmentRow::into_record).collect())
    }

    pub fn update_department(&self, id: &str, input: DepartmentInput) -> AppResult<DepartmentRecord> {
        let mut record = self.get_department(id)?;
        record.name = normalize_name(&input.name, "部门名称")?;
        record.parent_id = normalize_optional_string(input.parent_id);
        record.manager_id = normalize_optional_string(input.manager_id);
        record.updated_at = Utc::now().to_rfc3339();

        if record.parent_id.as_deref() == Some(record.id.as_str()) {
            return Err(AppError::validation("部门不能以自身作为上级部门"));
        }

        self.db.with_transaction(|conn| {
            ensure_department(conn, record.parent_id.as_deref())?;
            ensure_unique_department_name(conn, &record.name, Some(&record.id))?;
            DepartmentRepository::update(conn, &DepartmentRow::from_record(&record))
        })?;
        info!(target: "app::directory", department_id = %record.id, "department updated");
        Ok(record)
    }

    pub fn delete_department(&self, id: &str) -> AppResult<()> {
        self.db.with_transaction(|conn| {
            let referenced = EmployeeRepository::count_by_department(conn, id)?;
            if referenced > 0 {
                return Err(AppError::validation_with_details(
                    format!("部门仍有 {referenced} 名员工，无法删除"),
                    serde_json::json!({ "departmentId": id, "employeeCount": referenced }),
                ));
            }
            DepartmentRepository::delete(conn, id)
        })?;
        info!(target: "app::directory", department_id = %id, "department deleted");
        Ok(())
    }

    pub fn create_role(&self, input: RoleInput) -> AppResult<RoleRecord> {
        let now = Utc::now().to_rfc3339();
        let record = RoleRecord {
            id: normalize_role_id(&input.id)?,
            name: normalize_name(&input.name, "角色名称")?,
            description: normalize_optional_string(input.description),
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.with_transaction(|conn| {
            if RoleRepository::find_by_id(conn, &record.id)?.is_some() {
                return Err(AppError::conflict(format!("角色已存在: {}", record.id)));
            }
            RoleRepository::insert(conn, &RoleRow::from_record(&record))
        })?;

        info!(target: "app::directory", role_id = %record.id, "role created");
        Ok(record)
    }

    pub fn get_role(&self, id: &str) -> AppResult<RoleRecord> {
        let row = self
            .db
            .with_connection(|conn| RoleRepository::find_by_id(conn, id))?
            .ok_or_else(|| AppError::not_found("角色", id))?;
        Ok(row.into_record())
    }

    pub fn list_roles(&self) -> AppResult<Vec<RoleRecord>> {
        let rows = self.db.with_connection(RoleRepository::list)?;
        Ok(rows.into_iter().map(RoleRow::into_record).collect())
    }

    /// Renames or re-describes a role. The id is immutable because weight tables key on it.
    pub fn update_role(&self, id: &str, input: RoleInput) -> AppResult<RoleRecord> {
        let mut record = self.get_role(id)?;
        record.name = normalize_name(&input.name, "角色名称")?;
        record.description = normalize_optional_string(input.description);
        record.updated_at = Utc::now().to_rfc3339();

        self.db
            .with_connection(|conn| RoleRepository::update(conn, &RoleRow::from_record(&record)))?;
        info!(target: "app::directory", role_id = %record.id, "role updated");
        Ok(record)
    }

    pub fn delete_role(&self, id: &str) -> AppResult<()> {
        self.db.with_connection(|conn| RoleRepository::delete(conn, id))?;
        info!(target: "app::directory", role_id = %id, "role deleted");
        Ok(())
    }
}

fn ensure_department(conn: &rusqlite::Connection, department_id: Option<&str>) -> AppResult<()> {
    if let Some(department_id) = department_id {
        if DepartmentRepository::find_by_id(conn, department_id)?.is_none() {
            return Err(AppError::not_found("部门", department_id));
        }
    }
    Ok(())
}

fn ensure_unique_department_name(
    conn: &rusqlite::Connection,
    name: &str,
    exclude_id: Option<&str>,
) -> AppResult<()> {
    let taken = DepartmentRepository::list(conn)?
        .iter()
        .any(|row| row.name == name && Some(row.id.as_str()) != exclude_id);
    if taken {
        return Err(AppError::conflict(format!("部门名称已存在: {name}")));
    }
    Ok(())
}

fn normalize_required(value: &str, message: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(message));
    }
    Ok(trimmed.to_string())
}

fn normalize_name(value: &str, label: &str) -> AppResult<String> {
    let trimmed = normalize_required(value, &format!("{label}不能为空"))?;
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::validation(format!(
            "{label}长度需在 {MAX_NAME_CHARS} 字以内"
        )));
    }
    Ok(trimmed)
}

fn normalize_email(value: Option<String>) -> AppResult<Option<String>> {
    match normalize_optional_string(value) {
        Some(email) if !email.contains('@') => {
            Err(AppError::validation(format!("邮箱格式非法: {email}")))
        }
        other => Ok(other),
    }
}

fn normalize_date_opt(value: Option<String>) -> AppResult<Option<String>> {
    match normalize_optional_string(value) {
        Some(date) => {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|_| AppError::validation(format!("日期格式非法: {date}")))?;
            Ok(Some(date))
        }
        None => Ok(None),
    }
}

fn normalize_role_id(value: &str) -> AppResult<String> {
    let trimmed = normalize_required(value, "角色标识不能为空")?;
    let valid = trimmed
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
    if !valid {
        return Err(AppError::validation(format!(
            "角色标识只能包含小写字母、数字和下划线: {trimmed}"
        )));
    }
    Ok(trimmed)
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
