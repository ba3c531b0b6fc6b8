use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::directory::{EmployeeRecord, EmployeeStatus};

const BASE_SELECT: &str = r#"
    SELECT
        id,
        employee_no,
        name,
        email,
        department_id,
        status,
        hired_on,
        created_at,
        updated_at
    FROM employees
"#;

#[derive(Debug, Clone)]
pub struct EmployeeRow {
    pub id: String,
    pub employee_no: String,
    pub name: String,
    pub email: Option<String>,
    pub department_id: Option<String>,
    pub status: String,
    pub hired_on: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl EmployeeRow {
    pub fn from_record(record: &EmployeeRecord) -> Self {
        Self {
            id: record.id.clone(),
            employee_no: record.employee_no.clone(),
            name: record.name.clone(),
            email: record.email.clone(),
            department_id: record.department_id.clone(),
            status: record.status.as_str().to_string(),
            hired_on: record.hired_on.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<EmployeeRecord> {
        let status = EmployeeStatus::from_str(&self.status).map_err(|message| {
            AppError::validation(format!("员工 {} 状态数据非法: {message}", self.id))
        })?;

        Ok(EmployeeRecord {
            id: self.id,
            employee_no: self.employee_no,
            name: self.name,
            email: self.email,
            department_id: self.department_id,
            status,
            hired_on: self.hired_on,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for EmployeeRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            employee_no: row.get("employee_no")?,
            name: row.get("name")?,
            email: row.get("email")?,
            department_id: row.get("department_id")?,
            status: row.get("status")?,
            hired_on: row.get("hired_on")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct EmployeeRepository;

impl EmployeeRepository {
    pub fn insert(conn: &Connection, row: &EmployeeRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO employees (
                    id, employee_no, name, email, department_id, status, hired_on,
                    created_at, updated_at
                ) VALUES (
                    :id, :employee_no, :name, :email, :department_id, :status, :hired_on,
                    :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":employee_no": &row.employee_no,
                ":name": &row.name,
                ":email": &row.email,
                ":department_id": &row.department_id,
                ":status": &row.status,
                ":hired_on": &row.hired_on,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, row: &EmployeeRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE employees SET
                    name = :name,
                    email = :email,
                    department_id = :department_id,
                    status = :status,
                    hired_on = :hired_on,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":email": &row.email,
                ":department_id": &row.department_id,
                ":status": &row.status,
                ":hired_on": &row.hired_on,
                ":updated_at": &row.updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found("员工", &row.id));
        }
        Ok(())
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM employees WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found("员工", id));
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<EmployeeRow>> {
        let sql = format!("{BASE_SELECT} WHERE id = :id");
        let row = conn
            .query_row(&sql, named_params! {":id": id}, |row| {
                EmployeeRow::try_from(row)
            })
            .optional()?;
        Ok(row)
    }

    pub fn exists(conn: &Connection, id: &str) -> AppResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM employees WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn employee_no_taken(conn: &Connection, employee_no: &str) -> AppResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM employees WHERE employee_no = ?1",
            [employee_no],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list(conn: &Connection, department_id: Option<&str>) -> AppResult<Vec<EmployeeRow>> {
        let rows = match department_id {
            Some(department_id) => {
                let sql = format!(
                    "{BASE_SELECT} WHERE department_id = :department_id ORDER BY employee_no ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(named_params! {":department_id": department_id}, |row| {
                        EmployeeRow::try_from(row)
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("{BASE_SELECT} ORDER BY employee_no ASC");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| EmployeeRow::try_from(row))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn count_by_department(conn: &Connection, department_id: &str) -> AppResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM employees WHERE department_id = ?1",
            [department_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
