use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::directory::{DepartmentRecord, RoleRecord};

#[derive(Debug, Clone)]
pub struct DepartmentRow {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub manager_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DepartmentRow {
    pub fn from_record(record: &DepartmentRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            parent_id: record.parent_id.clone(),
            manager_id: record.manager_id.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> DepartmentRecord {
        DepartmentRecord {
            id: self.id,
            name: self.name,
            parent_id: self.parent_id,
            manager_id: self.manager_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl TryFrom<&Row<'_>> for DepartmentRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            parent_id: row.get("parent_id")?,
            manager_id: row.get("manager_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct DepartmentRepository;

impl DepartmentRepository {
    pub fn insert(conn: &Connection, row: &DepartmentRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO departments (id, name, parent_id, manager_id, created_at, updated_at)
                VALUES (:id, :name, :parent_id, :manager_id, :created_at, :updated_at)
            "#,
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":parent_id": &row.parent_id,
                ":manager_id": &row.manager_id,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, row: &DepartmentRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE departments SET
                    name = :name,
                    parent_id = :parent_id,
                    manager_id = :manager_id,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":parent_id": &row.parent_id,
                ":manager_id": &row.manager_id,
                ":updated_at": &row.updated_at,
            },
        )?;
        if affected == 0 {
            return Err(AppError::not_found("部门", &row.id));
        }
        Ok(())
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM departments WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found("部门", id));
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<DepartmentRow>> {
        let row = conn
            .query_row(
                "SELECT id, name, parent_id, manager_id, created_at, updated_at FROM departments WHERE id = ?1",
                [id],
                |row| DepartmentRow::try_from(row),
            )
            .optional()?;
        Ok(row)
    }

    pub fn list(conn: &Connection) -> AppResult<Vec<DepartmentRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, parent_id, manager_id, created_at, updated_at FROM departments ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map([], |row| DepartmentRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
pub struct RoleRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl RoleRow {
    pub fn from_record(record: &RoleRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> RoleRecord {
        RoleRecord {
            id: self.id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl TryFrom<&Row<'_>> for RoleRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct RoleRepository;

impl RoleRepository {
    pub fn insert(conn: &Connection, row: &RoleRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO roles (id, name, description, created_at, updated_at)
                VALUES (:id, :name, :description, :created_at, :updated_at)
            "#,
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":description": &row.description,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, row: &RoleRow) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE roles SET name = :name, description = :description, updated_at = :updated_at WHERE id = :id",
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":description": &row.description,
                ":updated_at": &row.updated_at,
            },
        )?;
        if affected == 0 {
            return Err(AppError::not_found("角色", &row.id));
        }
        Ok(())
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM roles WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found("角色", id));
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<RoleRow>> {
        let row = conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at FROM roles WHERE id = ?1",
                [id],
                |row| RoleRow::try_from(row),
            )
            .optional()?;
        Ok(row)
    }

    pub fn list(conn: &Connection) -> AppResult<Vec<RoleRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at FROM roles ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| RoleRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
