use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "planning" => Ok(ProjectStatus::Planning),
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            "archived" => Ok(ProjectStatus::Archived),
            _ => Err(format!("Invalid project status: {}", s)),
        }
    }
}

/// Membership state of an employee inside a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Approved,
    Active,
    Confirmed,
    Rejected,
    Removed,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Pending => "pending",
            MemberStatus::Approved => "approved",
            MemberStatus::Active => "active",
            MemberStatus::Confirmed => "confirmed",
            MemberStatus::Rejected => "rejected",
            MemberStatus::Removed => "removed",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "pending" => Ok(MemberStatus::Pending),
            "approved" => Ok(MemberStatus::Approved),
            "active" => Ok(MemberStatus::Active),
            "confirmed" => Ok(MemberStatus::Confirmed),
            "rejected" => Ok(MemberStatus::Rejected),
            "removed" => Ok(MemberStatus::Removed),
            _ => Err(format!("Invalid member status: {}", s)),
        }
    }

    /// Whether a member in this state takes part in bonus allocation.
    pub fn participates_in_allocation(&self) -> bool {
        match self {
            MemberStatus::Approved | MemberStatus::Active | MemberStatus::Confirmed => true,
            MemberStatus::Pending | MemberStatus::Rejected | MemberStatus::Removed => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub code: String,
    pub name: String,
    pub status: ProjectStatus,
    pub manager_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreateInput {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub manager_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub manager_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMemberRecord {
    pub id: String,
    pub project_id: String,
    pub employee_id: Option<String>,
    pub role_id: Option<String>,
    pub status: MemberStatus,
    pub participation_ratio: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberCreateInput {
    pub employee_id: String,
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub participation_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberUpdateInput {
    #[serde(default)]
    pub role_id: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub participation_ratio: Option<Option<f64>>,
}
