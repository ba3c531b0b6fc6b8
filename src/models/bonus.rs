use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::performance::CoefficientSource;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Pending,
    Approved,
    Distributed,
    Rejected,
    Deleted,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Pending => "pending",
            PoolStatus::Approved => "approved",
            PoolStatus::Distributed => "distributed",
            PoolStatus::Rejected => "rejected",
            PoolStatus::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "pending" => Ok(PoolStatus::Pending),
            "approved" => Ok(PoolStatus::Approved),
            "distributed" => Ok(PoolStatus::Distributed),
            "rejected" => Ok(PoolStatus::Rejected),
            "deleted" => Ok(PoolStatus::Deleted),
            _ => Err(format!("Invalid pool status: {}", s)),
        }
    }

    /// Status an allocation takes when its pool moves to this status.
    pub fn allocation_status(&self) -> AllocationStatus {
        match self {
            PoolStatus::Pending => AllocationStatus::Pending,
            PoolStatus::Approved => AllocationStatus::Approved,
            PoolStatus::Distributed => AllocationStatus::Distributed,
            PoolStatus::Rejected => AllocationStatus::Rejected,
            PoolStatus::Deleted => AllocationStatus::Deleted,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalculationState {
    Idle,
    Calculating,
}

impl CalculationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationState::Idle => "idle",
            CalculationState::Calculating => "calculating",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "idle" => Ok(CalculationState::Idle),
            "calculating" => Ok(CalculationState::Calculating),
            _ => Err(format!("Invalid calculation state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Pending,
    Approved,
    Rejected,
    Distributed,
    Deleted,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Pending => "pending",
            AllocationStatus::Approved => "approved",
            AllocationStatus::Rejected => "rejected",
            AllocationStatus::Distributed => "distributed",
            AllocationStatus::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "pending" => Ok(AllocationStatus::Pending),
            "approved" => Ok(AllocationStatus::Approved),
            "rejected" => Ok(AllocationStatus::Rejected),
            "distributed" => Ok(AllocationStatus::Distributed),
            "deleted" => Ok(AllocationStatus::Deleted),
            _ => Err(format!("Invalid allocation status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BonusPoolRecord {
    pub id: String,
    pub project_id: String,
    pub period: String,
    pub total_amount: Decimal,
    pub profit_ratio: Option<f64>,
    pub status: PoolStatus,
    pub created_by: String,
    pub approved_by: Option<String>,
    pub calculation_state: CalculationState,
    pub calculation_started_at: Option<String>,
    pub last_calculated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BonusPoolCreateInput {
    pub project_id: String,
    pub period: String,
    pub total_amount: Decimal,
    #[serde(default)]
    pub profit_ratio: Option<f64>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BonusPoolUpdateInput {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub profit_ratio: Option<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BonusPoolFilter {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<PoolStatus>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BonusAllocationRecord {
    pub id: String,
    pub pool_id: String,
    pub project_id: String,
    pub member_id: String,
    pub employee_id: String,
    /// Member's own role, or `default` when none was set. An unknown role keeps its id
    /// and is paid at the default weight with `default_role_assigned` set.
    pub role_id: String,
    pub role_weight: f64,
    pub performance_coeff: f64,
    pub coefficient_source: CoefficientSource,
    pub participation_ratio: f64,
    pub calculated_weight: f64,
    pub bonus_amount: Decimal,
    pub default_role_assigned: bool,
    pub status: AllocationStatus,
    pub remark: Option<String>,
    pub calculated_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationUpdateInput {
    #[serde(default)]
    pub bonus_amount: Option<Decimal>,
    #[serde(default)]
    pub remark: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSummary {
    pub valid_member_count: usize,
    pub skipped_member_count: usize,
    pub default_role_count: usize,
    pub total_weight: f64,
    pub average_bonus: Decimal,
    pub max_bonus: Decimal,
    pub min_bonus: Decimal,
    pub rounding_drift: Decimal,
    pub drift_exceeds_tolerance: bool,
}

/// Why a member was left out of a calculation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationWarning {
    pub member_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub pool: BonusPoolRecord,
    pub total_amount: Decimal,
    pub total_allocated: Decimal,
    pub allocations: Vec<BonusAllocationRecord>,
    pub summary: AllocationSummary,
    pub warnings: Vec<CalculationWarning>,
}
