pub mod bonus;
pub mod directory;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, warn};

use crate::db::DbPool;
use crate::error::AppError;
use crate::services::allocation_calculator::AllocationCalculator;
use crate::services::bonus_pool_service::BonusPoolService;
use crate::services::employee_service::EmployeeService;
use crate::services::performance_service::PerformanceService;
use crate::services::project_service::ProjectService;
use crate::services::role_weight_service::RoleWeightService;
use crate::services::settings_service::SettingsService;

/// Services shared by every command handler.
#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    settings_service: Arc<SettingsService>,
    employee_service: Arc<EmployeeService>,
    project_service: Arc<ProjectService>,
    performance_service: Arc<PerformanceService>,
    role_weight_service: Arc<RoleWeightService>,
    bonus_pool_service: Arc<BonusPoolService>,
    allocation_calculator: Arc<AllocationCalculator>,
}

impl AppState {
    pub fn new(db_pool: DbPool) -> Self {
        let settings_service = Arc::new(SettingsService::new(db_pool.clone()));
        let employee_service = Arc::new(EmployeeService::new(db_pool.clone()));
        let project_service = Arc::new(ProjectService::new(db_pool.clone()));
        let performance_service = Arc::new(PerformanceService::new(db_pool.clone()));
        let role_weight_service = Arc::new(RoleWeightService::new(db_pool.clone()));
        let bonus_pool_service = Arc::new(BonusPoolService::new(
            db_pool.clone(),
            Arc::clone(&settings_service),
        ));
        let allocation_calculator = Arc::new(AllocationCalculator::new(
            db_pool.clone(),
            Arc::clone(&settings_service),
        ));

        Self {
            db_pool,
            settings_service,
            employee_service,
            project_service,
            performance_service,
            role_weight_service,
            bonus_pool_service,
            allocation_calculator,
        }
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings_service)
    }

    pub fn employees(&self) -> Arc<EmployeeService> {
        Arc::clone(&self.employee_service)
    }

    pub fn projects(&self) -> Arc<ProjectService> {
        Arc::clone(&self.project_service)
    }

    pub fn performance(&self) -> Arc<PerformanceService> {
        Arc::clone(&self.performance_service)
    }

    pub fn role_weights(&self) -> Arc<RoleWeightService> {
        Arc::clone(&self.role_weight_service)
    }

    pub fn bonus_pools(&self) -> Arc<BonusPoolService> {
        Arc::clone(&self.bonus_pool_service)
    }

    pub fn calculator(&self) -> Arc<AllocationCalculator> {
        Arc::clone(&self.allocation_calculator)
    }

    pub fn db(&self) -> DbPool {
        self.db_pool.clone()
    }
}

/// `{ success, message, data }` envelope returned to callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            code: None,
            details: None,
        }
    }

    pub fn failure(error: CommandError) -> Self {
        Self {
            success: false,
            message: error.message,
            data: None,
            code: Some(error.code),
            details: error.details,
        }
    }
}

pub type CommandResult<T> = Result<ApiResponse<T>, CommandError>;

/// Flattens a command outcome into an HTTP-style status and envelope.
pub fn respond<T>(result: CommandResult<T>) -> (u16, ApiResponse<T>) {
    match result {
        Ok(response) => (200, response),
        Err(error) => (error.status, ApiResponse::failure(error)),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip)]
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        status: u16,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        let status = error.status_code();
        match error {
            AppError::Validation {
                message, details, ..
            } => CommandError::new("VALIDATION_ERROR", status, message, details),
            AppError::NotFound { resource, id } => CommandError::new(
                "NOT_FOUND",
                status,
                format!("{resource} 不存在: {id}"),
                Some(serde_json::json!({ "resource": resource, "id": id })),
            ),
            AppError::Conflict { message } => {
                warn!(target: "app::command", %message, "conflict in command");
                CommandError::new("CONFLICT", status, message, None)
            }
            AppError::Database { message } => {
                error!(target: "app::command", %message, "database error in command");
                CommandError::new("INTERNAL", status, message, None)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("INTERNAL", status, "序列化失败", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("INTERNAL", status, "文件系统读写失败", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("INTERNAL", status, message, None)
            }
        }
    }
}

/// Runs a blocking service call off the async executor.
pub(crate) async fn run_blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T, AppError> + Send + 'static,
) -> Result<T, CommandError> {
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| CommandError::new("INTERNAL", 500, format!("任务执行失败: {err}"), None))?
        .map_err(CommandError::from)
}
