pub mod allocation_calculator;
pub mod bonus_pool_service;
pub mod eligibility;
pub mod employee_service;
pub mod performance_service;
pub mod project_service;
pub mod role_weight_service;
pub mod settings_service;
