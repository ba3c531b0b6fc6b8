pub mod audit_repository;
pub mod bonus_allocation_repository;
pub mod bonus_pool_repository;
pub mod department_repository;
pub mod employee_repository;
pub mod performance_repository;
pub mod project_repository;
pub mod role_weight_repository;
pub mod settings_repository;
