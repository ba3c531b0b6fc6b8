pub mod audit;
pub mod bonus;
pub mod directory;
pub mod performance;
pub mod project;
pub mod role_weight;
pub mod settings;
