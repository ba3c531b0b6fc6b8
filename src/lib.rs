pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::Path;

use tracing::info;

use crate::commands::AppState;
use crate::db::DbPool;
use crate::error::AppResult;

const DATABASE_FILE: &str = "hr-bonus.sqlite";
const LOG_DIR: &str = "logs";

/// Prepares `data_dir`, installs logging and opens the database.
pub fn bootstrap(data_dir: &Path) -> AppResult<AppState> {
    std::fs::create_dir_all(data_dir)?;
    crate::utils::logger::init_logging(&data_dir.join(LOG_DIR))?;

    let pool = DbPool::new(data_dir.join(DATABASE_FILE))?;
    info!(
        target: "app::bootstrap",
        path = %pool.path().display(),
        "bonus simulation database ready"
    );

    Ok(AppState::new(pool))
}
