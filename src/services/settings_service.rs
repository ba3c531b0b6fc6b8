use std::str::FromStr;
use std::sync::RwLock;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::db::repositories::settings_repository::{AppSettingRow, SettingsRepository};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::{AllocationSettings, AllocationSettingsUpdate};

const KEY_ROUNDING_TOLERANCE: &str = "allocation.rounding_tolerance";
const KEY_MAX_MEMBERS_PER_RUN: &str = "allocation.max_members_per_run";
const KEY_LEASE_SECONDS: &str = "allocation.calculation_lease_seconds";
const SETTINGS_PREFIX: &str = "allocation.";

const MAX_MEMBERS_CEILING: usize = 100_000;

pub struct SettingsService {
    db: DbPool,
    cache: RwLock<Option<AllocationSettings>>,
}

impl SettingsService {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
        }
    }

    pub fn allocation(&self) -> AppResult<AllocationSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }

        let settings = self.load_from_db()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
        Ok(settings)
    }

    pub fn update_allocation(&self, input: AllocationSettingsUpdate) -> AppResult<AllocationSettings> {
        let mut current = self.allocation()?;

        if let Some(tolerance) = input.rounding_tolerance {
            if tolerance.is_sign_negative() {
                return Err(AppError::validation("舍入误差容忍度不能为负数"));
            }
            current.rounding_tolerance = tolerance;
        }

        if let Some(max_members) = input.max_members_per_run {
            if max_members == 0 || max_members > MAX_MEMBERS_CEILING {
                return Err(AppError::validation(format!(
                    "单次计算成员上限需在 1 到 {MAX_MEMBERS_CEILING} 之间"
                )));
            }
            current.max_members_per_run = max_members;
        }

        if let Some(lease_seconds) = input.calculation_lease_seconds {
            if lease_seconds <= 0 {
                return Err(AppError::validation("计算租约时长需大于 0 秒"));
            }
            current.calculation_lease_seconds = lease_seconds;
        }

        let now = Utc::now().to_rfc3339();
        self.db.with_transaction(|conn| {
            SettingsRepository::upsert(
                conn,
                KEY_ROUNDING_TOLERANCE,
                &current.rounding_tolerance.to_string(),
                &now,
            )?;
            SettingsRepository::upsert(
                conn,
                KEY_MAX_MEMBERS_PER_RUN,
                &current.max_members_per_run.to_string(),
                &now,
            )?;
            SettingsRepository::upsert(
                conn,
                KEY_LEASE_SECONDS,
                &current.calculation_lease_seconds.to_string(),
                &now,
            )?;
            Ok(())
        })?;
        current.updated_at = Some(now);

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(current.clone());
        }

        info!(
            target: "app::settings",
            rounding_tolerance = %current.rounding_tolerance,
            max_members_per_run = current.max_members_per_run,
            calculation_lease_seconds = current.calculation_lease_seconds,
            "allocation settings updated"
        );

        Ok(current)
    }

    fn load_from_db(&self) -> AppResult<AllocationSettings> {
        let rows = self
            .db
            .with_connection(|conn| SettingsRepository::list_prefixed(conn, SETTINGS_PREFIX))?;

        let mut settings = AllocationSettings::default();
        for row in rows {
            apply_row(&mut settings, &row);
        }
        Ok(settings)
    }
}

/// Stored values that fail to parse keep the default and are logged.
fn apply_row(settings: &mut AllocationSettings, row: &AppSettingRow) {
    let value = row.value.trim();
    let applied = match row.key.as_str() {
        KEY_ROUNDING_TOLERANCE => Decimal::from_str(value)
            .ok()
            .filter(|tolerance| !tolerance.is_sign_negative())
            .map(|tolerance| settings.rounding_tolerance = tolerance)
            .is_some(),
        KEY_MAX_MEMBERS_PER_RUN => value
            .parse::<usize>()
            .ok()
            .filter(|max| *max > 0)
            .map(|max| settings.max_members_per_run = max)
            .is_some(),
        KEY_LEASE_SECONDS => value
            .parse::<i64>()
            .ok()
            .filter(|seconds| *seconds > 0)
            .map(|seconds| settings.calculation_lease_seconds = seconds)
            .is_some(),
        _ => true,
    };

    if applied {
        let newer = settings
            .updated_at
            .as_deref()
            .map_or(true, |current| row.updated_at.as_str() > current);
        if newer {
            settings.updated_at = Some(row.updated_at.clone());
        }
    } else {
        warn!(
            target: "app::settings",
            key = %row.key,
            value = %row.value,
            "ignoring malformed allocation setting"
        );
    }
}
