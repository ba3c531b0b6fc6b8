use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tunables of the allocation engine, persisted in `app_settings`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSettings {
    /// Largest accepted gap between the pool amount and the sum of rounded shares.
    pub rounding_tolerance: Decimal,
    pub max_members_per_run: usize,
    /// Age after which a `calculating` lease is considered abandoned.
    pub calculation_lease_seconds: i64,
    pub updated_at: Option<String>,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            rounding_tolerance: Decimal::ONE,
            max_members_per_run: 5_000,
            calculation_lease_seconds: 300,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSettingsUpdate {
    #[serde(default)]
    pub rounding_tolerance: Option<Decimal>,
    #[serde(default)]
    pub max_members_per_run: Option<usize>,
    #[serde(default)]
    pub calculation_lease_seconds: Option<i64>,
}
