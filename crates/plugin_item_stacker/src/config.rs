//! Item stacker settings.

use serde::{Deserialize, Serialize};
use stackcraft_events::ITEM_TYPE;

/// Name the settings are registered under in the settings registry.
pub const SETTINGS_MODULE: &str = "ItemStacker";

/// Live settings of the item stacker.
///
/// All values can be changed at runtime through the settings registry; the
/// plugin picks them up on the next event. A changed `expire_timeout_ms` only
/// applies to groups created afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemStackerSettings {
    /// Global switch checked at every entry point
    pub enabled: bool,
    /// Ticks between reconciliation passes
    pub check_interval_ticks: u64,
    /// Largest distance at which two items merge
    pub max_distance: f64,
    /// Smallest distance at which two items merge
    pub min_distance: f64,
    /// Lifetime of a group from its first observation
    pub expire_timeout_ms: u64,
    /// Overrides the per-type maximum amount of one physical stack
    pub max_stack_amount: Option<u64>,
    /// Marker tag put on absorbed objects
    pub combined_tag: String,
    /// Engine type of stackable objects
    pub item_type: String,
}

impl Default for ItemStackerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ticks: 20,
            max_distance: 10.0,
            min_distance: 0.1,
            expire_timeout_ms: 5 * 60 * 1000,
            max_stack_amount: None,
            combined_tag: format!("{SETTINGS_MODULE}:isCombined"),
            item_type: ITEM_TYPE.to_string(),
        }
    }
}

impl ItemStackerSettings {
    /// Checks the settings for values the stacker cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.check_interval_ticks == 0 {
            return Err("check_interval_ticks must be greater than 0".to_string());
        }
        if !(self.min_distance >= 0.0 && self.min_distance <= self.max_distance) {
            return Err(format!(
                "min_distance ({}) must be between 0 and max_distance ({})",
                self.min_distance, self.max_distance
            ));
        }
        if self.expire_timeout_ms == 0 {
            return Err("expire_timeout_ms must be greater than 0".to_string());
        }
        if self.combined_tag.is_empty() {
            return Err("combined_tag must not be empty".to_string());
        }
        Ok(())
    }

    /// Maximum amount one physical stack of an item can hold.
    pub fn stack_limit(&self, payload_max: u32) -> u64 {
        self.max_stack_amount.unwrap_or(u64::from(payload_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ItemStackerSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.combined_tag, "ItemStacker:isCombined");
        assert_eq!(settings.expire_timeout_ms, 300_000);
    }

    #[test]
    fn test_inverted_band_is_rejected() {
        let settings = ItemStackerSettings {
            min_distance: 5.0,
            max_distance: 1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let settings: ItemStackerSettings =
            serde_json::from_value(serde_json::json!({ "max_distance": 4.0 })).unwrap();
        assert_eq!(settings.max_distance, 4.0);
        assert_eq!(settings.check_interval_ticks, 20);
    }

    #[test]
    fn test_stack_limit_override() {
        let mut settings = ItemStackerSettings::default();
        assert_eq!(settings.stack_limit(64), 64);
        settings.max_stack_amount = Some(1000);
        assert_eq!(settings.stack_limit(64), 1000);
    }
}
