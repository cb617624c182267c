//! Entity stacker settings.

use serde::{Deserialize, Serialize};

/// Name the settings are registered under in the settings registry.
pub const SETTINGS_MODULE: &str = "EntityStacker";

/// Types that never stack: items have their own stacker, players are people.
pub const BLACKLISTED_TYPES: [&str; 2] = ["minecraft:item", "minecraft:player"];

/// Live settings of the entity stacker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityStackerSettings {
    pub enabled: bool,
    /// Ticks between merge passes
    pub check_interval_ticks: u64,
    /// Upper bound (exclusive) for the amount of one stack
    pub max_stack_size: u64,
    /// Merge radius in blocks
    pub radius: f64,
    /// Name tag template; `x#` becomes the amount, `@` the mob name
    pub name_template: String,
}

impl Default for EntityStackerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ticks: 20,
            max_stack_size: 99_999,
            radius: 3.0,
            name_template: "[ x# @ ]".to_string(),
        }
    }
}

impl EntityStackerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.check_interval_ticks == 0 {
            return Err("check_interval_ticks must be greater than 0".to_string());
        }
        if self.max_stack_size < 2 {
            return Err("max_stack_size must be at least 2".to_string());
        }
        if !(self.radius >= 0.0) {
            return Err(format!("radius ({}) must not be negative", self.radius));
        }
        Ok(())
    }
}

/// Whether objects of `type_id` are never stacked.
pub fn is_blacklisted(type_id: &str) -> bool {
    BLACKLISTED_TYPES.contains(&type_id)
}
