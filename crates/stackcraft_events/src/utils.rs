//! # Utility Functions
//!
//! Timestamp helpers, display names and the event system factory shared by
//! the host and the plugins. All event timestamps go through these functions
//! so they are directly comparable.

use crate::system::EventSystem;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
///
/// A clock set before the Unix epoch yields 0.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Returns the current Unix timestamp in milliseconds.
///
/// Stack expiry deadlines and label countdowns are computed on this clock.
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Human-readable name of an object type.
///
/// A custom name wins. Otherwise the part of `type_id` after the namespace
/// colon is used, with `_` and `-` turned into spaces and every word
/// capitalised: `minecraft:oak_log` becomes `Oak Log`.
pub fn display_name_for(type_id: &str, custom_name: Option<&str>) -> String {
    if let Some(name) = custom_name.filter(|name| !name.is_empty()) {
        return name.to_string();
    }
    let token = type_id.split_once(':').map_or(type_id, |(_, rest)| rest);
    token
        .split(|c| c == '_' || c == '-')
        .filter(|word| !word.is_empty())
        .map(capitalise)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Creates a new event system instance ready to be shared between the host
/// and its plugins.
pub fn create_event_system() -> Arc<EventSystem> {
    Arc::new(EventSystem::new())
}
