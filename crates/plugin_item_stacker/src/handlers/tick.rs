//! Tick handling: schedule reconciliation passes.

use crate::config::ItemStackerSettings;
use crate::reconcile::{PassReport, Reconciler};
use crate::tracker::GroupTracker;
use stackcraft_events::{ServerTickEvent, WorldHost};
use std::sync::atomic::AtomicBool;

/// Whether a pass is due on `tick_count`.
pub fn is_pass_due(tick_count: u64, check_interval_ticks: u64) -> bool {
    check_interval_ticks > 0 && tick_count % check_interval_ticks == 0
}

/// Handles a `server_tick` event. Returns the report of the pass if one ran.
pub fn handle_tick(
    tracker: &mut GroupTracker,
    world: &dyn WorldHost,
    settings: &ItemStackerSettings,
    event: &ServerTickEvent,
    now_ms: u64,
    cancel: &AtomicBool,
) -> Option<PassReport> {
    if !settings.enabled || !is_pass_due(event.tick_count, settings.check_interval_ticks) {
        return None;
    }
    Some(Reconciler::new(tracker, world, settings, now_ms).with_cancel(cancel).run())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_cadence() {
        assert!(!is_pass_due(1, 20));
        assert!(is_pass_due(20, 20));
        assert!(is_pass_due(40, 20));
        assert!(is_pass_due(7, 1));
        assert!(!is_pass_due(20, 0));
    }
}
