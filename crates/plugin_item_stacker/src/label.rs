//! Display names and group labels.

pub use stackcraft_events::display_name_for;

/// Separator between the amount part and the countdown of a label.
const EXPIRY_SEPARATOR: &str = " — expires in ";

/// Whole seconds left until `expires_at_ms`, rounded up and never negative.
pub fn remaining_secs(expires_at_ms: u64, now_ms: u64) -> u64 {
    expires_at_ms.saturating_sub(now_ms).div_ceil(1000)
}

/// The label shown on a group's primary.
pub fn render_label(total: u64, display_name: &str, remaining_secs: u64) -> String {
    format!("{total}x {display_name}{EXPIRY_SEPARATOR}{remaining_secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_secs_rounds_up() {
        assert_eq!(remaining_secs(10_000, 0), 10);
        assert_eq!(remaining_secs(10_000, 1), 10);
        assert_eq!(remaining_secs(10_000, 9_001), 1);
        assert_eq!(remaining_secs(10_000, 10_000), 0);
        assert_eq!(remaining_secs(10_000, 20_000), 0);
    }

    #[test]
    fn test_render_label() {
        assert_eq!(render_label(3, "Stone", 299), "3x Stone — expires in 299s");
    }
}
