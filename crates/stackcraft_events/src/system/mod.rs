/// Event system module - broken down into manageable components
mod core;
mod emitters;
mod handlers;
mod stats;
mod subscription;
mod tests;

// Re-export all public items from submodules
pub use core::EventSystem;
pub use stats::EventSystemStats;
pub use subscription::SubscriptionId;
