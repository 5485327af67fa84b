pub mod command;
pub mod format;
pub mod locker;

// Trait-based abstraction for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use executor::{CommandExecutor, RealExecutor};
pub use format::{format_bytes, format_duration};
pub use locker::RunLock;
