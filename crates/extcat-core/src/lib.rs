//! Foundational low-level utilities shared across extcat crates.
//!
//! Provides atomic file-write helpers for the repository config file and the
//! millisecond clock used by the catalog refresh gate.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp_ms, elapsed_ms_since};
