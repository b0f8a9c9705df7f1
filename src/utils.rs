//! Small shared helpers. Kept from the teacher's `utils.rs` split of
//! miscellany that doesn't belong to any one component.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch. Used for event timestamps and order
/// creation/update times throughout the crate.
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_nanos() as u64
}

/// Microseconds since the Unix epoch, the unit spec §3 uses for order
/// timestamps.
pub fn now_micros() -> u64 {
    now_nanos() / 1_000
}
