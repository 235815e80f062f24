//! Pure, deterministic game logic. No I/O; fully testable in isolation.

pub mod candidates;
pub mod moves;
pub mod types;
pub mod usage;
