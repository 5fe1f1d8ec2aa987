//! Customer support chat.
//!
//! - [`registry`] - Shared table of participants and the broadcast fan-out.
//! - [`relay`] - Per-stream state machine that joins, relays and leaves.

pub mod registry;
pub mod relay;
