//! Domain models for the gatehouse engine
//!
//! Lifecycle records (bookings, guests), the attendance ledger entry, the vehicle log
//! and the read-only directory records they reference.

mod attendance;
mod booking;
mod directory;
mod guest;
mod types;
mod vehicle;

pub use attendance::*;
pub use booking::*;
pub use directory::*;
pub use guest::*;
pub use types::*;
pub use vehicle::*;
