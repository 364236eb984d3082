//! Wire types for the inspect broker.
//!
//! This crate contains the serde-serializable types exchanged between the
//! broker, its callers, and the coordinator gateway. These types are the
//! "protocol layer": the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: no behavior beyond serialization and small accessors
//! * Stable: changes only when the gateway protocol changes
//!
//! Session management, correlation and retry live in `inspect-broker`.

pub mod account;
pub mod frames;
pub mod item;
pub mod link;

pub use account::*;
pub use frames::*;
pub use item::*;
pub use link::*;
