//! Runtime transports for the inspect broker.
//!
//! [`GatewayTransport`] talks to a coordinator gateway over TCP, one
//! connection per broker session, exchanging newline-delimited JSON frames
//! from [`inspect_protocol::frames`].

pub mod gateway;

pub use gateway::{DEFAULT_GATEWAY_ADDR, DEFAULT_MAX_FRAME_BYTES, GatewayTransport};
