//! Shared types for the chillow realtime chat protocol.
//!
//! Everything that crosses the wire lives here so a Rust server and the
//! client agree on one definition of each frame.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
