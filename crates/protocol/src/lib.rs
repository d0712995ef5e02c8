//! Wire types for the pw-mirror driver protocol.
//!
//! This crate contains the serde-serializable shapes exchanged with the
//! driver process. Types here are:
//! - **Pure data**: no behavior beyond serialization/deserialization
//! - **1:1 with the wire**: field names match what the driver sends
//!
//! Proxies, event dispatch and waiting live in `pw-mirror-runtime` and `pw-mirror`.

pub mod options;
pub mod types;

pub use options::*;
pub use types::*;
