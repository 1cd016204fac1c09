//! Connection manager
//!
//! `RelayPool` is a cheap, cloneable handle; all state lives in a single
//! actor task that processes commands and connection signals one at a time.

pub mod actor;
pub mod manager;

pub use manager::{ManagerCommand, RelayPool};
