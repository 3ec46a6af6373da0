//! Host-facing command contract and JSON bridge.

pub mod channel;
pub mod contract;
pub mod stdio;
