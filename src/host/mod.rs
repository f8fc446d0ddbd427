//! Host-facing command/event contract and the stdio bridge.

pub mod channel;
pub mod contract;
pub mod stdio;
