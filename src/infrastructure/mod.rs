//! Transport adapters implementing the `Transport` port.

pub mod in_memory;
pub mod websocket;
