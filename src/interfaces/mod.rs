//! Adapters between the client and the outside world: the wire format and the terminal.

pub mod terminal;
pub mod wire;
