//! Domain layer: protocol value types and the ports the client is built against.

pub mod amount;
pub mod message;
pub mod ports;
pub mod swap;
