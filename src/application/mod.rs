//! Application layer: request correlation, notification routing and the swap workflow.
//!
//! `ClientSession` owns the connection-scoped pieces (registry, dispatcher, inbound
//! listener task). `SwapStateMachine` drives one swap attempt on top of a session.

pub mod dispatcher;
pub mod registry;
pub mod session;
pub mod swap;
