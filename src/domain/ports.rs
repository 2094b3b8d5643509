use super::swap::Quote;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Outbound half of a message channel to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: String) -> Result<()>;
}

/// Inbound traffic and lifecycle changes reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Frame(String),
    Disconnected(String),
    /// The connection failed; the session treats this like a disconnect.
    Error(String),
}

/// A yes/no question the swap workflow needs answered before it continues.
#[derive(Debug, Clone, Copy)]
pub enum Decision<'a> {
    /// Balance is short; request a fresh address to trigger a new balance push?
    RefetchBalance,
    AcceptQuote(&'a Quote),
    /// Abort the swap after declining to refetch?
    ConfirmCancel,
}

#[async_trait]
pub trait DecisionPrompt: Send + Sync {
    async fn confirm(&self, decision: Decision<'_>) -> bool;
}

pub type TransportBox = Box<dyn Transport>;
pub type PromptRef = Arc<dyn DecisionPrompt>;
