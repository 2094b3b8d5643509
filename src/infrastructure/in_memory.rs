use crate::domain::message::{
    BalanceSnapshot, ErrorPayload, Notification, RequestEnvelope, RequestId, ResponsePayload,
};
use crate::domain::ports::{Transport, TransportEvent};
use crate::error::{ClientError, Result};
use crate::interfaces::wire::codec;
use async_trait::async_trait;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 64;

/// Client side of an in-process connection.
///
/// Frames sent here arrive at the paired `InMemoryPeer`, which plays the server.
/// Used by tests and local demos in place of a socket.
#[derive(Clone)]
pub struct InMemoryTransport {
    outbound: mpsc::Sender<String>,
}

impl InMemoryTransport {
    /// Creates a connected transport, its event stream and the server-side peer.
    pub fn pair() -> (Self, mpsc::Receiver<TransportEvent>, InMemoryPeer) {
        let (outbound, requests) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self { outbound },
            events_rx,
            InMemoryPeer {
                requests,
                events: events_tx,
            },
        )
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, frame: String) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::Transport("peer hung up".to_string()))
    }
}

/// Server side of an in-process connection.
pub struct InMemoryPeer {
    requests: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
}

impl InMemoryPeer {
    /// Next raw frame the client sent, or `None` once the client side is gone.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    /// Next request the client sent, decoded. Frames that do not decode are skipped.
    pub async fn next_request(&mut self) -> Option<RequestEnvelope> {
        while let Some(frame) = self.requests.recv().await {
            match codec::decode_request(&frame) {
                Ok(envelope) => return Some(envelope),
                Err(e) => tracing::warn!(error = %e, "peer received an invalid request"),
            }
        }
        None
    }

    /// Requests the client sent that have not been read yet, without waiting.
    pub fn drain_requests(&mut self) -> Vec<RequestEnvelope> {
        let mut drained = Vec::new();
        while let Ok(frame) = self.requests.try_recv() {
            if let Ok(envelope) = codec::decode_request(&frame) {
                drained.push(envelope);
            }
        }
        drained
    }

    pub async fn respond(&self, id: RequestId, payload: ResponsePayload) {
        if let Ok(frame) = codec::encode_response(id, &payload) {
            self.send_raw(&frame).await;
        }
    }

    /// Answers request `id` with a server error.
    pub async fn reject(&self, id: RequestId, text: &str, code: &str) {
        let error = ErrorPayload {
            id: Some(id),
            text: text.to_string(),
            code: code.to_string(),
            details: None,
        };
        if let Ok(frame) = codec::encode_error(&error) {
            self.send_raw(&frame).await;
        }
    }

    pub async fn push_balances(&self, balances: BalanceSnapshot) {
        let notification = Notification::Balances { balances };
        if let Ok(frame) = codec::encode_notification(&notification) {
            self.send_raw(&frame).await;
        }
    }

    /// Delivers `frame` to the client verbatim.
    pub async fn send_raw(&self, frame: &str) {
        self.emit(TransportEvent::Frame(frame.to_string())).await;
    }

    pub async fn disconnect(&self, reason: &str) {
        self.emit(TransportEvent::Disconnected(reason.to_string()))
            .await;
    }

    pub async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("client side of in-memory transport is gone");
        }
    }
}
