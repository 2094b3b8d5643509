use super::dispatcher::NotificationDispatcher;
use super::registry::{CorrelationRegistry, Outcome};
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::domain::message::{
    BalanceSnapshot, Notification, NotificationKind, RequestId, RequestPayload, ResponsePayload,
};
use crate::domain::ports::{Transport, TransportBox, TransportEvent};
use crate::domain::swap::Swap;
use crate::error::{ClientError, RequestError, Result};
use crate::interfaces::wire::codec::{self, ParsedMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Whether the connection behind a session is still usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down(String),
}

/// One client connection to the server.
///
/// Owns the correlation registry and notification dispatcher for the connection and
/// runs the inbound listener task that feeds them. Requests issued through the
/// session are matched to their responses purely by id, so any number of callers
/// (for example several swap workflows) can share one session.
pub struct ClientSession {
    registry: Arc<CorrelationRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    transport: Arc<dyn Transport>,
    balances: watch::Receiver<Option<BalanceSnapshot>>,
    link: watch::Receiver<LinkState>,
    request_timeout: Duration,
    listener: JoinHandle<()>,
}

impl ClientSession {
    /// Starts listening on `events` and sends requests through `transport`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(transport: TransportBox, events: mpsc::Receiver<TransportEvent>) -> Self {
        let registry = Arc::new(CorrelationRegistry::new());
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (balances_tx, balances) = watch::channel(None);
        let (link_tx, link) = watch::channel(LinkState::Up);

        dispatcher.on(NotificationKind::Balances, move |notification| {
            let Notification::Balances { balances } = notification;
            balances_tx.send_replace(Some(balances.clone()));
            Ok(())
        });

        let listener = tokio::spawn(listen(
            events,
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            link_tx,
        ));

        Self {
            registry,
            dispatcher,
            transport: Arc::from(transport),
            balances,
            link,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            listener,
        }
    }

    /// Sets the bound used by `request`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Watches the most recent balance snapshot pushed by the server.
    pub fn balances(&self) -> watch::Receiver<Option<BalanceSnapshot>> {
        self.balances.clone()
    }

    pub fn latest_balances(&self) -> Option<BalanceSnapshot> {
        self.balances.borrow().clone()
    }

    pub fn link(&self) -> watch::Receiver<LinkState> {
        self.link.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.link.borrow() == LinkState::Up
    }

    /// Sends `payload` and waits for its answer, bounded by the session's request timeout.
    pub async fn request(&self, payload: RequestPayload) -> Outcome {
        self.request_with_timeout(payload, self.request_timeout)
            .await
    }

    pub async fn request_with_timeout(&self, payload: RequestPayload, timeout: Duration) -> Outcome {
        let link = self.link.borrow().clone();
        if let LinkState::Down(reason) = link {
            return Err(RequestError::Abandoned(reason));
        }

        let (envelope, handle) = self.registry.register(payload);
        let id = envelope.id;
        // Dropping the wait early (timeout or a cancelled caller) stops tracking the id.
        let _pending = ForgetOnDrop {
            registry: &self.registry,
            id,
        };

        let frame = codec::encode(&envelope).map_err(|e| RequestError::Send(e.to_string()))?;

        tracing::info!(%id, "-> {frame}");
        self.transport
            .send(frame)
            .await
            .map_err(|e| RequestError::Send(e.to_string()))?;

        match tokio::time::timeout(timeout, handle.recv()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(%id, ?timeout, "no response in time");
                Err(RequestError::TimedOut(timeout))
            }
        }
    }

    /// Asks the server for a fresh receive address.
    pub async fn new_address(&self) -> Result<String> {
        match self.request(RequestPayload::NewAddress {}).await? {
            ResponsePayload::NewAddress { address } => Ok(address),
            other => Err(ClientError::Decode(format!(
                "unexpected {} response",
                other.tag()
            ))),
        }
    }

    /// Lists the swaps the server knows about for this client.
    pub async fn swaps(&self) -> Result<Vec<Swap>> {
        match self.request(RequestPayload::GetSwaps {}).await? {
            ResponsePayload::GetSwaps { swaps } => Ok(swaps),
            other => Err(ClientError::Decode(format!(
                "unexpected {} response",
                other.tag()
            ))),
        }
    }

    /// Fails everything still pending and stops the listener.
    pub fn shutdown(&self) {
        self.registry.abandon_all("client shutdown");
        self.listener.abort();
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

struct ForgetOnDrop<'a> {
    registry: &'a CorrelationRegistry,
    id: RequestId,
}

impl Drop for ForgetOnDrop<'_> {
    fn drop(&mut self) {
        self.registry.forget(self.id);
    }
}

async fn listen(
    mut events: mpsc::Receiver<TransportEvent>,
    registry: Arc<CorrelationRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    link: watch::Sender<LinkState>,
) {
    let reason = loop {
        let Some(event) = events.recv().await else {
            break "transport closed".to_string();
        };

        match event {
            TransportEvent::Connected => tracing::info!("connected"),
            TransportEvent::Frame(frame) => handle_frame(&frame, &registry, &dispatcher),
            TransportEvent::Error(detail) => break format!("transport error: {detail}"),
            TransportEvent::Disconnected(reason) => break reason,
        }
    };

    tracing::warn!(%reason, "disconnected");
    registry.abandon_all(&reason);
    link.send_replace(LinkState::Down(reason));
}

fn handle_frame(frame: &str, registry: &CorrelationRegistry, dispatcher: &NotificationDispatcher) {
    tracing::debug!("raw <- {frame}");
    let message = codec::decode(frame);
    tracing::info!("<- {message}");

    match message {
        ParsedMessage::Response { id, payload } => {
            registry.resolve(id, Ok(payload));
        }
        ParsedMessage::Error(error) => match error.id {
            Some(id) => {
                registry.resolve(id, Err(RequestError::Server(error)));
            }
            None => tracing::warn!(code = %error.code, text = %error.text, "unsolicited server error"),
        },
        ParsedMessage::Notification(notification) => {
            dispatcher.dispatch(&notification);
        }
        ParsedMessage::DecodeFailure(reason) => {
            tracing::warn!(%reason, "dropping undecodable frame");
        }
    }
}
