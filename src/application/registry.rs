use crate::domain::message::{PayloadTag, RequestEnvelope, RequestId, RequestPayload, ResponsePayload};
use crate::error::RequestError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;

pub type Outcome = Result<ResponsePayload, RequestError>;

/// A request that has been sent and is waiting for its answer.
struct PendingRequest {
    tag: PayloadTag,
    created_at: Instant,
    resolver: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct Inner {
    /// Last id handed out; ids start at 1.
    last_id: u64,
    pending: HashMap<RequestId, PendingRequest>,
    /// Set once the connection is gone; later registrations fail immediately.
    closed: Option<String>,
}

/// What `resolve` did with an inbound answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Delivered,
    /// The id was issued but is no longer pending (answered, forgotten or abandoned).
    AlreadySettled,
    /// The id was never issued in this session.
    Unknown,
}

/// Awaitable answer to one registered request.
pub struct ResponseHandle {
    id: RequestId,
    receiver: oneshot::Receiver<Outcome>,
}

impl ResponseHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Waits for the request to be resolved.
    pub async fn recv(self) -> Outcome {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(RequestError::Abandoned("registry dropped".to_string())))
    }
}

/// Matches asynchronous responses to the requests that caused them.
///
/// Owns id allocation and the table of pending requests. Every pending request is
/// settled at most once: by `resolve`, `forget` or `abandon_all`.
#[derive(Default)]
pub struct CorrelationRegistry {
    inner: Mutex<Inner>,
    anomalies: AtomicU64,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id for `payload` and starts tracking it.
    pub fn register(&self, payload: RequestPayload) -> (RequestEnvelope, ResponseHandle) {
        let (resolver, receiver) = oneshot::channel();
        let tag = payload.tag();

        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = RequestId(inner.last_id);

        if let Some(reason) = inner.closed.clone() {
            drop(inner);
            let _ = resolver.send(Err(RequestError::Abandoned(reason)));
        } else {
            inner.pending.insert(
                id,
                PendingRequest {
                    tag,
                    created_at: Instant::now(),
                    resolver,
                },
            );
            tracing::debug!(%id, %tag, pending = inner.pending.len(), "registered request");
        }

        (RequestEnvelope { id, payload }, ResponseHandle { id, receiver })
    }

    /// Delivers the answer for `id` to its waiter, exactly once.
    pub fn resolve(&self, id: RequestId, outcome: Outcome) -> Resolution {
        let (entry, last_id) = {
            let mut inner = self.inner.lock();
            (inner.pending.remove(&id), inner.last_id)
        };

        let Some(pending) = entry else {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
            return if id.0 >= 1 && id.0 <= last_id {
                tracing::warn!(%id, "response for a request that is no longer pending");
                Resolution::AlreadySettled
            } else {
                tracing::warn!(%id, "response for a request that was never issued");
                Resolution::Unknown
            };
        };

        let outcome = match outcome {
            Ok(payload) if payload.tag() != pending.tag => Err(RequestError::TagMismatch {
                expected: pending.tag,
                got: payload.tag(),
            }),
            other => other,
        };

        tracing::debug!(
            %id,
            tag = %pending.tag,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "resolved request"
        );

        if pending.resolver.send(outcome).is_err() {
            tracing::debug!(%id, "waiter went away before the response arrived");
        }
        Resolution::Delivered
    }

    /// Stops tracking `id` without answering it. Returns whether it was pending.
    pub fn forget(&self, id: RequestId) -> bool {
        self.inner.lock().pending.remove(&id).is_some()
    }

    /// Fails every pending request with `reason` and refuses new ones.
    pub fn abandon_all(&self, reason: &str) -> usize {
        let drained: Vec<(RequestId, PendingRequest)> = {
            let mut inner = self.inner.lock();
            inner.closed = Some(reason.to_string());
            inner.pending.drain().collect()
        };

        let count = drained.len();
        for (id, pending) in drained {
            tracing::debug!(%id, tag = %pending.tag, "abandoning request");
            let _ = pending
                .resolver
                .send(Err(RequestError::Abandoned(reason.to_string())));
        }
        if count > 0 {
            tracing::warn!(count, reason, "abandoned pending requests");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Number of unknown or repeated responses seen so far.
    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }
}
