use crate::domain::message::{Notification, NotificationKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&Notification) -> Result<(), HandlerError> + Send + Sync>;

/// Routes server-pushed notifications to the observers subscribed to their kind.
#[derive(Default)]
pub struct NotificationDispatcher {
    handlers: RwLock<HashMap<NotificationKind, Vec<Handler>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to notifications of `kind`.
    pub fn on<F>(&self, kind: NotificationKind, handler: F)
    where
        F: Fn(&Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Runs every subscriber of the notification's kind, in subscription order.
    ///
    /// A failing or panicking handler is logged and skipped; the rest still run.
    /// Returns how many handlers completed successfully.
    pub fn dispatch(&self, notification: &Notification) -> usize {
        let kind = notification.kind();
        // Snapshot so handlers may subscribe without deadlocking.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::debug!(?kind, "no subscribers for notification");
        }

        let mut delivered = 0;
        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(?kind, handler = index, error = %e, "notification handler failed")
                }
                Err(_) => tracing::warn!(?kind, handler = index, "notification handler panicked"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, kind: NotificationKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }
}
