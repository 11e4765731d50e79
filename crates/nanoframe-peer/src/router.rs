use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_core::Stream;
use nanoframe_frame::Notification;
use serde_json::Value;
use tokio::sync::mpsc;

/// Callback invoked with `(method, params)` for each engine notification.
pub type NotifyHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Delivers engine notifications.
///
/// There is one handler slot: registering a handler replaces the previous
/// one. Consumers that need to observe notifications independently use
/// [`subscribe`](Self::subscribe) instead, which never displaces anyone.
pub struct NotificationRouter {
    handler: Mutex<Option<NotifyHandler>>,
    subscribers: Mutex<Vec<mpsc::Sender<Notification>>>,
    capacity: usize,
}

impl NotificationRouter {
    pub fn new(capacity: usize) -> Self {
        Self {
            handler: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register the handler, returning the one it replaced.
    pub fn set_handler(&self, handler: NotifyHandler) -> Option<NotifyHandler> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handler)
    }

    pub fn clear_handler(&self) -> Option<NotifyHandler> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Open a new independent stream of notifications.
    ///
    /// A subscriber that falls more than `capacity` notifications behind
    /// misses the overflow; the read loop never waits on it.
    pub fn subscribe(&self) -> NotificationStream {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        NotificationStream { rx }
    }

    /// Deliver one notification to the handler and every live subscriber.
    pub fn dispatch(&self, note: Notification) {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if handler.is_none() && subscribers.is_empty() {
            tracing::trace!(method = %note.method, "notification dropped: no handler registered");
            return;
        }

        subscribers.retain(|tx| match tx.try_send(note.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(method = %note.method, "notification subscriber lagging, dropped one");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        drop(subscribers);

        // Called without holding any lock so the handler may re-register.
        if let Some(handler) = handler {
            handler(&note.method, &note.params);
        }
    }

    /// Drop every subscriber, ending their streams.
    pub fn close(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Stream of notifications returned by [`NotificationRouter::subscribe`].
///
/// Ends when the connection closes.
#[derive(Debug)]
pub struct NotificationStream {
    rx: mpsc::Receiver<Notification>,
}

impl NotificationStream {
    /// Receive the next notification, or `None` once the connection closed.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

impl Stream for NotificationStream {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
