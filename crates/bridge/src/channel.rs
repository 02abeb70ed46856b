//! Named publish/subscribe channels.
//!
//! Delivery order on one channel matches publish order. Nothing is promised
//! across different channel names.

use std::{
    collections::HashMap,
    fmt,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(
        "invalid channel name {0:?}: only alphanumeric characters, '-', '/', ':' and '_' are allowed"
    )]
    InvalidName(String),
    #[error("event bus is closed")]
    Closed,
    #[error("failed to encode payload for channel {channel}: {source}")]
    Encode {
        channel: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Attaches a listener. The returned subscription is live once this
    /// resolves: anything published afterwards is delivered to it.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ChannelError>;

    /// Delivers `payload` to every current subscriber of `channel` and returns
    /// how many received it.
    async fn publish(&self, channel: &str, payload: Value) -> Result<usize, ChannelError>;
}

pub async fn publish_serialized<T>(
    events: &dyn EventChannel,
    channel: &str,
    payload: &T,
) -> Result<usize, ChannelError>
where
    T: Serialize + ?Sized + Sync,
{
    let payload = serde_json::to_value(payload).map_err(|source| ChannelError::Encode {
        channel: channel.to_string(),
        source,
    })?;
    events.publish(channel, payload).await
}

pub fn validate_channel_name(channel: &str) -> Result<(), ChannelError> {
    let valid = !channel.is_empty()
        && channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '/' | ':' | '_'));
    if valid {
        Ok(())
    } else {
        Err(ChannelError::InvalidName(channel.to_string()))
    }
}

type Release = Box<dyn FnOnce(SubscriptionId) + Send>;

/// Handle to one listener on a named channel.
///
/// Messages are yielded through [`Stream`] or [`Subscription::recv`]. The
/// listener is detached exactly once, either by [`Subscription::unsubscribe`]
/// or when the handle is dropped; buffered messages are discarded with it.
pub struct Subscription {
    id: SubscriptionId,
    channel: String,
    rx: mpsc::UnboundedReceiver<Value>,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        channel: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Value>,
        release: impl FnOnce(SubscriptionId) + Send + 'static,
    ) -> Self {
        Self {
            id,
            channel: channel.into(),
            rx,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Takes an already buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.release_listener();
    }

    fn release_listener(&mut self) {
        if let Some(release) = self.release.take() {
            self.rx.close();
            release(self.id);
            debug!(channel = %self.channel, subscription = self.id.0, "channel listener released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_listener();
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("released", &self.release.is_none())
            .finish()
    }
}

struct Listener {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct ListenerTable {
    closed: bool,
    listeners: HashMap<String, Vec<Listener>>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    table: Mutex<ListenerTable>,
}

impl BusInner {
    fn table(&self) -> MutexGuard<'_, ListenerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_listener(&self, channel: &str, id: SubscriptionId) {
        let mut table = self.table();
        if let Some(listeners) = table.listeners.get_mut(channel) {
            listeners.retain(|listener| listener.id != id);
            if listeners.is_empty() {
                table.listeners.remove(channel);
            }
        }
    }
}

/// In-process [`EventChannel`] shared by the client surface and the backend.
#[derive(Clone, Default)]
pub struct LocalEventBus {
    inner: Arc<BusInner>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .table()
            .listeners
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Detaches every listener and refuses further traffic. Open
    /// subscriptions observe the end of their stream.
    pub fn close(&self) {
        let mut table = self.inner.table();
        table.closed = true;
        table.listeners.clear();
        debug!("event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.table().closed
    }

    fn attach(&self, channel: &str) -> Result<Subscription, ChannelError> {
        validate_channel_name(channel)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        {
            let mut table = self.inner.table();
            if table.closed {
                return Err(ChannelError::Closed);
            }
            table
                .listeners
                .entry(channel.to_string())
                .or_default()
                .push(Listener { id, tx });
        }
        debug!(channel, subscription = id.0, "channel listener attached");

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        let owned_channel = channel.to_string();
        Ok(Subscription::new(id, channel, rx, move |id| {
            if let Some(inner) = weak.upgrade() {
                inner.remove_listener(&owned_channel, id);
            }
        }))
    }

    fn deliver(&self, channel: &str, payload: Value) -> Result<usize, ChannelError> {
        validate_channel_name(channel)?;

        let mut table = self.inner.table();
        if table.closed {
            return Err(ChannelError::Closed);
        }
        let Some(listeners) = table.listeners.get_mut(channel) else {
            trace!(channel, "published with no listeners");
            return Ok(0);
        };

        // A send only fails once the receiving handle closed; prune it here.
        listeners.retain(|listener| listener.tx.send(payload.clone()).is_ok());
        let delivered = listeners.len();
        if listeners.is_empty() {
            table.listeners.remove(channel);
        }
        trace!(channel, delivered, "published");
        Ok(delivered)
    }
}

#[async_trait]
impl EventChannel for LocalEventBus {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ChannelError> {
        self.attach(channel)
    }

    async fn publish(&self, channel: &str, payload: Value) -> Result<usize, ChannelError> {
        self.deliver(channel, payload)
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
