// Browsing-context handles
// The host delivers MessageEvents and supplies handles the relay can reply to

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Wildcard target origin, used only for the readiness broadcast
pub const ANY_ORIGIN: &str = "*";

/// A window-like handle capable of receiving a posted message
pub trait ReplyTarget: Send + Sync {
    /// Post `data` to this context. Delivery is dropped by the host unless the
    /// context's origin matches `target_origin` (or it is `*`).
    fn post_message(&self, data: Value, target_origin: &str);
}

/// Sender handle of a cross-document message
#[derive(Clone)]
pub enum MessageSource {
    Window(Arc<dyn ReplyTarget>),
    MessagePort,
    ServiceWorker,
}

impl fmt::Debug for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSource::Window(_) => f.write_str("Window"),
            MessageSource::MessagePort => f.write_str("MessagePort"),
            MessageSource::ServiceWorker => f.write_str("ServiceWorker"),
        }
    }
}

/// An inbound cross-document message
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Sender origin as serialized by the host
    pub origin: String,
    pub source: Option<MessageSource>,
    pub data: Value,
}

impl MessageEvent {
    pub fn from_window(origin: impl Into<String>, window: Arc<dyn ReplyTarget>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            source: Some(MessageSource::Window(window)),
            data,
        }
    }
}

/// A message as it was posted through a `ChannelWindow`
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub data: Value,
    pub target_origin: String,
}

/// `ReplyTarget` that forwards posted messages into a channel.
///
/// Hosts bridge this to their real window; tests read the receiver.
#[derive(Clone)]
pub struct ChannelWindow {
    tx: mpsc::UnboundedSender<PostedMessage>,
}

impl ChannelWindow {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PostedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReplyTarget for ChannelWindow {
    fn post_message(&self, data: Value, target_origin: &str) {
        let message = PostedMessage {
            data,
            target_origin: target_origin.to_string(),
        };
        if self.tx.send(message).is_err() {
            // Window is gone
            tracing::debug!("Dropping message posted to a closed window");
        }
    }
}
