use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::RelayConfig;

use super::backend::{HttpTokenBackend, TokenBackend};
use super::origin::AllowList;
use super::storage::TokenStorage;
use super::types::{
    InboundCommand, InboundMessage, OutboundCommand, OutboundMessage, TokenPair,
    ACCESS_TOKEN_KEY, READY_MESSAGE, REFRESH_TOKEN_KEY,
};
use super::window::{MessageEvent, MessageSource, ReplyTarget, ANY_ORIGIN};
use super::RelayError;

/// Why a message was dropped without reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    OriginNotAllowed,
    SourceNotWindow,
}

/// What the handler did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Dropped by the security filter
    Rejected(RejectReason),
    /// Not a command the relay understands
    Ignored,
    Replied(OutboundCommand),
}

/// Token relay
///
/// Answers `get_token` and `refresh_token` requests from allow-listed windows.
/// Cloning is cheap; clones share configuration, storage and backend.
#[derive(Clone)]
pub struct TokenRelay {
    allowed_origins: Arc<AllowList>,
    storage: Arc<dyn TokenStorage>,
    backend: Arc<dyn TokenBackend>,
}

impl TokenRelay {
    pub fn new(
        allowed_origins: AllowList,
        storage: Arc<dyn TokenStorage>,
        backend: Arc<dyn TokenBackend>,
    ) -> Self {
        Self {
            allowed_origins: Arc::new(allowed_origins),
            storage,
            backend,
        }
    }

    /// Relay talking to the configured backend over HTTP
    pub fn from_config(config: &RelayConfig, storage: Arc<dyn TokenStorage>) -> anyhow::Result<Self> {
        let backend = HttpTokenBackend::new(&config.backend_url, config.request_timeout)?;
        tracing::info!(
            "Relay configured: {} allowed origin(s), backend {}",
            config.allowed_origins.len(),
            backend.endpoint()
        );

        Ok(Self::new(
            config.allowed_origins.clone(),
            storage,
            Arc::new(backend),
        ))
    }

    /// Tell the embedding context the relay is ready. No-op at top level.
    pub fn announce_ready(&self, parent: Option<&dyn ReplyTarget>) {
        if let Some(parent) = parent {
            tracing::debug!("Announcing readiness to parent");
            parent.post_message(Value::String(READY_MESSAGE.to_string()), ANY_ORIGIN);
        }
    }

    /// Announce readiness, then handle events in delivery order.
    ///
    /// Each event runs on its own task so slow refreshes do not block later
    /// messages. Returns once the channel is closed and all handlers finished.
    pub async fn run(
        self,
        parent: Option<Arc<dyn ReplyTarget>>,
        mut events: mpsc::Receiver<MessageEvent>,
    ) {
        self.announce_ready(parent.as_deref());

        let mut in_flight = JoinSet::new();
        while let Some(event) = events.recv().await {
            let relay = self.clone();
            in_flight.spawn(async move { relay.handle(event).await });

            // Reap finished handlers so the set does not grow unbounded
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        tracing::debug!("Relay event channel closed");
    }

    /// Handle one inbound message
    pub async fn handle(&self, event: MessageEvent) -> Outcome {
        if !self.allowed_origins.contains(&event.origin) {
            tracing::debug!(origin = %event.origin, "Dropping message from origin not in allow-list");
            return Outcome::Rejected(RejectReason::OriginNotAllowed);
        }

        let window = match event.source {
            Some(MessageSource::Window(window)) => window,
            other => {
                tracing::debug!(origin = %event.origin, source = ?other, "Dropping message from non-window source");
                return Outcome::Rejected(RejectReason::SourceNotWindow);
            }
        };

        let Some(message) = InboundMessage::from_value(&event.data) else {
            tracing::debug!(origin = %event.origin, "Ignoring malformed message");
            return Outcome::Ignored;
        };

        let reply = match message.command() {
            InboundCommand::GetToken => self.get_token(&message),
            InboundCommand::RefreshToken => self.refresh_token(&message).await,
            InboundCommand::Unknown(command) => {
                tracing::debug!(origin = %event.origin, command = %command, "Ignoring unknown command");
                return Outcome::Ignored;
            }
        };

        let command = reply.command;
        window.post_message(reply.to_value(), &event.origin);
        Outcome::Replied(command)
    }

    fn get_token(&self, message: &InboundMessage) -> OutboundMessage {
        match self.read_tokens() {
            Ok((access_token, refresh_token)) => {
                OutboundMessage::set_token(message.id.clone(), access_token, refresh_token)
            }
            Err(e) => {
                tracing::error!("Failed to read stored tokens: {}", e);
                OutboundMessage::error(message.id.clone(), e.to_string())
            }
        }
    }

    async fn refresh_token(&self, message: &InboundMessage) -> OutboundMessage {
        match self.refresh_and_store(message).await {
            Ok(pair) => OutboundMessage::set_token(
                message.id.clone(),
                Some(pair.access_token),
                Some(pair.refresh_token),
            ),
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                OutboundMessage::error(message.id.clone(), e.to_string())
            }
        }
    }

    async fn refresh_and_store(&self, message: &InboundMessage) -> Result<TokenPair, RelayError> {
        let request = message
            .refresh_request()
            .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;
        let pair = self.backend.refresh(&request).await?;

        self.storage.set_all(&[
            (ACCESS_TOKEN_KEY, pair.access_token.as_str()),
            (REFRESH_TOKEN_KEY, pair.refresh_token.as_str()),
        ])?;

        tracing::info!("Stored refreshed token pair");
        Ok(pair)
    }

    fn read_tokens(&self) -> Result<(Option<String>, Option<String>), RelayError> {
        let access_token = self.storage.get(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.storage.get(REFRESH_TOKEN_KEY)?;
        Ok((access_token, refresh_token))
    }
}
