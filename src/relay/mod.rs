// Cross-origin token relay
// Mediates access to locally stored tokens for allow-listed parent windows

mod backend;
mod handler;
mod origin;
mod storage;
mod types;
mod window;

use thiserror::Error;

pub use backend::{BackendFuture, HttpTokenBackend, RefreshError, TokenBackend, TOKENS_PATH};
pub use handler::{Outcome, RejectReason, TokenRelay};
pub use origin::{AllowList, OriginError};
pub use storage::{MemoryStorage, SqliteStorage, StorageError, TokenStorage};
pub use types::{
    InboundCommand, InboundMessage, OutboundCommand, OutboundMessage, RefreshRequest, TokenPair,
    ACCESS_TOKEN_KEY, READY_MESSAGE, REFRESH_TOKEN_KEY,
};
pub use window::{
    ChannelWindow, MessageEvent, MessageSource, PostedMessage, ReplyTarget, ANY_ORIGIN,
};

/// Failures surfaced to the requesting window as an `error` reply
#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Recognised command whose fields have the wrong types
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
