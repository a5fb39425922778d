//! Error taxonomy shared by handlers, the registry and the dispatcher.
//!
//! Provider-side failures during a send (transport errors, non-2xx responses,
//! explicit rejections) are not represented here: they end up as
//! [`StatusError`](crate::status::StatusError) entries on the returned status
//! update. Only failures the caller has to act on surface as `Error`.

use crate::msg::ChannelType;
use crate::status::MsgStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required channel configuration key is absent or empty. Retrying cannot help.
    #[error("missing '{key}' config for {channel_type} channel")]
    MissingConfig {
        channel_type: ChannelType,
        key: String,
    },

    /// A payload carried an address that cannot be turned into a URN.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The payload does not match any event shape the handler knows. Reported as ignored.
    #[error("unrecognized payload: {0}")]
    UnrecognizedPayload(String),

    #[error("unknown channel type: {0}")]
    UnknownChannelType(String),

    #[error("unknown channel: {channel_type} {uuid}")]
    UnknownChannel {
        channel_type: ChannelType,
        uuid: uuid::Uuid,
    },

    #[error("channel type {channel_type} has no '{action}' action")]
    UnknownAction {
        channel_type: ChannelType,
        action: String,
    },

    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: MsgStatus, to: MsgStatus },

    /// Building a provider request failed (malformed URL, body encoding).
    #[error("request construction failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Backend stand-in failures.
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    pub fn missing_config(channel_type: ChannelType, key: impl Into<String>) -> Self {
        Self::MissingConfig {
            channel_type,
            key: key.into(),
        }
    }

    pub fn invalid_address(message: impl std::fmt::Display) -> Self {
        Self::InvalidAddress(message.to_string())
    }

    pub fn unrecognized(message: impl std::fmt::Display) -> Self {
        Self::UnrecognizedPayload(message.to_string())
    }

    /// True for errors caused by what the caller sent (bad address, bad config, unknown route).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig { .. } | Self::InvalidAddress(_) | Self::UnrecognizedPayload(_)
        )
    }

    /// True for routing failures that map to "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownChannelType(_) | Self::UnknownChannel { .. } | Self::UnknownAction { .. }
        )
    }
}
