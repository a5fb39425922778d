//! Message status tracking.
//!
//! Two machines live here. The attempt machine governs a single call to a handler's
//! `send`: it starts at `Errored` so that any exit path that never saw an explicit
//! provider acceptance reports a retryable failure. The receipt machine governs
//! later delivery receipts: it only moves a message forward.

use crate::error::{Error, Result};
use crate::msg::MsgId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgStatus {
    /// Accepted by the provider, no delivery confirmation yet.
    Wired,
    /// Provider confirmed it queued or sent the message.
    Sent,
    /// Provider confirmed the message reached the device.
    Delivered,
    /// Recoverable failure; the whole message may be retried.
    Errored,
    /// Terminal failure.
    Failed,
}

impl MsgStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wired => "wired",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Errored => "errored",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Position along the delivery path. Delivered and Failed share the last rank.
    fn rank(self) -> u8 {
        match self {
            Self::Errored => 0,
            Self::Wired => 1,
            Self::Sent => 2,
            Self::Delivered | Self::Failed => 3,
        }
    }

    /// Whether a send attempt may move from `self` to `to`.
    pub fn can_attempt_transition(self, to: MsgStatus) -> bool {
        use MsgStatus::*;
        matches!(
            (self, to),
            (Errored, Wired) | (Errored, Sent) | (Errored, Failed) | (Wired, Sent) | (Wired, Failed) | (Sent, Failed)
        ) || self == to && !self.is_terminal()
    }
}

impl fmt::Display for MsgStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusErrorKind {
    /// Connection error or non-2xx response.
    TransportFailure,
    /// The provider answered but reported the message as not accepted.
    ProviderRejected,
    /// The provider accepted but did not return the id it promised.
    MissingExternalId,
    /// Nothing to send: no text and no attachments.
    EmptyMessage,
    Timeout,
    Canceled,
}

/// Diagnostic recorded on a status update; never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    pub kind: StatusErrorKind,
    pub detail: String,
}

/// Outcome of one send attempt, handed to the backend for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    channel_uuid: Uuid,
    msg_id: MsgId,
    status: MsgStatus,
    external_id: Option<String>,
    errors: Vec<StatusError>,
}

impl StatusUpdate {
    /// Begin an attempt. Status is `Errored` until a handler records explicit acceptance.
    pub fn begin(channel_uuid: Uuid, msg_id: MsgId) -> Self {
        Self {
            channel_uuid,
            msg_id,
            status: MsgStatus::Errored,
            external_id: None,
            errors: Vec::new(),
        }
    }

    pub fn channel_uuid(&self) -> Uuid {
        self.channel_uuid
    }

    pub fn msg_id(&self) -> MsgId {
        self.msg_id
    }

    pub fn status(&self) -> MsgStatus {
        self.status
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn errors(&self) -> &[StatusError] {
        &self.errors
    }

    /// Move the attempt to `to`, refusing anything the attempt machine does not allow.
    pub fn set_status(&mut self, to: MsgStatus) -> Result<()> {
        if !self.status.can_attempt_transition(to) {
            return Err(Error::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Record provider acceptance, attaching the external id when there is one.
    pub fn mark_wired(&mut self, external_id: Option<String>) -> Result<()> {
        self.set_status(MsgStatus::Wired)?;
        if let Some(id) = external_id.filter(|id| !id.is_empty()) {
            self.external_id = Some(id);
        }
        Ok(())
    }

    pub fn record_error(&mut self, kind: StatusErrorKind, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!(
            "msg {} on channel {}: {:?}: {}",
            self.msg_id,
            self.channel_uuid,
            kind,
            detail
        );
        self.errors.push(StatusError { kind, detail });
    }

    /// Apply a delivery receipt to a persisted status, following the receipt machine.
    pub fn apply_receipt(&mut self, reported: MsgStatus) -> ReceiptOutcome {
        let outcome = advance(self.status, reported);
        if let ReceiptOutcome::Advanced(to) = outcome {
            self.status = to;
        }
        outcome
    }
}

/// Result of applying a delivery receipt to a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Advanced(MsgStatus),
    Unchanged,
    Rejected,
}

/// Apply a provider-reported status to the currently stored one.
///
/// Only moves forward from a non-terminal state; everything else is a logged no-op.
pub fn advance(current: MsgStatus, reported: MsgStatus) -> ReceiptOutcome {
    if current == reported {
        return ReceiptOutcome::Unchanged;
    }
    if current.is_terminal() || reported.rank() < current.rank() {
        log::info!("ignoring status receipt moving {} back to {}", current, reported);
        return ReceiptOutcome::Rejected;
    }
    ReceiptOutcome::Advanced(reported)
}
