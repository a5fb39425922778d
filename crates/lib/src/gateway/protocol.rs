//! Gateway HTTP wire types: webhook response envelopes and the send request body.

use crate::error::Result;
use crate::msg::{ChannelEventType, Event, MsgId, MsgOrigin, OutgoingMessage};
use crate::status::MsgStatus;
use crate::urn::Urn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body returned for every webhook call: `{ "message", "data": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub message: String,
    pub data: Vec<ResponseData>,
}

impl WebhookResponse {
    pub fn handled(events: &[Event]) -> Self {
        Self {
            message: "Events Handled".to_string(),
            data: events.iter().map(ResponseData::from).collect(),
        }
    }

    pub fn ignored(reason: impl Into<String>) -> Self {
        Self {
            message: "Ignored".to_string(),
            data: vec![ResponseData::Info { info: reason.into() }],
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            message: "Error".to_string(),
            data: vec![ResponseData::Error { error: error.into() }],
        }
    }
}

/// One entry of `data`, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    Msg {
        channel_uuid: Uuid,
        msg_uuid: Uuid,
        urn: String,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        external_id: Option<String>,
        received_on: DateTime<Utc>,
    },
    Event {
        channel_uuid: Uuid,
        event_uuid: Uuid,
        event_type: ChannelEventType,
        urn: String,
        occurred_on: DateTime<Utc>,
    },
    Status {
        channel_uuid: Uuid,
        external_id: String,
        status: MsgStatus,
    },
    Info {
        info: String,
    },
    Error {
        error: String,
    },
}

impl From<&Event> for ResponseData {
    fn from(event: &Event) -> Self {
        match event {
            Event::Message(m) => Self::Msg {
                channel_uuid: m.channel_uuid,
                msg_uuid: m.uuid,
                urn: m.urn.to_string(),
                text: m.text.clone(),
                attachments: m.attachments.iter().map(|a| a.to_string()).collect(),
                external_id: m.external_id.clone(),
                received_on: m.received_on,
            },
            Event::ChannelEvent(e) => Self::Event {
                channel_uuid: e.channel_uuid,
                event_uuid: e.uuid,
                event_type: e.event_type,
                urn: e.urn.to_string(),
                occurred_on: e.occurred_on,
            },
            Event::Status(s) => Self::Status {
                channel_uuid: s.channel_uuid,
                external_id: s.external_id.clone(),
                status: s.status,
            },
        }
    }
}

/// `POST /send` body.
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub channel_type: String,
    pub channel_uuid: Uuid,
    /// Backend message id; the gateway assigns one when absent.
    #[serde(default)]
    pub msg_id: Option<i64>,
    pub urn: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub quick_replies: Vec<String>,
    #[serde(default)]
    pub high_priority: bool,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub origin: MsgOrigin,
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl SendRequest {
    /// Build the outgoing message. Fails with `InvalidAddress` when the URN does not parse.
    pub fn into_message(self, fallback_id: MsgId) -> Result<OutgoingMessage> {
        let urn: Urn = self.urn.parse()?;
        let id = self.msg_id.map(MsgId).unwrap_or(fallback_id);
        let mut builder = OutgoingMessage::builder(id, self.channel_uuid, urn)
            .text(self.text)
            .high_priority(self.high_priority)
            .origin(self.origin);
        for a in &self.attachments {
            builder = builder.attachment(a);
        }
        for q in self.quick_replies {
            builder = builder.quick_reply(q);
        }
        if let Some(locale) = self.locale {
            builder = builder.locale(locale);
        }
        if let Some(user_id) = self.user_id {
            builder = builder.user_id(user_id);
        }
        Ok(builder.build())
    }
}
