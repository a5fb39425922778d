//! Canonical message model: channels, incoming messages and events, outgoing messages.
//!
//! Handlers build `IncomingMessage`/`ChannelEvent` values from provider payloads and
//! read `OutgoingMessage` values handed over by the backend. Outgoing messages are
//! immutable; construct them through [`OutgoingMessageBuilder`].

use crate::error::{Error, Result};
use crate::status::MsgStatus;
use crate::urn::Urn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Short provider code a channel is registered under (e.g. "CS" for ClickSend).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelType(String);

impl ChannelType {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A configured provider endpoint: sending identity plus credentials and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub uuid: Uuid,
    pub channel_type: ChannelType,
    #[serde(default)]
    pub name: String,
    /// Provider-assigned sending identity (phone number, short code, bot handle).
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

impl Channel {
    pub fn new(uuid: Uuid, channel_type: ChannelType, address: impl Into<String>) -> Self {
        Self {
            uuid,
            channel_type,
            name: String::new(),
            address: address.into(),
            config: HashMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// String config value; empty strings count as unset.
    pub fn string_config(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn string_config_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.string_config(key).unwrap_or(default)
    }

    /// Boolean config value; accepts JSON booleans and "true"/"false" strings.
    pub fn bool_config(&self, key: &str, default: bool) -> bool {
        match self.config.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => default,
        }
    }

    /// Fetch a required string config value or fail with `MissingConfig`.
    pub fn require_config(&self, key: &str) -> Result<&str> {
        self.string_config(key)
            .ok_or_else(|| Error::missing_config(self.channel_type.clone(), key))
    }
}

/// Backend-assigned message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(pub i64);

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media attachment in `content-type:url` form, e.g. `image/jpeg:https://host/a.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub content_type: String,
    pub url: String,
}

impl Attachment {
    /// Split `content-type:url`. A bare URL gets an empty content type.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.split_once(':') {
            Some((ct, url)) if ct.contains('/') => Self {
                content_type: ct.to_string(),
                url: url.to_string(),
            },
            _ => Self {
                content_type: String::new(),
                url: s.to_string(),
            },
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.content_type.is_empty() {
            f.write_str(&self.url)
        } else {
            write!(f, "{}:{}", self.content_type, self.url)
        }
    }
}

impl Serialize for Attachment {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Attachment {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Attachment::parse(&s))
    }
}

/// Message received from a contact through a channel.
#[derive(Debug, Clone, Serialize)]
pub struct IncomingMessage {
    pub uuid: Uuid,
    pub channel_uuid: Uuid,
    pub urn: Urn,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub locale: Option<String>,
    pub external_id: Option<String>,
    pub contact_name: Option<String>,
    pub received_on: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &Channel, urn: Urn, text: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            channel_uuid: channel.uuid,
            urn,
            text: text.into(),
            attachments: Vec::new(),
            locale: None,
            external_id: None,
            contact_name: None,
            received_on: Utc::now(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_contact_name(mut self, name: impl Into<String>) -> Self {
        self.contact_name = Some(name.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_received_on(mut self, at: DateTime<Utc>) -> Self {
        self.received_on = at;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventType {
    NewConversation,
    Referral,
    StopContact,
    WelcomeMessage,
}

/// Non-message signal from a channel (e.g. a contact opened a chat).
#[derive(Debug, Clone, Serialize)]
pub struct ChannelEvent {
    pub uuid: Uuid,
    pub channel_uuid: Uuid,
    pub event_type: ChannelEventType,
    pub urn: Urn,
    pub extra: HashMap<String, String>,
    pub occurred_on: DateTime<Utc>,
}

impl ChannelEvent {
    pub fn new(channel: &Channel, event_type: ChannelEventType, urn: Urn) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            channel_uuid: channel.uuid,
            event_type,
            urn,
            extra: HashMap::new(),
            occurred_on: Utc::now(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Delivery receipt reported by a provider for a previously sent message.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReceipt {
    pub channel_uuid: Uuid,
    pub external_id: String,
    pub status: MsgStatus,
}

/// What a handler extracted from one inbound request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Message(IncomingMessage),
    ChannelEvent(ChannelEvent),
    Status(StatusReceipt),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgOrigin {
    #[default]
    Flow,
    Broadcast,
    Ticket,
    Chat,
}

/// Message to be sent to a contact. Read-only once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    id: MsgId,
    uuid: Uuid,
    channel_uuid: Uuid,
    urn: Urn,
    #[serde(default)]
    text: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(default)]
    high_priority: bool,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    quick_replies: Vec<String>,
    #[serde(default)]
    origin: MsgOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
}

impl OutgoingMessage {
    pub fn builder(id: MsgId, channel_uuid: Uuid, urn: Urn) -> OutgoingMessageBuilder {
        OutgoingMessageBuilder::new(id, channel_uuid, urn)
    }

    pub fn id(&self) -> MsgId {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn channel_uuid(&self) -> Uuid {
        self.channel_uuid
    }

    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn high_priority(&self) -> bool {
        self.high_priority
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn quick_replies(&self) -> &[String] {
        &self.quick_replies
    }

    pub fn origin(&self) -> MsgOrigin {
        self.origin
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }
}

/// Assembles an [`OutgoingMessage`]; the message itself exposes no setters.
#[derive(Debug, Clone)]
pub struct OutgoingMessageBuilder {
    msg: OutgoingMessage,
}

impl OutgoingMessageBuilder {
    pub fn new(id: MsgId, channel_uuid: Uuid, urn: Urn) -> Self {
        Self {
            msg: OutgoingMessage {
                id,
                uuid: Uuid::new_v4(),
                channel_uuid,
                urn,
                text: String::new(),
                attachments: Vec::new(),
                high_priority: false,
                locale: None,
                quick_replies: Vec::new(),
                origin: MsgOrigin::default(),
                user_id: None,
                metadata: None,
            },
        }
    }

    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.msg.uuid = uuid;
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.msg.text = text.into();
        self
    }

    pub fn attachment(mut self, attachment: impl AsRef<str>) -> Self {
        self.msg.attachments.push(Attachment::parse(attachment.as_ref()));
        self
    }

    pub fn high_priority(mut self, high: bool) -> Self {
        self.msg.high_priority = high;
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.msg.locale = Some(locale.into());
        self
    }

    pub fn quick_reply(mut self, reply: impl Into<String>) -> Self {
        self.msg.quick_replies.push(reply.into());
        self
    }

    pub fn origin(mut self, origin: MsgOrigin) -> Self {
        self.msg.origin = origin;
        self
    }

    pub fn user_id(mut self, user_id: i64) -> Self {
        self.msg.user_id = Some(user_id);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.msg.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> OutgoingMessage {
        self.msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> Channel {
        Channel::new(Uuid::new_v4(), ChannelType::from("CS"), "+12065550199")
            .with_config("username", "u")
            .with_config("password", "  ")
            .with_config("use_national", "true")
    }

    #[test]
    fn require_config_treats_blank_as_missing() {
        let ch = channel();
        assert_eq!(ch.require_config("username").unwrap(), "u");
        let err = ch.require_config("password").unwrap_err();
        assert!(matches!(err, Error::MissingConfig { ref key, .. } if key == "password"));
        assert_eq!(err.to_string(), "missing 'password' config for CS channel");
    }

    #[test]
    fn bool_config_accepts_strings() {
        let ch = channel();
        assert!(ch.bool_config("use_national", false));
        assert!(ch.bool_config("absent", true));
    }

    #[test]
    fn attachment_parse() {
        let a = Attachment::parse("image/jpeg:https://example.com/a.jpg");
        assert_eq!(a.content_type, "image/jpeg");
        assert_eq!(a.url, "https://example.com/a.jpg");
        let bare = Attachment::parse("https://example.com/b.png");
        assert_eq!(bare.content_type, "");
        assert_eq!(bare.url, "https://example.com/b.png");
    }

    #[test]
    fn outgoing_message_deserializes_from_backend_json() {
        let json = serde_json::json!({
            "id": 10,
            "uuid": "0191e180-7d60-7000-aded-7d8b151cbd5b",
            "channel_uuid": "8eb23e93-5ecb-45ba-b726-3b064e0c56ab",
            "urn": "tel:+12065550100",
            "text": "hello",
            "attachments": ["image/png:https://example.com/x.png"],
            "origin": "broadcast"
        });
        let msg: OutgoingMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.id(), MsgId(10));
        assert_eq!(msg.text(), "hello");
        assert_eq!(msg.origin(), MsgOrigin::Broadcast);
        assert_eq!(msg.attachments()[0].content_type, "image/png");
        assert!(!msg.high_priority());
    }

    #[test]
    fn builder_sets_fields() {
        let urn = Urn::from_parts("webchat", "c1").unwrap();
        let msg = OutgoingMessage::builder(MsgId(3), Uuid::nil(), urn)
            .text("hi")
            .quick_reply("yes")
            .user_id(7)
            .build();
        assert_eq!(msg.quick_replies(), ["yes".to_string()]);
        assert_eq!(msg.user_id(), Some(7));
        assert_eq!(msg.urn().path(), "c1");
    }
}
