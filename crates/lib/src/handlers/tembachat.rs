//! Temba Chat webchat server (type "TWC").
//!
//! The chat server posts JSON events to `receive`; outgoing messages are posted
//! whole (no length limit, attachment URLs appended to the text) to the
//! configured send URL.

use super::{request_http, ChannelHandler, InboundRequest, SendContext, CONFIG_SEND_URL};
use crate::error::{Error, Result};
use crate::msg::{
    Channel, ChannelEvent, ChannelEventType, ChannelType, Event, IncomingMessage, MsgId, MsgOrigin,
    OutgoingMessage,
};
use crate::segment::{self, AttachmentPolicy, LengthUnit};
use crate::status::{StatusErrorKind, StatusUpdate};
use crate::urn::{Urn, WEBCHAT_SCHEME};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const CHANNEL_TYPE: &str = "TWC";
const DEFAULT_SEND_URL: &str = "http://chatserver:8070/send";

#[derive(Debug, Deserialize)]
struct ReceivePayload {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    msg: ReceiveMsg,
    #[serde(default)]
    chat: ReceiveChat,
}

#[derive(Debug, Default, Deserialize)]
struct ReceiveMsg {
    #[serde(default)]
    chat_id: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReceiveChat {
    #[serde(default)]
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    msg_id: MsgId,
    chat_id: &'a str,
    text: &'a str,
    origin: MsgOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
}

pub struct TembaChatHandler {
    client: reqwest::Client,
}

impl Default for TembaChatHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TembaChatHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelHandler for TembaChatHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::from(CHANNEL_TYPE)
    }

    fn name(&self) -> &str {
        "Temba Chat"
    }

    async fn receive(
        &self,
        channel: &Channel,
        _action: &str,
        request: &InboundRequest,
    ) -> Result<Vec<Event>> {
        let payload: ReceivePayload = request.decode_json()?;
        match payload.typ.as_str() {
            "msg_in" => {
                let urn = Urn::from_parts(WEBCHAT_SCHEME, &payload.msg.chat_id)?;
                let msg = IncomingMessage::new(channel, urn, payload.msg.text);
                Ok(vec![Event::Message(msg)])
            }
            "chat_started" => {
                let urn = Urn::from_parts(WEBCHAT_SCHEME, &payload.chat.chat_id)?;
                let evt = ChannelEvent::new(channel, ChannelEventType::NewConversation, urn);
                Ok(vec![Event::ChannelEvent(evt)])
            }
            other => Err(Error::unrecognized(format!("unknown event type '{}'", other))),
        }
    }

    async fn send(
        &self,
        ctx: &SendContext,
        channel: &Channel,
        msg: &OutgoingMessage,
    ) -> Result<StatusUpdate> {
        let send_url = format!(
            "{}?channel={}",
            channel.string_config_or(CONFIG_SEND_URL, DEFAULT_SEND_URL),
            channel.uuid
        );

        let mut status = StatusUpdate::begin(channel.uuid, msg.id());
        // the chat server only renders text, so attachments travel as URLs
        let parts = segment::split(
            msg.text(),
            msg.attachments(),
            0,
            LengthUnit::Chars,
            AttachmentPolicy::InlineUrls,
        );
        if parts.is_empty() {
            status.record_error(StatusErrorKind::EmptyMessage, "message has no text or attachments");
            return Ok(status);
        }
        for part in &parts {
            let payload = SendPayload {
                msg_id: msg.id(),
                chat_id: msg.urn().path(),
                text: &part.text,
                origin: msg.origin(),
                user_id: msg.user_id(),
            };
            let request = self.client.post(&send_url).json(&payload).build()?;
            if let Err(failure) = request_http(ctx, &self.client, request).await {
                failure.record(&mut status);
                return Ok(status);
            }
        }

        // the chat server acknowledges with a bare 2xx and assigns no id
        status.mark_wired(None)?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::MsgStatus;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;
    use uuid::Uuid;

    fn channel(send_url: Option<&str>) -> Channel {
        let ch = Channel::new(Uuid::new_v4(), ChannelType::from(CHANNEL_TYPE), "");
        match send_url {
            Some(url) => ch.with_config(CONFIG_SEND_URL, url),
            None => ch,
        }
    }

    #[tokio::test]
    async fn chat_started_is_new_conversation() {
        let ch = channel(None);
        let req = InboundRequest::json(r#"{"type":"chat_started","chat":{"chat_id":"c1"}}"#);
        let events = TembaChatHandler::new().receive(&ch, "receive", &req).await.unwrap();
        match &events[..] {
            [Event::ChannelEvent(e)] => {
                assert_eq!(e.event_type, ChannelEventType::NewConversation);
                assert_eq!(e.urn.to_string(), "webchat:c1");
                assert_eq!(e.channel_uuid, ch.uuid);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn msg_in_is_incoming_message() {
        let req = InboundRequest::json(r#"{"type":"msg_in","msg":{"chat_id":"65vbbDAQCdPdEWlEhDGy4utO","text":"Hello World"}}"#);
        let events = TembaChatHandler::new()
            .receive(&channel(None), "receive", &req)
            .await
            .unwrap();
        match &events[..] {
            [Event::Message(m)] => {
                assert_eq!(m.urn.to_string(), "webchat:65vbbDAQCdPdEWlEhDGy4utO");
                assert_eq!(m.text, "Hello World");
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_type_and_bad_json_are_unrecognized() {
        let handler = TembaChatHandler::new();
        let ch = channel(None);
        for body in [r#"{"type":"chat_ended","chat":{"chat_id":"c1"}}"#, "not json", "{}"] {
            let result = handler.receive(&ch, "receive", &InboundRequest::json(body)).await;
            assert!(matches!(result, Err(Error::UnrecognizedPayload(_))), "{}", body);
        }
    }

    #[tokio::test]
    async fn missing_chat_id_is_invalid_address() {
        let req = InboundRequest::json(r#"{"type":"msg_in","msg":{"text":"hi"}}"#);
        let result = TembaChatHandler::new().receive(&channel(None), "receive", &req).await;
        assert!(matches!(result, Err(Error::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn send_posts_message_and_wires() {
        let server = MockServer::start();
        let ch = channel(Some(&server.url("/send")));
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/send")
                .query_param("channel", ch.uuid.to_string())
                .json_body(json!({
                    "msg_id": 10,
                    "chat_id": "c1",
                    "text": "hello",
                    "origin": "ticket",
                    "user_id": 3
                }));
            then.status(200).body("{}");
        });
        let msg = OutgoingMessage::builder(MsgId(10), ch.uuid, Urn::from_parts(WEBCHAT_SCHEME, "c1").unwrap())
            .text("hello")
            .origin(MsgOrigin::Ticket)
            .user_id(3)
            .build();
        let status = TembaChatHandler::new()
            .send(&SendContext::default(), &ch, &msg)
            .await
            .unwrap();
        mock.assert_calls(1);
        assert_eq!(status.status(), MsgStatus::Wired);
        assert_eq!(status.external_id(), None);
    }

    #[tokio::test]
    async fn send_error_response_is_errored() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/send");
            then.status(400).body("bad chat");
        });
        let ch = channel(Some(&server.url("/send")));
        let msg = OutgoingMessage::builder(MsgId(11), ch.uuid, Urn::from_parts(WEBCHAT_SCHEME, "c1").unwrap())
            .text("hello")
            .build();
        let status = TembaChatHandler::new()
            .send(&SendContext::default(), &ch, &msg)
            .await
            .unwrap();
        assert_eq!(status.status(), MsgStatus::Errored);
        assert!(status.errors()[0].detail.contains("400"));
    }

    #[tokio::test]
    async fn attachment_only_message_sends_the_url() {
        let server = MockServer::start();
        let ch = channel(Some(&server.url("/send")));
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/send")
                .body_includes("\"text\":\"https://example.com/a.jpg\"");
            then.status(200);
        });
        let msg = OutgoingMessage::builder(MsgId(12), ch.uuid, Urn::from_parts(WEBCHAT_SCHEME, "c1").unwrap())
            .attachment("image/jpeg:https://example.com/a.jpg")
            .build();
        let status = TembaChatHandler::new()
            .send(&SendContext::default(), &ch, &msg)
            .await
            .unwrap();
        mock.assert_calls(1);
        assert_eq!(status.status(), MsgStatus::Wired);
    }

    #[tokio::test]
    async fn empty_message_records_why_nothing_was_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/send");
            then.status(200);
        });
        let ch = channel(Some(&server.url("/send")));
        let msg = OutgoingMessage::builder(MsgId(13), ch.uuid, Urn::from_parts(WEBCHAT_SCHEME, "c1").unwrap()).build();
        let status = TembaChatHandler::new()
            .send(&SendContext::default(), &ch, &msg)
            .await
            .unwrap();
        mock.assert_calls(0);
        assert_eq!(status.status(), MsgStatus::Errored);
        assert_eq!(status.errors()[0].kind, StatusErrorKind::EmptyMessage);
    }
}
