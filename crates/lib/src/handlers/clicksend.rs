//! ClickSend SMS (type "CS").
//!
//! Parts are limited to 1224 characters (ClickSend bills per character); attachments
//! are sent as URLs appended to the text. Each part is a separate POST and
//! ClickSend returns one message id per part, of which only the last is kept.

use super::{
    receive_tel_message, request_http, ChannelHandler, InboundRequest, SendContext, ACTION_RECEIVE,
    ACTION_STATUS, CONFIG_PASSWORD, CONFIG_SEND_URL, CONFIG_USERNAME,
};
use crate::error::{Error, Result};
use crate::msg::{Channel, ChannelType, Event, OutgoingMessage, StatusReceipt};
use crate::segment::{self, AttachmentPolicy, LengthUnit};
use crate::status::{MsgStatus, StatusErrorKind, StatusUpdate};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};

pub const CHANNEL_TYPE: &str = "CS";
const SEND_URL: &str = "https://rest.clicksend.com/v3/sms/send";
const MAX_MSG_LENGTH: usize = 1224;
const SOURCE: &str = "relay";

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    messages: [SendMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    to: &'a str,
    from: &'a str,
    body: &'a str,
    source: &'a str,
}

/// `{"data": {"messages": [{"status": "SUCCESS", "message_id": "..."}]}}`
#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    data: Option<SendResponseData>,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponseData {
    #[serde(default)]
    messages: Vec<SendResponseMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponseMessage {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message_id: Option<String>,
}

pub struct ClickSendHandler {
    client: reqwest::Client,
}

impl Default for ClickSendHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClickSendHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Delivery receipt: form fields `message_id` and `status`.
    fn receive_status(&self, channel: &Channel, request: &InboundRequest) -> Result<Vec<Event>> {
        let external_id = request
            .form_value("message_id")
            .ok_or_else(|| Error::unrecognized("missing message_id in status callback"))?;
        let reported = request.form_value("status").unwrap_or_default();
        let status = match reported.as_str() {
            "Delivered" => MsgStatus::Delivered,
            "Sent" | "Queued" => MsgStatus::Sent,
            "Undelivered" | "Failed" | "Expired" | "Rejected" => MsgStatus::Failed,
            other => {
                return Err(Error::unrecognized(format!("unknown status '{}'", other)));
            }
        };
        Ok(vec![Event::Status(StatusReceipt {
            channel_uuid: channel.uuid,
            external_id,
            status,
        })])
    }
}

/// Stop partway through a multi-part send. Ids of parts already accepted are only logged.
fn abandon(status: &StatusUpdate, part: usize, total: usize, accepted_id: Option<&str>) {
    if let Some(id) = accepted_id {
        log::warn!(
            "msg {}: part {}/{} failed after earlier parts were accepted (last id {}), reporting errored",
            status.msg_id(),
            part + 1,
            total,
            id
        );
    }
}

#[async_trait]
impl ChannelHandler for ClickSendHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::from(CHANNEL_TYPE)
    }

    fn name(&self) -> &str {
        "ClickSend"
    }

    fn actions(&self) -> &[&'static str] {
        &[ACTION_RECEIVE, ACTION_STATUS]
    }

    async fn receive(
        &self,
        channel: &Channel,
        action: &str,
        request: &InboundRequest,
    ) -> Result<Vec<Event>> {
        match action {
            ACTION_RECEIVE => receive_tel_message(channel, request, "from", "body"),
            ACTION_STATUS => self.receive_status(channel, request),
            other => Err(Error::unrecognized(format!("unknown action '{}'", other))),
        }
    }

    async fn send(
        &self,
        ctx: &SendContext,
        channel: &Channel,
        msg: &OutgoingMessage,
    ) -> Result<StatusUpdate> {
        let username = channel.require_config(CONFIG_USERNAME)?;
        let password = channel.require_config(CONFIG_PASSWORD)?;
        let send_url = channel.string_config_or(CONFIG_SEND_URL, SEND_URL);

        let mut status = StatusUpdate::begin(channel.uuid, msg.id());
        let parts = segment::split(
            msg.text(),
            msg.attachments(),
            MAX_MSG_LENGTH,
            LengthUnit::Chars,
            AttachmentPolicy::InlineUrls,
        );
        if parts.is_empty() {
            status.record_error(StatusErrorKind::EmptyMessage, "message has no text or attachments");
            return Ok(status);
        }

        let mut external_id: Option<String> = None;
        for (i, part) in parts.iter().enumerate() {
            let payload = SendPayload {
                messages: [SendMessage {
                    to: msg.urn().path(),
                    from: &channel.address,
                    body: &part.text,
                    source: SOURCE,
                }],
            };
            let request = self
                .client
                .post(send_url)
                .header(ACCEPT, "application/json")
                .basic_auth(username, Some(password))
                .json(&payload)
                .build()?;

            let resp = match request_http(ctx, &self.client, request).await {
                Ok(resp) => resp,
                Err(failure) => {
                    failure.record(&mut status);
                    abandon(&status, i, parts.len(), external_id.as_deref());
                    return Ok(status);
                }
            };

            let ack = resp
                .json::<SendResponse>()
                .ok()
                .and_then(|r| r.data)
                .and_then(|d| d.messages.into_iter().next())
                .unwrap_or_default();
            if ack.status != "SUCCESS" {
                status.record_error(
                    StatusErrorKind::ProviderRejected,
                    format!("received non SUCCESS status: {}", ack.status),
                );
                abandon(&status, i, parts.len(), external_id.as_deref());
                return Ok(status);
            }

            match ack.message_id.filter(|id| !id.is_empty()) {
                Some(id) => external_id = Some(id),
                None => status.record_error(
                    StatusErrorKind::MissingExternalId,
                    format!("unable to get message_id for part {}", i + 1),
                ),
            }
        }

        status.mark_wired(external_id)?;
        Ok(status)
    }
}
