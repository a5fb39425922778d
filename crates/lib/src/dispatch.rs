//! Routes inbound requests and outgoing messages through the right handler and
//! hands the results to the backend.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::handlers::{InboundRequest, SendContext};
use crate::msg::{Channel, ChannelType, Event, OutgoingMessage, StatusReceipt};
use crate::registry::HandlerRegistry;
use crate::status::{self, ReceiptOutcome, StatusUpdate};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// What became of an inbound request the handler could route.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// Events were extracted and persisted.
    Accepted(Vec<Event>),
    /// The payload was understood well enough to know there is nothing to do.
    Ignored(String),
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    backend: Arc<dyn Backend>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, backend: Arc<dyn Backend>, send_timeout: Duration) -> Self {
        Self {
            registry,
            backend,
            send_timeout,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Fresh context for one send attempt, bounded by the configured timeout.
    pub fn send_context(&self) -> SendContext {
        SendContext::new(self.send_timeout)
    }

    async fn channel(&self, channel_type: &ChannelType, uuid: Uuid) -> Result<Channel> {
        self.backend
            .get_channel(channel_type, uuid)
            .await?
            .ok_or_else(|| Error::UnknownChannel {
                channel_type: channel_type.clone(),
                uuid,
            })
    }

    /// Handle one inbound webhook request for `/c/{channel_type}/{uuid}/{action}`.
    pub async fn receive(
        &self,
        channel_type: &str,
        uuid: Uuid,
        action: &str,
        request: &InboundRequest,
    ) -> Result<ReceiveOutcome> {
        let handler = self.registry.get(channel_type)?;
        let channel_type = handler.channel_type();
        if !handler.actions().contains(&action) {
            return Err(Error::UnknownAction {
                channel_type,
                action: action.to_string(),
            });
        }
        let channel = self.channel(&channel_type, uuid).await?;

        let events = match handler.receive(&channel, action, request).await {
            Ok(events) => events,
            Err(Error::UnrecognizedPayload(reason)) => {
                log::info!("{} {} {}: ignored: {}", channel_type, uuid, action, reason);
                return Ok(ReceiveOutcome::Ignored(reason));
            }
            Err(e) => return Err(e),
        };

        for event in &events {
            match event {
                Event::Message(msg) => self.backend.write_message(msg).await?,
                Event::ChannelEvent(evt) => self.backend.write_channel_event(evt).await?,
                Event::Status(receipt) => {
                    if let Some(reason) = self.apply_receipt(receipt).await? {
                        return Ok(ReceiveOutcome::Ignored(reason));
                    }
                }
            }
        }
        log::debug!("{} {} {}: {} event(s) handled", channel_type, uuid, action, events.len());
        Ok(ReceiveOutcome::Accepted(events))
    }

    /// Apply a delivery receipt. Returns a reason when the receipt matches no sent message.
    async fn apply_receipt(&self, receipt: &StatusReceipt) -> Result<Option<String>> {
        let Some(stored) = self
            .backend
            .lookup_by_external_id(receipt.channel_uuid, &receipt.external_id)
            .await?
        else {
            return Ok(Some(format!("no message with external id '{}'", receipt.external_id)));
        };
        if let ReceiptOutcome::Advanced(to) = status::advance(stored.status, receipt.status) {
            self.backend
                .update_status(receipt.channel_uuid, stored.msg_id, to)
                .await?;
            log::info!("msg {}: {} -> {}", stored.msg_id, stored.status, to);
        }
        Ok(None)
    }

    /// Run one send attempt for `msg` on its channel and persist the outcome.
    pub async fn send(
        &self,
        ctx: &SendContext,
        channel_type: &str,
        msg: &OutgoingMessage,
    ) -> Result<StatusUpdate> {
        let handler = self.registry.get(channel_type)?;
        let channel = self.channel(&handler.channel_type(), msg.channel_uuid()).await?;
        let update = handler.send(ctx, &channel, msg).await?;
        self.backend.write_status_update(&update).await?;
        log::info!(
            "msg {} via {} {}: {}",
            msg.id(),
            handler.name(),
            channel.uuid,
            update.status()
        );
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::msg::{ChannelEventType, MsgId};
    use crate::status::MsgStatus;
    use crate::urn::Urn;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        dispatcher: Dispatcher,
        cs: Channel,
        twc: Channel,
    }

    fn fixture() -> Fixture {
        let cs = Channel::new(Uuid::new_v4(), ChannelType::from("CS"), "+12065550199")
            .with_config("username", "u")
            .with_config("password", "p");
        let twc = Channel::new(Uuid::new_v4(), ChannelType::from("TWC"), "");
        let backend = Arc::new(MemoryBackend::new([cs.clone(), twc.clone()]));
        let dispatcher = Dispatcher::new(
            Arc::new(HandlerRegistry::with_builtin_handlers()),
            backend.clone(),
            Duration::from_secs(5),
        );
        Fixture {
            backend,
            dispatcher,
            cs,
            twc,
        }
    }

    #[tokio::test]
    async fn chat_started_is_persisted() {
        let f = fixture();
        let req = InboundRequest::json(r#"{"type":"chat_started","chat":{"chat_id":"c1"}}"#);
        let outcome = f.dispatcher.receive("TWC", f.twc.uuid, "receive", &req).await.unwrap();
        assert!(matches!(outcome, ReceiveOutcome::Accepted(ref events) if events.len() == 1));
        let stored = f.backend.channel_events().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, ChannelEventType::NewConversation);
        assert_eq!(stored[0].urn.to_string(), "webchat:c1");
    }

    #[tokio::test]
    async fn unrecognized_payload_is_ignored() {
        let f = fixture();
        let req = InboundRequest::json(r#"{"type":"chat_closed"}"#);
        let outcome = f.dispatcher.receive("TWC", f.twc.uuid, "receive", &req).await.unwrap();
        assert!(matches!(outcome, ReceiveOutcome::Ignored(_)));
        assert!(f.backend.channel_events().await.is_empty());
    }

    #[tokio::test]
    async fn routing_failures_are_not_found() {
        let f = fixture();
        let req = InboundRequest::json("{}");

        let err = f.dispatcher.receive("XX", f.twc.uuid, "receive", &req).await.unwrap_err();
        assert!(matches!(err, Error::UnknownChannelType(_)));

        let err = f.dispatcher.receive("TWC", Uuid::new_v4(), "receive", &req).await.unwrap_err();
        assert!(matches!(err, Error::UnknownChannel { .. }));

        // channel exists but under another type
        let err = f.dispatcher.receive("TWC", f.cs.uuid, "receive", &req).await.unwrap_err();
        assert!(matches!(err, Error::UnknownChannel { .. }));

        let err = f.dispatcher.receive("TWC", f.twc.uuid, "status", &req).await.unwrap_err();
        assert!(matches!(err, Error::UnknownAction { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn invalid_sender_is_an_error() {
        let f = fixture();
        let req = InboundRequest::form("from=%24%24%24&body=hi");
        let err = f.dispatcher.receive("CS", f.cs.uuid, "receive", &req).await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
        assert!(f.backend.messages().await.is_empty());
    }

    #[tokio::test]
    async fn receipts_advance_stored_status() {
        let f = fixture();
        let mut update = StatusUpdate::begin(f.cs.uuid, MsgId(42));
        update.mark_wired(Some("cs-42".to_string())).unwrap();
        f.backend.write_status_update(&update).await.unwrap();

        let delivered = InboundRequest::form("message_id=cs-42&status=Delivered");
        let outcome = f.dispatcher.receive("CS", f.cs.uuid, "status", &delivered).await.unwrap();
        assert!(matches!(outcome, ReceiveOutcome::Accepted(_)));
        assert_eq!(f.backend.status_of(f.cs.uuid, MsgId(42)).await, Some(MsgStatus::Delivered));

        // a late "Sent" receipt must not move a delivered message back
        let sent = InboundRequest::form("message_id=cs-42&status=Sent");
        f.dispatcher.receive("CS", f.cs.uuid, "status", &sent).await.unwrap();
        assert_eq!(f.backend.status_of(f.cs.uuid, MsgId(42)).await, Some(MsgStatus::Delivered));
    }

    #[tokio::test]
    async fn receipt_for_unknown_message_is_ignored() {
        let f = fixture();
        let req = InboundRequest::form("message_id=nope&status=Delivered");
        let outcome = f.dispatcher.receive("CS", f.cs.uuid, "status", &req).await.unwrap();
        assert!(matches!(outcome, ReceiveOutcome::Ignored(ref r) if r.contains("nope")));
    }

    #[tokio::test]
    async fn send_with_missing_config_fails_before_persisting() {
        let ch = Channel::new(Uuid::new_v4(), ChannelType::from("CS"), "+12065550199");
        let backend = Arc::new(MemoryBackend::new([ch.clone()]));
        let dispatcher = Dispatcher::new(
            Arc::new(HandlerRegistry::with_builtin_handlers()),
            backend.clone(),
            Duration::from_secs(5),
        );
        let urn = Urn::from_parts("tel", "+12065550100").unwrap();
        let msg = OutgoingMessage::builder(MsgId(1), ch.uuid, urn).text("hi").build();
        let err = dispatcher
            .send(&dispatcher.send_context(), "CS", &msg)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingConfig { .. }));
        assert_eq!(backend.status_of(ch.uuid, MsgId(1)).await, None);
    }

    #[tokio::test]
    async fn send_persists_the_attempt() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/send");
            then.status(200);
        });
        let ch = Channel::new(Uuid::new_v4(), ChannelType::from("TWC"), "")
            .with_config("send_url", server.url("/send"));
        let backend = Arc::new(MemoryBackend::new([ch.clone()]));
        let dispatcher = Dispatcher::new(
            Arc::new(HandlerRegistry::with_builtin_handlers()),
            backend.clone(),
            Duration::from_secs(5),
        );
        let urn = Urn::from_parts("webchat", "c1").unwrap();
        let msg = OutgoingMessage::builder(MsgId(7), ch.uuid, urn).text("hello").build();

        let update = dispatcher.send(&dispatcher.send_context(), "TWC", &msg).await.unwrap();
        mock.assert_calls(1);
        assert_eq!(update.status(), MsgStatus::Wired);
        assert_eq!(backend.status_of(ch.uuid, MsgId(7)).await, Some(MsgStatus::Wired));
    }
}
