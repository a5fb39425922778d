//! Storage the core hands its results to.
//!
//! The real backend (database, queues) lives outside this crate; `MemoryBackend`
//! is an in-process stand-in used by the gateway binary and tests.

use crate::error::Result;
use crate::msg::{Channel, ChannelEvent, ChannelType, IncomingMessage, MsgId};
use crate::status::{MsgStatus, StatusUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A sent message as known to the backend, found through its external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredStatus {
    pub msg_id: MsgId,
    pub status: MsgStatus,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Look up an active channel by type and uuid.
    async fn get_channel(&self, channel_type: &ChannelType, uuid: Uuid) -> Result<Option<Channel>>;

    async fn write_message(&self, msg: &IncomingMessage) -> Result<()>;

    async fn write_channel_event(&self, event: &ChannelEvent) -> Result<()>;

    /// Persist the outcome of a send attempt.
    async fn write_status_update(&self, update: &StatusUpdate) -> Result<()>;

    async fn lookup_by_external_id(
        &self,
        channel_uuid: Uuid,
        external_id: &str,
    ) -> Result<Option<StoredStatus>>;

    /// Overwrite the stored status of a message after a receipt was validated.
    async fn update_status(&self, channel_uuid: Uuid, msg_id: MsgId, status: MsgStatus) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<IncomingMessage>,
    events: Vec<ChannelEvent>,
    statuses: HashMap<(Uuid, MsgId), StatusUpdate>,
    external_ids: HashMap<(Uuid, String), MsgId>,
}

/// In-memory backend seeded with a fixed set of channels.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    channels: HashMap<Uuid, Channel>,
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.uuid, c)).collect(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub async fn messages(&self) -> Vec<IncomingMessage> {
        self.state.read().await.messages.clone()
    }

    pub async fn channel_events(&self) -> Vec<ChannelEvent> {
        self.state.read().await.events.clone()
    }

    pub async fn status_of(&self, channel_uuid: Uuid, msg_id: MsgId) -> Option<MsgStatus> {
        self.state
            .read()
            .await
            .statuses
            .get(&(channel_uuid, msg_id))
            .map(|s| s.status())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_channel(&self, channel_type: &ChannelType, uuid: Uuid) -> Result<Option<Channel>> {
        Ok(self
            .channels
            .get(&uuid)
            .filter(|c| &c.channel_type == channel_type)
            .cloned())
    }

    async fn write_message(&self, msg: &IncomingMessage) -> Result<()> {
        self.state.write().await.messages.push(msg.clone());
        Ok(())
    }

    async fn write_channel_event(&self, event: &ChannelEvent) -> Result<()> {
        self.state.write().await.events.push(event.clone());
        Ok(())
    }

    async fn write_status_update(&self, update: &StatusUpdate) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(id) = update.external_id() {
            state
                .external_ids
                .insert((update.channel_uuid(), id.to_string()), update.msg_id());
        }
        state
            .statuses
            .insert((update.channel_uuid(), update.msg_id()), update.clone());
        Ok(())
    }

    async fn lookup_by_external_id(
        &self,
        channel_uuid: Uuid,
        external_id: &str,
    ) -> Result<Option<StoredStatus>> {
        let state = self.state.read().await;
        let found = state
            .external_ids
            .get(&(channel_uuid, external_id.to_string()))
            .and_then(|msg_id| state.statuses.get(&(channel_uuid, *msg_id)))
            .map(|s| StoredStatus {
                msg_id: s.msg_id(),
                status: s.status(),
            });
        Ok(found)
    }

    async fn update_status(&self, channel_uuid: Uuid, msg_id: MsgId, status: MsgStatus) -> Result<()> {
        let mut state = self.state.write().await;
        match state.statuses.get_mut(&(channel_uuid, msg_id)) {
            Some(stored) => {
                stored.apply_receipt(status);
                Ok(())
            }
            None => Err(crate::error::Error::Backend(format!(
                "no status stored for msg {} on channel {}",
                msg_id, channel_uuid
            ))),
        }
    }
}
