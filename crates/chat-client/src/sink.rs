//! Message sink abstraction.

use crate::client::ChatClient;
use crate::error::ChatError;
use crate::types::*;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

/// Anything that can deliver, edit, react to, and fetch messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send a message, returning its id.
    async fn send(
        &self,
        channel_id: Snowflake,
        message: &OutgoingMessage,
    ) -> Result<Snowflake, ChatError>;

    /// Replace a previously sent message.
    async fn edit(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError>;

    /// React to a message.
    async fn react(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: &str,
    ) -> Result<(), ChatError>;

    /// Fetch a message. Fails with `NotFound` once deleted.
    async fn fetch(&self, channel_id: Snowflake, message_id: Snowflake)
        -> Result<Message, ChatError>;
}

#[async_trait]
impl MessageSink for ChatClient {
    async fn send(
        &self,
        channel_id: Snowflake,
        message: &OutgoingMessage,
    ) -> Result<Snowflake, ChatError> {
        self.send_message(channel_id, message).await.map(|m| m.id)
    }

    async fn edit(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.edit_message(channel_id, message_id, message)
            .await
            .map(|_| ())
    }

    async fn react(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: &str,
    ) -> Result<(), ChatError> {
        self.add_reaction(channel_id, message_id, emoji).await
    }

    async fn fetch(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<Message, ChatError> {
        self.get_message(channel_id, message_id).await
    }
}

/// A delivery recorded by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub message: OutgoingMessage,
}

#[derive(Default)]
struct MemorySinkInner {
    next_id: Snowflake,
    messages: BTreeMap<(Snowflake, Snowflake), OutgoingMessage>,
    sent: Vec<Delivery>,
    edits: Vec<Delivery>,
    reactions: Vec<(Snowflake, Snowflake, String)>,
    embeds_forbidden: HashSet<Snowflake>,
}

/// In-memory sink that keeps every delivery, for offline runs and tests.
#[derive(Default)]
pub struct MemorySink {
    inner: Mutex<MemorySinkInner>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse embed messages in a channel while still accepting plain text.
    pub async fn forbid_embeds(&self, channel_id: Snowflake) {
        self.inner.lock().await.embeds_forbidden.insert(channel_id);
    }

    /// Drop a stored message, as if a moderator had deleted it.
    pub async fn delete(&self, channel_id: Snowflake, message_id: Snowflake) {
        self.inner
            .lock()
            .await
            .messages
            .remove(&(channel_id, message_id));
    }

    pub async fn sent(&self) -> Vec<Delivery> {
        self.inner.lock().await.sent.clone()
    }

    pub async fn edits(&self) -> Vec<Delivery> {
        self.inner.lock().await.edits.clone()
    }

    pub async fn reactions(&self) -> Vec<(Snowflake, Snowflake, String)> {
        self.inner.lock().await.reactions.clone()
    }

    /// Current content of a stored message.
    pub async fn message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Option<OutgoingMessage> {
        self.inner
            .lock()
            .await
            .messages
            .get(&(channel_id, message_id))
            .cloned()
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(
        &self,
        channel_id: Snowflake,
        message: &OutgoingMessage,
    ) -> Result<Snowflake, ChatError> {
        let mut inner = self.inner.lock().await;
        if message.has_embeds() && inner.embeds_forbidden.contains(&channel_id) {
            return Err(ChatError::Forbidden("Missing Permissions".into()));
        }

        inner.next_id += 1;
        let message_id = inner.next_id;
        inner
            .messages
            .insert((channel_id, message_id), message.clone());
        inner.sent.push(Delivery {
            channel_id,
            message_id,
            message: message.clone(),
        });
        Ok(message_id)
    }

    async fn edit(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        let mut inner = self.inner.lock().await;
        match inner.messages.get_mut(&(channel_id, message_id)) {
            Some(stored) => *stored = message.clone(),
            None => return Err(ChatError::NotFound("Unknown Message".into())),
        }
        inner.edits.push(Delivery {
            channel_id,
            message_id,
            message: message.clone(),
        });
        Ok(())
    }

    async fn react(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: &str,
    ) -> Result<(), ChatError> {
        self.inner
            .lock()
            .await
            .reactions
            .push((channel_id, message_id, emoji.to_string()));
        Ok(())
    }

    async fn fetch(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<Message, ChatError> {
        let inner = self.inner.lock().await;
        let stored = inner
            .messages
            .get(&(channel_id, message_id))
            .ok_or_else(|| ChatError::NotFound("Unknown Message".into()))?;

        Ok(Message {
            id: message_id,
            channel_id,
            guild_id: None,
            author: User {
                id: 0,
                username: "memory-sink".into(),
                global_name: None,
                bot: true,
            },
            content: stored.content.clone().unwrap_or_default(),
            embeds: stored.embeds.clone(),
            timestamp: None,
        })
    }
}
