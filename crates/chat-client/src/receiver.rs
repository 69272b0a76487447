//! Message receiver with polling.

use crate::client::ChatClient;
use crate::error::ChatError;
use crate::types::*;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::Stream;
use tracing::{debug, error};

/// Messages fetched per poll of one channel.
const PAGE_SIZE: u8 = 50;

/// Per-channel polling position.
#[derive(Debug, Clone, Default)]
pub struct ChannelCursor {
    /// Newest message id seen; `None` until the channel is primed.
    last_seen: Option<Snowflake>,
    guild_id: Option<Snowflake>,
}

/// Message receiver that polls a fixed set of channels for new messages.
pub struct MessageReceiver {
    client: ChatClient,
    channels: Vec<Snowflake>,
    poll_interval: Duration,
}

impl MessageReceiver {
    /// Create a new message receiver.
    pub fn new(client: ChatClient, channels: Vec<Snowflake>, poll_interval: Duration) -> Self {
        Self {
            client,
            channels,
            poll_interval,
        }
    }

    /// Fetch messages newer than the cursor, oldest first.
    ///
    /// The first call for a channel only records the newest message id so
    /// that history is not replayed as commands.
    pub async fn poll_channel(
        &self,
        channel_id: Snowflake,
        cursor: &mut ChannelCursor,
    ) -> Result<Vec<Message>, ChatError> {
        let Some(after) = cursor.last_seen else {
            let channel = self.client.channel(channel_id).await?;
            let newest = self.client.channel_messages(channel_id, None, 1).await?;
            cursor.guild_id = channel.guild_id;
            cursor.last_seen = Some(newest.first().map(|m| m.id).unwrap_or(0));
            debug!("Primed channel {} at {:?}", channel_id, cursor.last_seen);
            return Ok(Vec::new());
        };

        let mut messages = self
            .client
            .channel_messages(channel_id, Some(after), PAGE_SIZE)
            .await?;
        messages.sort_by_key(|m| m.id);

        if let Some(newest) = messages.last() {
            cursor.last_seen = Some(newest.id);
        }

        Ok(messages
            .into_iter()
            .filter(|m| !m.author.bot)
            .map(|mut m| {
                if m.guild_id.is_none() {
                    m.guild_id = cursor.guild_id;
                }
                m
            })
            .collect())
    }

    /// Start receiving messages as an async stream.
    pub fn stream(self) -> impl Stream<Item = Message> {
        async_stream::stream! {
            let mut cursors: HashMap<Snowflake, ChannelCursor> = HashMap::new();
            loop {
                for &channel_id in &self.channels {
                    let cursor = cursors.entry(channel_id).or_default();
                    match self.poll_channel(channel_id, cursor).await {
                        Ok(messages) => {
                            for message in messages {
                                debug!("Received: {} from {}",
                                    message.content.chars().take(50).collect::<String>(),
                                    message.author.id
                                );
                                yield message;
                            }
                        }
                        Err(e) => {
                            error!("Receive error on {}: {}", channel_id, e);
                            // Back off on error
                            sleep(Duration::from_secs(5)).await;
                        }
                    }
                }

                sleep(self.poll_interval).await;
            }
        }
    }
}
