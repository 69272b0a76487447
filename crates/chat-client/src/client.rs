//! Chat REST HTTP client.

use crate::error::ChatError;
use crate::types::*;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use urlencoding::encode;

/// Chat platform REST API client.
///
/// The bot token is stored using `SecretString` to prevent accidental
/// exposure in logs or debug output.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl ChatClient {
    /// Create a new chat client.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: SecretString::new(token.into()),
        })
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    /// Check if the API is reachable with the configured token.
    pub async fn health_check(&self) -> bool {
        self.current_user().await.is_ok()
    }

    /// Get the bot's own user.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<User, ChatError> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.base_url))
            .header("Authorization", self.authorization())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a channel.
    #[instrument(skip(self))]
    pub async fn channel(&self, channel_id: Snowflake) -> Result<Channel, ChatError> {
        let response = self
            .client
            .get(format!("{}/channels/{}", self.base_url, channel_id))
            .header("Authorization", self.authorization())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a guild.
    #[instrument(skip(self))]
    pub async fn guild(&self, guild_id: Snowflake) -> Result<Guild, ChatError> {
        let response = self
            .client
            .get(format!("{}/guilds/{}", self.base_url, guild_id))
            .header("Authorization", self.authorization())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List messages in a channel, newest first.
    #[instrument(skip(self))]
    pub async fn channel_messages(
        &self,
        channel_id: Snowflake,
        after: Option<Snowflake>,
        limit: u8,
    ) -> Result<Vec<Message>, ChatError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/channels/{}/messages", self.base_url, channel_id))
            .header("Authorization", self.authorization())
            .query(&query)
            .send()
            .await?;

        let messages: Vec<Message> = self.handle_response(response).await?;
        debug!("Received {} messages from {}", messages.len(), channel_id);
        Ok(messages)
    }

    /// Get a single message.
    #[instrument(skip(self))]
    pub async fn get_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<Message, ChatError> {
        let response = self
            .client
            .get(format!(
                "{}/channels/{}/messages/{}",
                self.base_url, channel_id, message_id
            ))
            .header("Authorization", self.authorization())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Send a message to a channel.
    #[instrument(skip(self, message))]
    pub async fn send_message(
        &self,
        channel_id: Snowflake,
        message: &OutgoingMessage,
    ) -> Result<Message, ChatError> {
        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.base_url, channel_id))
            .header("Authorization", self.authorization())
            .json(message)
            .send()
            .await?;

        let sent: Message = self.handle_response(response).await?;
        debug!("Sent message {} to {}", sent.id, channel_id);
        Ok(sent)
    }

    /// Replace the content of a message the bot sent.
    #[instrument(skip(self, message))]
    pub async fn edit_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        message: &OutgoingMessage,
    ) -> Result<Message, ChatError> {
        let response = self
            .client
            .patch(format!(
                "{}/channels/{}/messages/{}",
                self.base_url, channel_id, message_id
            ))
            .header("Authorization", self.authorization())
            .json(message)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Add a reaction to a message.
    #[instrument(skip(self))]
    pub async fn add_reaction(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let response = self
            .client
            .put(format!(
                "{}/channels/{}/messages/{}/reactions/{}/@me",
                self.base_url,
                channel_id,
                message_id,
                encode(emoji)
            ))
            .header("Authorization", self.authorization())
            .header("Content-Length", "0")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.extract_error(response).await);
        }

        Ok(())
    }

    /// Handle HTTP response, converting errors appropriately.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ChatError> {
        if response.status().is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(ChatError::from)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract error information from failed response.
    async fn extract_error(&self, response: reqwest::Response) -> ChatError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();

        match status {
            StatusCode::FORBIDDEN => ChatError::Forbidden(message),
            StatusCode::NOT_FOUND => ChatError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Rate limited by chat API");
                ChatError::RateLimited
            }
            _ => ChatError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}
