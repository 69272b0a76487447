//! Chat platform REST client.
//!
//! Provides the HTTP client, the [`MessageSink`] abstraction used by the
//! dispatcher and the stream notifier, and a polling [`MessageReceiver`].

mod client;
mod error;
mod receiver;
mod sink;
mod types;

pub use client::ChatClient;
pub use error::ChatError;
pub use receiver::{ChannelCursor, MessageReceiver};
pub use sink::{Delivery, MemorySink, MessageSink};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_client(mock_server: &MockServer) -> ChatClient {
        ChatClient::new(mock_server.uri(), "test-token", Duration::from_secs(5)).unwrap()
    }

    fn message_json(id: &str, content: &str, bot: bool) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "channel_id": "100",
            "author": { "id": "42", "username": "alice", "bot": bot },
            "content": content,
            "embeds": [],
            "timestamp": "2024-01-01T00:00:00+00:00"
        })
    }

    #[tokio::test]
    async fn test_health_check_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .and(header("Authorization", "Bot test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1", "username": "harmonbot", "bot": true
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_send_embed_returns_message_id() {
        let mock_server = MockServer::start().await;

        let embed = Embed::new().title("Hello").description("world");
        let expected_body = serde_json::json!({
            "embeds": [{ "title": "Hello", "description": "world" }]
        });

        Mock::given(method("POST"))
            .and(path("/channels/100/messages"))
            .and(body_json(&expected_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_json("555", "", true)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let id = client
            .send(100, &OutgoingMessage::embed(embed))
            .await
            .unwrap();
        assert_eq!(id, 555);
    }

    #[tokio::test]
    async fn test_send_forbidden() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/channels/100/messages"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Missing Permissions"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.send(100, &OutgoingMessage::text("hi")).await;

        assert!(matches!(result, Err(ChatError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_fetch_deleted_message_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/channels/100/messages/9"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Unknown Message"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.fetch(100, 9).await;

        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_edit_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/channels/100/messages/555"))
            .and(body_json(serde_json::json!({ "content": "edited" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_json("555", "edited", true)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        tokio_test::assert_ok!(client.edit(100, 555, &OutgoingMessage::text("edited")).await);
    }

    #[tokio::test]
    async fn test_add_reaction_encodes_emoji() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/channels/100/messages/555/reactions/%E2%9D%94/@me"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        client.react(100, 555, "❔").await.unwrap();
    }

    #[tokio::test]
    async fn test_receiver_primes_then_yields_new_messages() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/channels/100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "100", "guild_id": "7"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/channels/100/messages"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                message_json("10", "old command", false)
            ])))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/channels/100/messages"))
            .and(query_param("after", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                message_json("12", "!help", false),
                message_json("13", "bot echo", true),
                message_json("11", "!random", false)
            ])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let receiver = MessageReceiver::new(client, vec![100], Duration::from_millis(10));
        let mut cursor = ChannelCursor::default();

        let primed = receiver.poll_channel(100, &mut cursor).await.unwrap();
        assert!(primed.is_empty());

        let messages = receiver.poll_channel(100, &mut cursor).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["!random", "!help"]);
        assert!(messages.iter().all(|m| m.guild_id == Some(7)));
    }

    #[test]
    fn test_message_deserializes_string_snowflakes() {
        let message: Message = serde_json::from_value(message_json("123", "hi", false)).unwrap();
        assert_eq!(message.id, 123);
        assert_eq!(message.channel_id, 100);
        assert_eq!(message.author.display_name(), "alice");
        assert!(message.guild_id.is_none());
    }

    #[tokio::test]
    async fn test_memory_sink_forbids_embeds_only() {
        let sink = MemorySink::new();
        sink.forbid_embeds(5).await;

        let embed = OutgoingMessage::embed(Embed::new().title("live"));
        assert!(sink.send(5, &embed).await.unwrap_err().is_forbidden());
        assert!(sink.send(5, &OutgoingMessage::text("plain")).await.is_ok());
        assert!(sink.send(6, &embed).await.is_ok());
        assert_eq!(sink.sent().await.len(), 2);
    }
}
