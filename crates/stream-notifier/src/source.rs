//! Liveness sources.

use crate::error::SourceError;
use crate::types::{LiveStream, TwitchUser};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Largest number of ids or results per Helix request.
pub const HELIX_MAX_BATCH: usize = 100;

/// Something that can list currently live streams.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn streams_by_game(&self, game: &str) -> Result<Vec<LiveStream>, SourceError>;

    async fn streams_by_keyword(&self, keyword: &str) -> Result<Vec<LiveStream>, SourceError>;

    /// At most [`max_batch`](Self::max_batch) ids per call.
    async fn streams_by_users(&self, user_ids: &[String]) -> Result<Vec<LiveStream>, SourceError>;

    async fn lookup_user(&self, login: &str) -> Result<Option<TwitchUser>, SourceError>;

    /// Follower total, when the source can tell.
    async fn follower_count(&self, _user_id: &str) -> Result<Option<u64>, SourceError> {
        Ok(None)
    }

    fn max_batch(&self) -> usize {
        HELIX_MAX_BATCH
    }
}

#[derive(Debug, Deserialize)]
struct HelixPage<T> {
    data: Vec<T>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HelixGame {
    id: String,
}

#[derive(Debug, Deserialize)]
struct HelixChannel {
    id: String,
    #[serde(default)]
    is_live: bool,
}

/// Twitch Helix API client.
#[derive(Clone)]
pub struct TwitchClient {
    client: Client,
    base_url: String,
    client_id: String,
    token: SecretString,
}

impl TwitchClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            token,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<HelixPage<T>, SourceError> {
        let response = self
            .client
            .get(format!("{}/helix/{}", self.base_url, path))
            .header("Client-Id", &self.client_id)
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, SourceError> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await.map_err(SourceError::from_reqwest)?;
            return serde_json::from_str(&body).map_err(SourceError::from);
        }

        match status.as_u16() {
            code @ (421 | 502 | 503 | 504) => {
                warn!("Twitch API unavailable: {}", code);
                Err(SourceError::Unavailable(code))
            }
            code => Err(SourceError::Api {
                status: code,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn streams(&self, query: &[(&str, &str)]) -> Result<Vec<LiveStream>, SourceError> {
        let page: HelixPage<LiveStream> = self.get("streams", query).await?;
        Ok(page
            .data
            .into_iter()
            .map(|mut stream| {
                if stream.game_name.as_deref() == Some("") {
                    stream.game_name = None;
                }
                stream
            })
            .collect())
    }
}

#[async_trait]
impl LiveSource for TwitchClient {
    #[instrument(skip(self))]
    async fn streams_by_game(&self, game: &str) -> Result<Vec<LiveStream>, SourceError> {
        let games: HelixPage<HelixGame> = self.get("games", &[("name", game)]).await?;
        let Some(found) = games.data.into_iter().next() else {
            debug!("No Twitch game named {}", game);
            return Ok(Vec::new());
        };

        self.streams(&[("game_id", found.id.as_str()), ("first", "100")])
            .await
    }

    #[instrument(skip(self))]
    async fn streams_by_keyword(&self, keyword: &str) -> Result<Vec<LiveStream>, SourceError> {
        let channels: HelixPage<HelixChannel> = self
            .get(
                "search/channels",
                &[("query", keyword), ("live_only", "true"), ("first", "100")],
            )
            .await?;

        let ids: Vec<String> = channels
            .data
            .into_iter()
            .filter(|c| c.is_live)
            .map(|c| c.id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.streams_by_users(&ids).await
    }

    #[instrument(skip(self, user_ids), fields(count = user_ids.len()))]
    async fn streams_by_users(&self, user_ids: &[String]) -> Result<Vec<LiveStream>, SourceError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query: Vec<(&str, &str)> = user_ids
            .iter()
            .take(HELIX_MAX_BATCH)
            .map(|id| ("user_id", id.as_str()))
            .collect();
        query.push(("first", "100"));

        self.streams(&query).await
    }

    #[instrument(skip(self))]
    async fn lookup_user(&self, login: &str) -> Result<Option<TwitchUser>, SourceError> {
        let users: HelixPage<TwitchUser> = self.get("users", &[("login", login)]).await?;
        Ok(users.data.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn follower_count(&self, user_id: &str) -> Result<Option<u64>, SourceError> {
        let followers: HelixPage<serde_json::Value> = self
            .get(
                "channels/followers",
                &[("broadcaster_id", user_id), ("first", "1")],
            )
            .await?;
        Ok(followers.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_client(base_url: &str) -> TwitchClient {
        TwitchClient::new(
            base_url,
            "client-id",
            SecretString::new("app-token".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn stream_json(id: &str, user_id: &str, title: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "user_id": user_id,
            "user_login": "magnus",
            "user_name": "Magnus",
            "game_id": "743",
            "game_name": "Chess",
            "type": "live",
            "title": title,
            "viewer_count": 1234,
            "started_at": "2024-05-01T18:00:00Z",
            "thumbnail_url": "https://static-cdn.jtvnw.net/previews/magnus-{width}x{height}.jpg"
        })
    }

    #[tokio::test]
    async fn test_streams_by_game_resolves_game_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/helix/games"))
            .and(query_param("name", "Chess"))
            .and(header("Client-Id", "client-id"))
            .and(header("Authorization", "Bearer app-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "id": "743", "name": "Chess" }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/helix/streams"))
            .and(query_param("game_id", "743"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [stream_json("s1", "42", "Blitz")],
                "pagination": {}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let streams = client.streams_by_game("Chess").await.unwrap();

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].id, "s1");
        assert_eq!(streams[0].game_name.as_deref(), Some("Chess"));
        assert_eq!(streams[0].viewer_count, 1234);
    }

    #[tokio::test]
    async fn test_unknown_game_yields_no_streams() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/helix/games"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        assert!(client.streams_by_game("Nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/helix/streams"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let result = client.streams_by_users(&["42".to_string()]).await;

        assert!(matches!(result, Err(SourceError::Unavailable(503))));
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/helix/users"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let result = client.lookup_user("magnus").await;

        assert!(matches!(result, Err(SourceError::Api { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connectivity() {
        let client = create_test_client("http://127.0.0.1:1");
        let result = client.streams_by_game("Chess").await;

        assert!(matches!(result, Err(SourceError::Connectivity(_))));
    }

    #[tokio::test]
    async fn test_keyword_search_fetches_live_channels() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/helix/search/channels"))
            .and(query_param("query", "speedrun"))
            .and(query_param("live_only", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "id": "42", "broadcaster_login": "magnus", "is_live": true },
                    { "id": "43", "broadcaster_login": "hikaru", "is_live": false }
                ]
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/helix/streams"))
            .and(query_param("user_id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [stream_json("s7", "42", "Speedrun any%")]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let streams = client.streams_by_keyword("speedrun").await.unwrap();

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].title, "Speedrun any%");
    }

    #[tokio::test]
    async fn test_lookup_user_and_followers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/helix/users"))
            .and(query_param("login", "magnus"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "id": "42", "login": "magnus", "display_name": "Magnus" }]
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/helix/channels/followers"))
            .and(query_param("broadcaster_id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [], "total": 123456
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let user = client.lookup_user("magnus").await.unwrap().unwrap();
        assert_eq!(user.id, "42");
        assert_eq!(client.follower_count("42").await.unwrap(), Some(123456));
    }
}
