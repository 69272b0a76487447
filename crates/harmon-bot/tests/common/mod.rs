//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use command_router::{Caller, Dispatcher, Module, Reply};
use harmon_bot::api::ResourceClient;
use harmon_bot::app::{self, AppContext};
use harmon_bot::config::{BotConfig, ResourcesConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_notifier::{LiveSource, LiveStream, MemoryStore, SourceError, TwitchUser};

pub const OWNER: u64 = 1;
pub const PERMITTED: u64 = 7;
pub const BLOCKED: u64 = 9;
pub const MEMBER: u64 = 5;
pub const CHANNEL: u64 = 100;
pub const GUILD: u64 = 200;

/// Twitch stand-in with a fixed set of accounts and whatever is marked live.
#[derive(Default)]
pub struct FakeTwitch {
    users: Vec<TwitchUser>,
    live: Mutex<Vec<LiveStream>>,
}

impl FakeTwitch {
    pub fn with_users(logins: &[(&str, &str)]) -> Self {
        Self {
            users: logins
                .iter()
                .map(|(id, login)| TwitchUser {
                    id: id.to_string(),
                    login: login.to_string(),
                    display_name: login.to_string(),
                    profile_image_url: None,
                })
                .collect(),
            live: Mutex::new(Vec::new()),
        }
    }

    pub fn go_live(&self, stream: LiveStream) {
        self.live.lock().unwrap().push(stream);
    }

    pub fn end_all(&self) {
        self.live.lock().unwrap().clear();
    }

    fn matching(&self, keep: impl Fn(&LiveStream) -> bool) -> Vec<LiveStream> {
        self.live
            .lock()
            .unwrap()
            .iter()
            .filter(|s| keep(s))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LiveSource for FakeTwitch {
    async fn streams_by_game(&self, game: &str) -> Result<Vec<LiveStream>, SourceError> {
        Ok(self.matching(|s| s.game_name.as_deref() == Some(game)))
    }

    async fn streams_by_keyword(&self, keyword: &str) -> Result<Vec<LiveStream>, SourceError> {
        let keyword = keyword.to_lowercase();
        Ok(self.matching(|s| s.title.to_lowercase().contains(&keyword)))
    }

    async fn streams_by_users(&self, user_ids: &[String]) -> Result<Vec<LiveStream>, SourceError> {
        Ok(self.matching(|s| user_ids.contains(&s.user_id)))
    }

    async fn lookup_user(&self, login: &str) -> Result<Option<TwitchUser>, SourceError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.login.eq_ignore_ascii_case(login))
            .cloned())
    }
}

pub fn stream(id: &str, user_id: &str, login: &str, title: &str, game: &str) -> LiveStream {
    LiveStream {
        id: id.into(),
        user_id: user_id.into(),
        user_login: login.into(),
        user_name: login.into(),
        title: title.into(),
        game_name: Some(game.into()),
        viewer_count: 42,
        follower_count: None,
        started_at: Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap(),
        thumbnail_url: None,
    }
}

pub fn caller(user_id: u64) -> Caller {
    Caller {
        user_id,
        display_name: format!("user{}", user_id),
        channel_id: CHANNEL,
        message_id: 1,
        guild_id: Some(GUILD),
        is_guild_owner: false,
    }
}

pub fn guild_owner(user_id: u64) -> Caller {
    Caller {
        is_guild_owner: true,
        ..caller(user_id)
    }
}

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub modules: Vec<Box<dyn Module>>,
    pub store: Arc<MemoryStore>,
    pub twitch: Arc<FakeTwitch>,
}

impl Harness {
    /// Every module loaded, resource APIs pointed at `api_url`.
    pub async fn new(api_url: &str) -> Self {
        let store = Arc::new(MemoryStore::new());
        let twitch = Arc::new(FakeTwitch::with_users(&[
            ("1001", "speedrunner"),
            ("1002", "chessmaster"),
        ]));
        let api = ResourceClient::new(&ResourcesConfig {
            numbers_api_url: api_url.to_string(),
            colors_api_url: api_url.to_string(),
            horoscope_api_url: api_url.to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap();

        let ctx = AppContext {
            store: store.clone(),
            twitch: twitch.clone(),
            api,
            jokes: Arc::new(vec!["I told a chemistry joke once. No reaction.".to_string()]),
        };
        let config = BotConfig {
            owner_ids: vec![OWNER],
            blocked_ids: vec![BLOCKED],
            permitted_ids: vec![PERMITTED],
            ..BotConfig::default()
        };

        let modules = app::modules(&ctx);
        let dispatcher = app::build_dispatcher(&config, &modules).await.unwrap();
        Self {
            dispatcher,
            modules,
            store,
            twitch,
        }
    }

    /// Reply to `text`, panicking when nothing comes back.
    pub async fn reply(&self, text: &str, caller: Caller) -> Reply {
        self.dispatcher
            .process(text, caller)
            .await
            .and_then(|outcome| outcome.reply)
            .unwrap_or_else(|| panic!("no reply to {:?}", text))
    }

    pub async fn text(&self, text: &str, caller: Caller) -> String {
        match self.reply(text, caller).await {
            Reply::Text(reply) => reply,
            other => panic!("expected a text reply to {:?}, got {:?}", text, other),
        }
    }

    pub fn module(&self, name: &str) -> &dyn Module {
        self.modules
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.as_ref())
            .unwrap_or_else(|| panic!("no module {}", name))
    }

    pub async fn outline(&self) -> Vec<String> {
        self.dispatcher.registry().read().await.outline()
    }
}
