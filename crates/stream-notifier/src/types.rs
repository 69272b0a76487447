//! Follow, notification and stream types.

use chat_client::Snowflake;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tables holding `(destination, text)` follow entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryTable {
    Filters,
    Games,
    Keywords,
}

impl EntryTable {
    pub fn table(self) -> &'static str {
        match self {
            EntryTable::Filters => "filters",
            EntryTable::Games => "games",
            EntryTable::Keywords => "keywords",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            EntryTable::Filters => "filter",
            EntryTable::Games => "game",
            EntryTable::Keywords => "keyword",
        }
    }
}

/// A destination following one Twitch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFollow {
    pub destination: Snowflake,
    pub user_name: String,
    pub user_id: String,
}

/// A destination following a game, a keyword, or holding a title filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowEntry {
    pub destination: Snowflake,
    pub value: String,
}

impl FollowEntry {
    pub fn new(destination: Snowflake, value: impl Into<String>) -> Self {
        Self {
            destination,
            value: value.into(),
        }
    }
}

/// Last announced state of one stream in one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub stream_id: String,
    pub destination: Snowflake,
    pub message_id: Snowflake,
    pub live: bool,
}

/// How a live stream was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamMatch {
    Game(String),
    Keyword(String),
    /// A directly followed channel.
    Channel,
}

impl fmt::Display for StreamMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMatch::Game(game) => write!(f, "game {}", game),
            StreamMatch::Keyword(keyword) => write!(f, "keyword {}", keyword),
            StreamMatch::Channel => write!(f, "channel"),
        }
    }
}

/// An active broadcast as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStream {
    /// Unique per broadcast session.
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub title: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub viewer_count: u64,
    /// Filled in separately; not part of stream listings.
    #[serde(default)]
    pub follower_count: Option<u64>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl LiveStream {
    pub fn channel_url(&self) -> String {
        format!("https://www.twitch.tv/{}", self.user_login)
    }
}

/// A Twitch account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TwitchUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}
