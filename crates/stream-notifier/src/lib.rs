//! Twitch go-live notifications.
//!
//! Destinations follow Twitch channels, games or keywords and may restrict
//! announcements with title filters. A [`StreamPoller`] periodically asks a
//! [`LiveSource`] what is live, announces new streams through a
//! [`chat_client::MessageSink`] and edits announcements once the stream ends.
//! Follow and notification state lives in a [`FollowStore`].

mod config;
mod error;
mod poller;
mod render;
mod source;
mod store;
mod types;

pub use config::NotifierConfig;
pub use error::{PollError, SourceError, StoreError};
pub use poller::{spawn_poller, CycleReport, StreamPoller};
pub use render::{is_live, live_embed, mark_ended, mark_live, thousands, truncate_title, unfollow_notice};
pub use source::{LiveSource, TwitchClient, HELIX_MAX_BATCH};
pub use store::{FollowStore, MemoryStore, SqliteStore};
pub use types::*;
