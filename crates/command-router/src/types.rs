//! Types shared between the registry, the dispatcher and command handlers.

use crate::error::HandlerError;
use crate::executor::ComputePool;
use crate::params::Args;
use crate::registry::CommandRegistry;
use async_trait::async_trait;
use chat_client::{Embed, Snowflake};

/// Who sent a command, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Snowflake,
    pub display_name: String,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    /// `None` for direct messages.
    pub guild_id: Option<Snowflake>,
    pub is_guild_owner: bool,
}

impl Caller {
    /// Scope used for prefix overrides: the guild, or the channel in DMs.
    pub fn scope(&self) -> Snowflake {
        self.guild_id.unwrap_or(self.channel_id)
    }
}

/// What a handler wants sent back to the originating channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Embed(Embed),
    /// React to the invoking message instead of replying.
    Reaction(String),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Everything a handler can see besides its parsed arguments.
#[derive(Clone)]
pub struct CommandContext {
    pub caller: Caller,
    /// The prefix the message was invoked with.
    pub prefix: String,
    /// Labels as typed, e.g. `["random", "die"]`.
    pub invoked_path: Vec<String>,
    pub registry: CommandRegistry,
    pub compute: ComputePool,
}

impl CommandContext {
    pub fn invoked_with(&self) -> String {
        self.invoked_path.join(" ")
    }
}

/// A command's invoke behavior.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn invoke(&self, ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError>;
}
