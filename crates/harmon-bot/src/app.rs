//! Wiring between the chat client, the command router and the command modules.

use crate::api::ResourceClient;
use crate::commands::{MetaModule, RandomModule, ResourcesModule, TwitchModule};
use crate::config::BotConfig;
use crate::error::AppResult;
use anyhow::Context;
use chat_client::{ChatClient, ChatError, Embed, Message, MessageSink, OutgoingMessage, Snowflake};
use command_router::{
    AccessPolicy, Caller, CommandRegistry, ComputePool, Dispatcher, LoggingHook, Module, Prefixes,
    Reply,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use stream_notifier::{FollowStore, LiveSource};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Shared services handed to command modules.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn FollowStore>,
    pub twitch: Arc<dyn LiveSource>,
    pub api: ResourceClient,
    pub jokes: Arc<Vec<String>>,
}

/// Command modules in load order. `random` looks for `color`, so
/// `resources` goes first.
pub fn modules(ctx: &AppContext) -> Vec<Box<dyn Module>> {
    vec![
        Box::new(MetaModule),
        Box::new(ResourcesModule::new(ctx.api.clone())),
        Box::new(RandomModule::new(ctx.api.clone(), ctx.jokes.clone())),
        Box::new(TwitchModule::new(ctx.store.clone(), ctx.twitch.clone())),
    ]
}

/// Load every module into a fresh registry and configure a dispatcher over it.
pub async fn build_dispatcher(config: &BotConfig, modules: &[Box<dyn Module>]) -> AppResult<Dispatcher> {
    let registry = CommandRegistry::new();
    for module in modules {
        registry.load_module(module.as_ref()).await?;
        debug!("Loaded module {}", module.name());
    }

    let mut prefixes = Prefixes::new(config.prefixes.clone());
    for (scope, overrides) in &config.prefix_overrides {
        let scope: Snowflake = scope
            .parse()
            .with_context(|| format!("Invalid prefix override scope: {}", scope))?;
        prefixes = prefixes.with_override(scope, overrides.clone());
    }

    let policy = AccessPolicy {
        owners: config.owner_ids.iter().copied().collect(),
        blocked: config.blocked_ids.iter().copied().collect(),
        permitted: config.permitted_ids.iter().copied().collect(),
    };

    Ok(Dispatcher::new(registry)
        .with_prefixes(prefixes)
        .with_policy(policy)
        .with_compute(ComputePool::new(config.compute_workers, config.compute_timeout))
        .with_handler_timeout(config.handler_timeout)
        .with_hook(Arc::new(LoggingHook)))
}

/// Jokes are the first column of each CSV row. A missing file means no jokes.
pub fn load_jokes(path: Option<&Path>) -> AppResult<Vec<String>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Jokes file {} not found", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let jokes = parse_first_column(&text);
    info!("Loaded {} jokes", jokes.len());
    Ok(jokes)
}

/// First field of every non-empty record, honoring quoted fields that
/// contain commas, doubled quotes or line breaks.
fn parse_first_column(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut chars = text.chars().peekable();

    while chars.peek().is_some() {
        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    '"' => break,
                    c => field.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' || c == '\n' || c == '\r' {
                    break;
                }
                field.push(c);
                chars.next();
            }
        }

        // Skip the remaining fields of the record.
        for c in chars.by_ref() {
            if c == '\n' {
                break;
            }
        }

        if !field.is_empty() {
            records.push(field);
        }
    }
    records
}

/// Guild owners, looked up once per guild.
pub struct GuildOwners {
    client: ChatClient,
    owners: RwLock<HashMap<Snowflake, Snowflake>>,
}

impl GuildOwners {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            owners: RwLock::new(HashMap::new()),
        }
    }

    pub async fn is_owner(&self, guild_id: Option<Snowflake>, user_id: Snowflake) -> bool {
        let Some(guild_id) = guild_id else {
            return false;
        };
        if let Some(owner) = self.owners.read().await.get(&guild_id) {
            return *owner == user_id;
        }

        match self.client.guild(guild_id).await {
            Ok(guild) => {
                self.owners.write().await.insert(guild_id, guild.owner_id);
                guild.owner_id == user_id
            }
            Err(e) => {
                warn!("Failed to look up owner of guild {}: {}", guild_id, e);
                false
            }
        }
    }
}

pub fn caller_from(message: &Message, is_guild_owner: bool) -> Caller {
    Caller {
        user_id: message.author.id,
        display_name: message.author.display_name().to_string(),
        channel_id: message.channel_id,
        message_id: message.id,
        guild_id: message.guild_id,
        is_guild_owner,
    }
}

/// Send `reply` in response to `message`. Text and embeds carry the
/// invoker's name as the embed author.
pub async fn deliver(
    sink: &dyn MessageSink,
    message: &Message,
    reply: Reply,
) -> Result<(), ChatError> {
    let author = message.author.display_name().to_string();
    let outgoing = match reply {
        Reply::Reaction(emoji) => {
            return sink.react(message.channel_id, message.id, &emoji).await;
        }
        Reply::Text(text) => {
            OutgoingMessage::embed(Embed::new().description(text).author(author, None))
        }
        Reply::Embed(embed) if embed.author.is_none() => {
            OutgoingMessage::embed(embed.author(author, None))
        }
        Reply::Embed(embed) => OutgoingMessage::embed(embed),
    };
    sink.send(message.channel_id, &outgoing).await.map(|_| ())
}

/// Dispatch one incoming message and deliver whatever comes back.
pub async fn handle_message(
    dispatcher: &Dispatcher,
    sink: &dyn MessageSink,
    owners: &GuildOwners,
    message: Message,
) {
    if message.author.bot {
        return;
    }

    let is_owner = owners.is_owner(message.guild_id, message.author.id).await;
    let Some(outcome) = dispatcher
        .process(&message.content, caller_from(&message, is_owner))
        .await
    else {
        return;
    };

    if let Some(reply) = outcome.reply {
        if let Err(e) = deliver(sink, &message, reply).await {
            error!(
                "Failed to reply to {} in channel {}: {}",
                outcome.command.as_deref().unwrap_or("message"),
                message.channel_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_client::{MemorySink, User};

    fn message(content: &str) -> Message {
        Message {
            id: 10,
            channel_id: 20,
            guild_id: Some(30),
            author: User {
                id: 40,
                username: "alice".into(),
                global_name: Some("Alice".into()),
                bot: false,
            },
            content: content.into(),
            embeds: Vec::new(),
            timestamp: None,
        }
    }

    #[test]
    fn test_parse_first_column() {
        let csv = "Why did the chicken cross the road?,1\n\
                   \"Knock, knock. \"\"Who's there?\"\"\",2\r\n\
                   \n\
                   \"A joke\nover two lines\",3\n\
                   last";
        assert_eq!(
            parse_first_column(csv),
            vec![
                "Why did the chicken cross the road?",
                "Knock, knock. \"Who's there?\"",
                "A joke\nover two lines",
                "last",
            ]
        );
    }

    #[test]
    fn test_load_jokes_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"\"First, joke\",a\nSecond joke,b\n").unwrap();

        let jokes = load_jokes(Some(file.path())).unwrap();
        assert_eq!(jokes, vec!["First, joke", "Second joke"]);
    }

    #[test]
    fn test_missing_jokes_file_is_empty() {
        let jokes = load_jokes(Some(Path::new("/nonexistent/jokes.csv"))).unwrap();
        assert!(jokes.is_empty());
        assert!(load_jokes(None).unwrap().is_empty());
    }

    #[test]
    fn test_caller_from_message() {
        let caller = caller_from(&message("!help"), true);
        assert_eq!(caller.user_id, 40);
        assert_eq!(caller.display_name, "Alice");
        assert_eq!(caller.channel_id, 20);
        assert_eq!(caller.scope(), 30);
        assert!(caller.is_guild_owner);
    }

    #[tokio::test]
    async fn test_deliver_text_as_authored_embed() {
        let sink = MemorySink::new();
        deliver(&sink, &message("!day"), Reply::text("Friday"))
            .await
            .unwrap();

        let sent = sink.sent().await;
        assert_eq!(sent.len(), 1);
        let embed = &sent[0].message.embeds[0];
        assert_eq!(embed.description.as_deref(), Some("Friday"));
        assert_eq!(embed.author.as_ref().map(|a| a.name.as_str()), Some("Alice"));
    }

    #[tokio::test]
    async fn test_deliver_reaction() {
        let sink = MemorySink::new();
        deliver(&sink, &message("!random"), Reply::Reaction("❔".into()))
            .await
            .unwrap();

        assert!(sink.sent().await.is_empty());
        assert_eq!(sink.reactions().await, vec![(20, 10, "❔".to_string())]);
    }
}
