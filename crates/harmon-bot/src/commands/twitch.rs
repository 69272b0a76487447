//! Twitch follow management for the stream notifier.

use crate::commands::internal;
use async_trait::async_trait;
use chat_client::{Embed, Snowflake};
use command_router::{
    Args, Check, CommandContext, CommandHandler, CommandSpec, CommandTree, HandlerError, Module,
    Param, RegistryError, Reply,
};
use std::sync::Arc;
use stream_notifier::{ChannelFollow, EntryTable, FollowEntry, FollowStore, LiveSource, TwitchUser};
use tracing::warn;

const DESCRIPTION_LIMIT: usize = 4096;
const TWITCH_PURPLE: u32 = 0x6441A5;

pub struct TwitchModule {
    store: Arc<dyn FollowStore>,
    source: Arc<dyn LiveSource>,
}

impl TwitchModule {
    pub fn new(store: Arc<dyn FollowStore>, source: Arc<dyn LiveSource>) -> Self {
        Self { store, source }
    }
}

fn game_link(game: &str) -> String {
    format!(
        "[`{}`](https://www.twitch.tv/directory/game/{})",
        game,
        urlencoding::encode(game)
    )
}

fn channel_link(login: &str) -> String {
    format!("[`{}`](https://www.twitch.tv/{})", login, login)
}

/// Embed listing `lines`, cut short to fit the description limit.
fn list_embed(title: &str, lines: &[String]) -> Embed {
    let mut description = String::new();
    for (shown, line) in lines.iter().enumerate() {
        let more = format!("\n… and {} more", lines.len() - shown);
        if description.len() + line.len() + 1 + more.len() > DESCRIPTION_LIMIT {
            description.push_str(&more);
            break;
        }
        if !description.is_empty() {
            description.push('\n');
        }
        description.push_str(line);
    }
    if description.is_empty() {
        description.push_str("None");
    }

    Embed::new()
        .title(title)
        .description(description)
        .color(TWITCH_PURPLE)
}

async fn lookup(source: &dyn LiveSource, login: &str) -> Option<TwitchUser> {
    match source.lookup_user(login).await {
        Ok(user) => user,
        Err(e) => {
            warn!(login, error = %e, "Twitch user lookup failed");
            None
        }
    }
}

struct AddChannel {
    store: Arc<dyn FollowStore>,
    source: Arc<dyn LiveSource>,
}

#[async_trait]
impl CommandHandler for AddChannel {
    async fn invoke(&self, ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let username = args.get_str("username").unwrap_or_default();
        let user = self
            .source
            .lookup_user(username)
            .await
            .map_err(HandlerError::upstream)?
            .ok_or_else(|| HandlerError::user(format!("Twitch channel `{}` not found", username)))?;

        let follow = ChannelFollow {
            destination: ctx.caller.channel_id,
            user_name: user.login.clone(),
            user_id: user.id,
        };
        let inserted = self.store.add_channel(&follow).await.map_err(internal)?;

        Ok(Reply::text(match inserted {
            None => format!(
                "This text channel is already following the channel, `{}`",
                user.login
            ),
            Some(_) => format!(
                "Added the Twitch channel, {}, to this text channel\n\
                 I will now announce here when this Twitch channel goes live",
                channel_link(&user.login)
            ),
        }))
    }
}

struct RemoveChannel {
    store: Arc<dyn FollowStore>,
    source: Arc<dyn LiveSource>,
}

impl RemoveChannel {
    /// Prefer the current Twitch id; fall back to the name stored at follow
    /// time in case the channel was renamed or the lookup failed.
    async fn remove(
        &self,
        destination: Snowflake,
        username: &str,
    ) -> Result<Option<ChannelFollow>, HandlerError> {
        if let Some(user) = lookup(self.source.as_ref(), username).await {
            if let Some(removed) = self
                .store
                .remove_channel(destination, &user.id)
                .await
                .map_err(internal)?
            {
                return Ok(Some(removed));
            }
        }

        let followed = self.store.channels_for(destination).await.map_err(internal)?;
        match followed
            .into_iter()
            .find(|f| f.user_name.eq_ignore_ascii_case(username))
        {
            Some(follow) => self
                .store
                .remove_channel(destination, &follow.user_id)
                .await
                .map_err(internal),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CommandHandler for RemoveChannel {
    async fn invoke(&self, ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let username = args.get_str("username").unwrap_or_default();
        match self.remove(ctx.caller.channel_id, username).await? {
            Some(removed) => Ok(Reply::text(format!(
                "Removed the Twitch channel, {}, from this text channel",
                channel_link(&removed.user_name)
            ))),
            None => Err(HandlerError::user(
                "This text channel isn't following that Twitch channel",
            )),
        }
    }
}

struct AddEntry {
    store: Arc<dyn FollowStore>,
    table: EntryTable,
}

#[async_trait]
impl CommandHandler for AddEntry {
    async fn invoke(&self, ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let value = args.get_str("value").unwrap_or_default().trim();
        let entry = FollowEntry::new(ctx.caller.channel_id, value);
        let inserted = self
            .store
            .add_entry(self.table, &entry)
            .await
            .map_err(internal)?;

        let reply = match (self.table, inserted.is_some()) {
            (EntryTable::Filters, false) => {
                format!("This text channel already has the filter, `{}`", value)
            }
            (EntryTable::Filters, true) => format!(
                "Added the filter, `{}`, to this text channel\n\
                 I will now filter all streams for this string in the title",
                value
            ),
            (EntryTable::Games, false) => {
                format!("This text channel is already following the game, `{}`", value)
            }
            (EntryTable::Games, true) => format!(
                "Added the game, {}, to this text channel\n\
                 I will now announce here when Twitch streams playing this game go live",
                game_link(value)
            ),
            (EntryTable::Keywords, false) => {
                format!("This text channel is already following the keyword, `{}`", value)
            }
            (EntryTable::Keywords, true) => format!(
                "Added the keyword search, `{}`, to this text channel\n\
                 I will now announce here when Twitch streams with this keyword go live",
                value
            ),
        };
        Ok(Reply::text(reply))
    }
}

struct RemoveEntry {
    store: Arc<dyn FollowStore>,
    table: EntryTable,
}

#[async_trait]
impl CommandHandler for RemoveEntry {
    async fn invoke(&self, ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let value = args.get_str("value").unwrap_or_default().trim();
        let entry = FollowEntry::new(ctx.caller.channel_id, value);
        let removed = self
            .store
            .remove_entry(self.table, &entry)
            .await
            .map_err(internal)?;

        if removed.is_none() {
            return Err(HandlerError::user(match self.table {
                EntryTable::Filters => "This text channel doesn't have that filter",
                EntryTable::Games => "This text channel isn't following that game",
                EntryTable::Keywords => "This text channel isn't following that keyword",
            }));
        }

        Ok(Reply::text(match self.table {
            EntryTable::Filters => format!("Removed the filter, `{}`, from this text channel", value),
            EntryTable::Games => format!(
                "Removed the game, {}, from this text channel",
                game_link(value)
            ),
            EntryTable::Keywords => format!(
                "Removed the Twitch keyword search, `{}`, from this text channel",
                value
            ),
        }))
    }
}

struct ListChannels {
    store: Arc<dyn FollowStore>,
}

#[async_trait]
impl CommandHandler for ListChannels {
    async fn invoke(&self, ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
        let follows = self
            .store
            .channels_for(ctx.caller.channel_id)
            .await
            .map_err(internal)?;
        let lines: Vec<String> = follows
            .iter()
            .map(|f| format!("[{}](https://www.twitch.tv/{})", f.user_name, f.user_name))
            .collect();
        Ok(Reply::Embed(list_embed(
            "Twitch channels being followed in this text channel",
            &lines,
        )))
    }
}

struct ListEntries {
    store: Arc<dyn FollowStore>,
    table: EntryTable,
}

#[async_trait]
impl CommandHandler for ListEntries {
    async fn invoke(&self, ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
        let values = self
            .store
            .entries_for(self.table, ctx.caller.channel_id)
            .await
            .map_err(internal)?;
        let title = match self.table {
            EntryTable::Filters => "Twitch stream title filters in this text channel",
            EntryTable::Games => "Twitch games being followed in this text channel",
            EntryTable::Keywords => "Twitch keywords being followed in this text channel",
        };
        Ok(Reply::Embed(list_embed(title, &values)))
    }
}

fn may_edit() -> Check {
    Check::Any(vec![Check::Permitted, Check::GuildOwner])
}

impl TwitchModule {
    fn edit_group(&self, name: &str, adding: bool) -> CommandSpec {
        let entry = |leaf: &str, table: EntryTable| {
            let spec = if adding {
                CommandSpec::leaf(
                    leaf,
                    AddEntry {
                        store: self.store.clone(),
                        table,
                    },
                )
            } else {
                CommandSpec::leaf(
                    leaf,
                    RemoveEntry {
                        store: self.store.clone(),
                        table,
                    },
                )
            };
            spec.param(Param::rest("value")).check(may_edit())
        };

        let channel = if adding {
            CommandSpec::leaf(
                "channel",
                AddChannel {
                    store: self.store.clone(),
                    source: self.source.clone(),
                },
            )
            .description("Add a Twitch channel to follow")
        } else {
            CommandSpec::leaf(
                "channel",
                RemoveChannel {
                    store: self.store.clone(),
                    source: self.source.clone(),
                },
            )
            .description("Remove a Twitch channel being followed")
        };

        let (group, filter, game, keyword) = if adding {
            (
                "Add Twitch channels, games, or keywords to follow",
                "Add a string to filter Twitch stream titles by",
                "Add a Twitch game to follow",
                "Add a Twitch keyword search to follow",
            )
        } else {
            (
                "Remove Twitch channels, games, or keywords being followed",
                "Remove a string Twitch stream titles are being filtered by",
                "Remove a Twitch game being followed",
                "Remove a Twitch keyword search being followed",
            )
        };

        CommandSpec::group(name)
            .description(group)
            .check(Check::NotForbidden)
            .child(
                channel
                    .alias("stream")
                    .param(Param::word("username"))
                    .check(may_edit()),
            )
            .child(entry("filter", EntryTable::Filters).description(filter))
            .child(entry("game", EntryTable::Games).description(game))
            .child(
                entry("keyword", EntryTable::Keywords)
                    .alias("query")
                    .alias("search")
                    .description(keyword),
            )
    }
}

impl Module for TwitchModule {
    fn name(&self) -> &str {
        "twitch"
    }

    fn load(&self, tree: &mut CommandTree) -> Result<(), RegistryError> {
        let list = |name: &str, table: EntryTable, description: &str| {
            CommandSpec::leaf(
                name,
                ListEntries {
                    store: self.store.clone(),
                    table,
                },
            )
            .description(description)
            .check(Check::NotForbidden)
        };

        tree.register(
            CommandSpec::group("twitch")
                .description("Twitch go-live notifications")
                .check(Check::NotForbidden)
                .child(self.edit_group("add", true))
                .child(self.edit_group("remove", false).alias("delete"))
                .child(
                    CommandSpec::leaf(
                        "channels",
                        ListChannels {
                            store: self.store.clone(),
                        },
                    )
                    .alias("streams")
                    .description("Show Twitch channels being followed in this text channel")
                    .check(Check::NotForbidden),
                )
                .child(list(
                    "filters",
                    EntryTable::Filters,
                    "Show strings Twitch stream titles are being filtered by in this text channel",
                ))
                .child(list(
                    "games",
                    EntryTable::Games,
                    "Show Twitch games being followed in this text channel",
                ))
                .child(
                    list(
                        "keywords",
                        EntryTable::Keywords,
                        "Show Twitch keywords being followed in this text channel",
                    )
                    .alias("queries")
                    .alias("searches"),
                ),
            &[],
        )?;
        Ok(())
    }

    fn unload(&self, tree: &mut CommandTree) -> Result<(), RegistryError> {
        tree.unregister(&["twitch"])
    }
}
