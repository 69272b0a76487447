//! Notification rendering.

use crate::types::{LiveStream, StreamMatch};
use chat_client::{Embed, EmbedAuthor};

pub const TWITCH_COLOR: u32 = 0x6441A5;
pub const TWITCH_ICON_URL: &str =
    "https://static.twitchcdn.net/assets/favicon-32-e29e246c157142c94346.png";

const LIVE_SUFFIX: &str = " just went live on Twitch";
const ENDED_SUFFIX: &str = " was live on Twitch";
const TITLE_LIMIT: usize = 256;

/// Titles longer than the embed limit are cut to 253 chars plus "...".
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() <= TITLE_LIMIT {
        title.to_string()
    } else {
        let cut: String = title.chars().take(TITLE_LIMIT - 3).collect();
        format!("{}...", cut)
    }
}

/// `1234567` -> `1,234,567`.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// The "went live" announcement.
pub fn live_embed(stream: &LiveStream) -> Embed {
    let mut embed = Embed::new()
        .title(truncate_title(&stream.title))
        .url(stream.channel_url())
        .timestamp(stream.started_at)
        .color(TWITCH_COLOR)
        .author(
            format!("{}{}", stream.user_name, LIVE_SUFFIX),
            Some(TWITCH_ICON_URL.to_string()),
        )
        .field("Viewers", thousands(stream.viewer_count));

    if let Some(game) = stream.game_name.as_deref().filter(|g| !g.is_empty()) {
        embed = embed.description(format!("{} is playing {}", stream.user_name, game));
    }
    if let Some(thumbnail) = &stream.thumbnail_url {
        embed = embed.thumbnail(
            thumbnail
                .replace("{width}", "320")
                .replace("{height}", "180"),
        );
    }
    if let Some(followers) = stream.follower_count {
        embed = embed.field("Followers", thousands(followers));
    }
    embed
}

fn swap_author_suffix(mut embed: Embed, from: &str, to: &str) -> Embed {
    if let Some(author) = embed.author.as_mut() {
        if let Some(name) = author.name.strip_suffix(from) {
            author.name = format!("{}{}", name, to);
        }
    }
    embed
}

/// Rewrite an announcement as "was live".
pub fn mark_ended(embed: Embed) -> Embed {
    swap_author_suffix(embed, LIVE_SUFFIX, ENDED_SUFFIX)
}

/// Rewrite an ended announcement back to "just went live".
pub fn mark_live(embed: Embed) -> Embed {
    swap_author_suffix(embed, ENDED_SUFFIX, LIVE_SUFFIX)
}

pub fn is_live(author: Option<&EmbedAuthor>) -> bool {
    author.map_or(false, |a| a.name.ends_with(LIVE_SUFFIX))
}

/// Plain-text notice sent after embeds were refused and the follow dropped.
pub fn unfollow_notice(stream: &LiveStream, matched: &StreamMatch) -> String {
    let preamble = "I am unable to send the embed notification in this text channel for";
    match matched {
        StreamMatch::Channel => format!(
            "{} {} going live on Twitch, so this text channel is no longer following that Twitch channel.",
            preamble, stream.user_name
        ),
        StreamMatch::Game(value) | StreamMatch::Keyword(value) => {
            let kind = match matched {
                StreamMatch::Game(_) => "game",
                _ => "keyword",
            };
            format!(
                "{} a stream going live on Twitch matching the {}, {}, so this text channel is no longer following that {} for Twitch streams.",
                preamble, kind, value, kind
            )
        }
    }
}
