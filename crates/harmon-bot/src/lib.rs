//! Harmon chat bot.
//!
//! Command modules plus the glue between the chat client, the command
//! router and the Twitch stream notifier. The binary in `main.rs` only wires
//! these together.

pub mod api;
pub mod app;
pub mod commands;
pub mod config;
pub mod error;
