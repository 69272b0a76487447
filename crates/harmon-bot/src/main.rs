//! Harmon Bot - Main entry point.

use anyhow::Context;
use chat_client::{ChatClient, MessageReceiver, MessageSink};
use harmon_bot::api::ResourceClient;
use harmon_bot::app::{self, AppContext, GuildOwners};
use harmon_bot::config::Config;
use harmon_bot::error::AppResult;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use stream_notifier::{FollowStore, MemoryStore, SqliteStore, StreamPoller, TwitchClient};
use tokio::signal;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.bot.log_level, config.bot.log_json);

    info!("Starting Harmon Bot...");

    // Initialize clients
    let chat = ChatClient::new(
        &config.chat.api_url,
        config.chat.token.expose_secret().as_str(),
        config.chat.timeout,
    )
    .context("Failed to create chat client")?;

    let store: Arc<dyn FollowStore> = if config.store.database_url == ":memory:" {
        info!("Using in-memory follow store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            SqliteStore::connect(&config.store.database_url)
                .await
                .context("Failed to open follow database")?,
        )
    };

    if !config.twitch.has_credentials() {
        warn!("Twitch credentials missing - stream notifications disabled");
    }
    let twitch = Arc::new(
        TwitchClient::new(
            &config.twitch.api_url,
            config.twitch.client_id.clone().unwrap_or_default(),
            config
                .twitch
                .token
                .clone()
                .unwrap_or_else(|| SecretString::new(String::new())),
            config.twitch.timeout,
        )
        .context("Failed to create Twitch client")?,
    );

    let api = ResourceClient::new(&config.resources).context("Failed to create resource client")?;
    let jokes = Arc::new(app::load_jokes(config.bot.jokes_path.as_deref())?);

    // Health check
    match chat.current_user().await {
        Ok(user) => info!("Chat API healthy - logged in as {}", user.username),
        Err(e) => {
            error!("Chat API not reachable at {}: {}", config.chat.api_url, e);
            return Err(anyhow::anyhow!("Chat API not reachable").into());
        }
    }

    // Register commands
    let ctx = AppContext {
        store: store.clone(),
        twitch: twitch.clone(),
        api,
        jokes,
    };
    let modules = app::modules(&ctx);
    let dispatcher = Arc::new(app::build_dispatcher(&config.bot, &modules).await?);
    info!(
        "Registered {} root commands from {} modules",
        dispatcher.registry().read().await.root_names().len(),
        modules.len()
    );

    let sink: Arc<dyn MessageSink> = Arc::new(chat.clone());
    let owners = Arc::new(GuildOwners::new(chat.clone()));

    // Start stream poller
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = if config.notifier.enabled && config.twitch.has_credentials() {
        let poller = Arc::new(StreamPoller::new(
            store.clone(),
            twitch.clone(),
            sink.clone(),
            config.notifier.clone(),
        ));
        Some(stream_notifier::spawn_poller(poller, shutdown_rx))
    } else {
        None
    };

    info!("Listening for messages in {} channels...", config.chat.channels.len());

    // Start message receiver
    let receiver = MessageReceiver::new(chat, config.chat.channels.clone(), config.chat.poll_interval);
    let mut stream = Box::pin(receiver.stream());

    // Main message loop
    loop {
        tokio::select! {
            Some(message) = stream.next() => {
                let dispatcher = dispatcher.clone();
                let sink = sink.clone();
                let owners = owners.clone();
                tokio::spawn(async move {
                    app::handle_message(&dispatcher, sink.as_ref(), &owners, message).await;
                });
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            error!("Stream poller task failed: {}", e);
        }
    }
    Ok(())
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
