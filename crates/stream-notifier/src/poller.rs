//! Stream poller.
//!
//! Each cycle queries the source for every followed game, keyword and
//! channel, announces streams to destinations that have not seen them yet,
//! and marks announcements as ended once their stream disappears. All state
//! is re-read from the store every cycle and every write is idempotent, so an
//! aborted cycle is simply redone by the next one.

use crate::config::NotifierConfig;
use crate::error::{PollError, SourceError};
use crate::render::{live_embed, mark_ended, mark_live, unfollow_notice};
use crate::source::LiveSource;
use crate::store::FollowStore;
use crate::types::*;
use chat_client::{Embed, MessageSink, OutgoingMessage, Snowflake};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Stream ids seen in any query.
    pub observed: HashSet<String>,
    pub announced: usize,
    pub relived: usize,
    pub ended: usize,
    pub unfollowed: usize,
    /// Queries skipped because the source was temporarily unavailable.
    pub skipped_queries: usize,
}

/// Polls a [`LiveSource`] and drives notifications on a [`MessageSink`].
pub struct StreamPoller {
    store: Arc<dyn FollowStore>,
    source: Arc<dyn LiveSource>,
    sink: Arc<dyn MessageSink>,
    config: NotifierConfig,
}

impl StreamPoller {
    pub fn new(
        store: Arc<dyn FollowStore>,
        source: Arc<dyn LiveSource>,
        sink: Arc<dyn MessageSink>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            store,
            source,
            sink,
            config,
        }
    }

    /// Run a single poll cycle.
    pub async fn poll_once(&self) -> Result<CycleReport, PollError> {
        let mut report = CycleReport::default();
        let mut first_request = true;

        for game in self.store.distinct_values(EntryTable::Games).await? {
            self.pause(&mut first_request).await;
            let result = self.source.streams_by_game(&game).await;
            self.handle_query(result, StreamMatch::Game(game), &mut report)
                .await?;
        }

        for keyword in self.store.distinct_values(EntryTable::Keywords).await? {
            self.pause(&mut first_request).await;
            let result = self.source.streams_by_keyword(&keyword).await;
            self.handle_query(result, StreamMatch::Keyword(keyword), &mut report)
                .await?;
        }

        let user_ids = self.store.followed_user_ids().await?;
        let batch = self.config.max_batch.min(self.source.max_batch()).max(1);
        for chunk in user_ids.chunks(batch) {
            self.pause(&mut first_request).await;
            let result = self.source.streams_by_users(chunk).await;
            self.handle_query(result, StreamMatch::Channel, &mut report)
                .await?;
        }

        if report.skipped_queries > 0 {
            warn!(
                skipped = report.skipped_queries,
                "Incomplete cycle, not marking any stream as ended"
            );
        } else {
            self.retract(&mut report).await?;
        }

        Ok(report)
    }

    async fn pause(&self, first_request: &mut bool) {
        if !std::mem::take(first_request) && !self.config.request_pause.is_zero() {
            tokio::time::sleep(self.config.request_pause).await;
        }
    }

    async fn handle_query(
        &self,
        result: Result<Vec<LiveStream>, SourceError>,
        matched: StreamMatch,
        report: &mut CycleReport,
    ) -> Result<(), PollError> {
        let streams = match result {
            Ok(streams) => streams,
            Err(SourceError::Unavailable(status)) => {
                warn!(%matched, status, "Twitch query skipped");
                report.skipped_queries += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        debug!(%matched, count = streams.len(), "Live streams");
        for stream in streams {
            report.observed.insert(stream.id.clone());
            self.process_stream(&stream, &matched, report).await?;
        }
        Ok(())
    }

    async fn destinations(
        &self,
        stream: &LiveStream,
        matched: &StreamMatch,
    ) -> Result<Vec<Snowflake>, PollError> {
        Ok(match matched {
            StreamMatch::Game(game) => self.store.destinations_for(EntryTable::Games, game).await?,
            StreamMatch::Keyword(keyword) => {
                self.store
                    .destinations_for(EntryTable::Keywords, keyword)
                    .await?
            }
            StreamMatch::Channel => self.store.destinations_for_user(&stream.user_id).await?,
        })
    }

    /// A destination with filters only wants titles containing one of them.
    async fn passes_filters(&self, destination: Snowflake, title: &str) -> Result<bool, PollError> {
        let filters = self
            .store
            .entries_for(EntryTable::Filters, destination)
            .await?;
        if filters.is_empty() {
            return Ok(true);
        }
        Ok(filters.iter().any(|f| title.contains(f.as_str())))
    }

    async fn process_stream(
        &self,
        stream: &LiveStream,
        matched: &StreamMatch,
        report: &mut CycleReport,
    ) -> Result<(), PollError> {
        let records = self.store.notifications_for_stream(&stream.id).await?;

        for record in records.iter().filter(|r| !r.live) {
            if self.relive(stream, record).await? {
                report.relived += 1;
            }
        }

        let mut embed: Option<Embed> = None;
        for destination in self.destinations(stream, matched).await? {
            if records.iter().any(|r| r.destination == destination) {
                continue;
            }
            if !self.passes_filters(destination, &stream.title).await? {
                debug!(stream_id = %stream.id, destination, "Filtered out");
                continue;
            }

            let rendered = match embed.clone() {
                Some(rendered) => rendered,
                None => {
                    let rendered = self.render(stream).await;
                    embed = Some(rendered.clone());
                    rendered
                }
            };
            self.announce(stream, destination, matched, rendered, report)
                .await?;
        }
        Ok(())
    }

    async fn render(&self, stream: &LiveStream) -> Embed {
        let mut stream = stream.clone();
        if stream.follower_count.is_none() {
            match self.source.follower_count(&stream.user_id).await {
                Ok(count) => stream.follower_count = count,
                Err(e) => debug!(user_id = %stream.user_id, error = %e, "No follower count"),
            }
        }
        live_embed(&stream)
    }

    async fn announce(
        &self,
        stream: &LiveStream,
        destination: Snowflake,
        matched: &StreamMatch,
        embed: Embed,
        report: &mut CycleReport,
    ) -> Result<(), PollError> {
        match self
            .sink
            .send(destination, &OutgoingMessage::embed(embed))
            .await
        {
            Ok(message_id) => {
                self.store
                    .insert_notification(&NotificationRecord {
                        stream_id: stream.id.clone(),
                        destination,
                        message_id,
                        live: true,
                    })
                    .await?;
                info!(stream_id = %stream.id, destination, user = %stream.user_name, "Announced live stream");
                report.announced += 1;
            }
            Err(e) if e.is_forbidden() => {
                self.unfollow(stream, destination, matched).await?;
                report.unfollowed += 1;
            }
            Err(e) => {
                warn!(stream_id = %stream.id, destination, error = %e, "Failed to send notification");
            }
        }
        Ok(())
    }

    /// Drop the follow that produced a refused notification and say why.
    async fn unfollow(
        &self,
        stream: &LiveStream,
        destination: Snowflake,
        matched: &StreamMatch,
    ) -> Result<(), PollError> {
        match matched {
            StreamMatch::Channel => {
                self.store
                    .remove_channel(destination, &stream.user_id)
                    .await?;
            }
            StreamMatch::Game(game) => {
                self.store
                    .remove_entry(EntryTable::Games, &FollowEntry::new(destination, game))
                    .await?;
            }
            StreamMatch::Keyword(keyword) => {
                self.store
                    .remove_entry(EntryTable::Keywords, &FollowEntry::new(destination, keyword))
                    .await?;
            }
        }
        warn!(destination, %matched, "Embeds refused, follow removed");

        let notice = OutgoingMessage::text(unfollow_notice(stream, matched));
        if let Err(e) = self.sink.send(destination, &notice).await {
            warn!(destination, error = %e, "Failed to send unfollow notice");
        }
        Ok(())
    }

    /// Flip an ended announcement back to live. Returns whether the
    /// record changed.
    async fn relive(
        &self,
        stream: &LiveStream,
        record: &NotificationRecord,
    ) -> Result<bool, PollError> {
        match self.sink.fetch(record.destination, record.message_id).await {
            Ok(message) => {
                let embed = match message.embeds.into_iter().next() {
                    Some(embed) => mark_live(embed),
                    None => live_embed(stream),
                };
                if let Err(e) = self
                    .sink
                    .edit(record.destination, record.message_id, &OutgoingMessage::embed(embed))
                    .await
                {
                    warn!(stream_id = %record.stream_id, error = %e, "Failed to edit notification");
                }
            }
            Err(e) if e.is_not_found() => {
                debug!(stream_id = %record.stream_id, "Notification was deleted");
            }
            Err(e) => {
                warn!(stream_id = %record.stream_id, error = %e, "Failed to fetch notification");
                return Ok(false);
            }
        }

        Ok(self
            .store
            .set_live(&record.stream_id, record.destination, true)
            .await?)
    }

    /// Mark live records whose stream was not observed this cycle as ended.
    async fn retract(&self, report: &mut CycleReport) -> Result<(), PollError> {
        for record in self.store.live_notifications().await? {
            if report.observed.contains(&record.stream_id) {
                continue;
            }

            match self.sink.fetch(record.destination, record.message_id).await {
                Ok(message) => {
                    if let Some(embed) = message.embeds.into_iter().next() {
                        let ended = OutgoingMessage::embed(mark_ended(embed));
                        if let Err(e) = self
                            .sink
                            .edit(record.destination, record.message_id, &ended)
                            .await
                        {
                            warn!(stream_id = %record.stream_id, error = %e, "Failed to edit notification");
                        }
                    }
                }
                Err(e) if e.is_not_found() => {
                    debug!(stream_id = %record.stream_id, "Notification was deleted");
                }
                Err(e) => {
                    warn!(stream_id = %record.stream_id, error = %e, "Failed to fetch notification");
                    continue;
                }
            }

            if self
                .store
                .set_live(&record.stream_id, record.destination, false)
                .await?
            {
                debug!(stream_id = %record.stream_id, destination = record.destination, "Stream ended");
                report.ended += 1;
            }
        }
        Ok(())
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// An in-flight cycle always completes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.config.interval, "Starting stream poller");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(report) => {
                    if report.announced + report.ended + report.relived + report.unfollowed > 0 {
                        info!(
                            announced = report.announced,
                            relived = report.relived,
                            ended = report.ended,
                            unfollowed = report.unfollowed,
                            "Poll cycle complete"
                        );
                    } else {
                        debug!(observed = report.observed.len(), "Poll cycle complete");
                    }
                    self.config.interval
                }
                Err(e) if e.is_connectivity() => {
                    warn!(error = %e, "Twitch unreachable, backing off");
                    self.config.connectivity_backoff + self.config.interval
                }
                Err(e) => {
                    error!(error = %e, "Poll cycle failed");
                    self.config.error_backoff + self.config.interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Stream poller stopped");
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}

/// Spawn the poller as a background task.
pub fn spawn_poller(
    poller: Arc<StreamPoller>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        poller.run(shutdown).await;
    })
}
