//! Follow and notification persistence.
//!
//! Every method is a single atomic operation (insert-if-absent,
//! delete-returning, select or select-distinct), so the dispatcher and the
//! poller can interleave freely without multi-statement transactions.

use crate::error::StoreError;
use crate::types::*;
use async_trait::async_trait;
use chat_client::Snowflake;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Returns `None` when the destination already follows that user.
    async fn add_channel(&self, follow: &ChannelFollow)
        -> Result<Option<ChannelFollow>, StoreError>;

    async fn remove_channel(
        &self,
        destination: Snowflake,
        user_id: &str,
    ) -> Result<Option<ChannelFollow>, StoreError>;

    async fn channels_for(&self, destination: Snowflake) -> Result<Vec<ChannelFollow>, StoreError>;

    async fn destinations_for_user(&self, user_id: &str) -> Result<Vec<Snowflake>, StoreError>;

    async fn followed_user_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Returns `None` when the entry already exists.
    async fn add_entry(
        &self,
        table: EntryTable,
        entry: &FollowEntry,
    ) -> Result<Option<FollowEntry>, StoreError>;

    async fn remove_entry(
        &self,
        table: EntryTable,
        entry: &FollowEntry,
    ) -> Result<Option<FollowEntry>, StoreError>;

    async fn entries_for(
        &self,
        table: EntryTable,
        destination: Snowflake,
    ) -> Result<Vec<String>, StoreError>;

    async fn destinations_for(
        &self,
        table: EntryTable,
        value: &str,
    ) -> Result<Vec<Snowflake>, StoreError>;

    async fn distinct_values(&self, table: EntryTable) -> Result<Vec<String>, StoreError>;

    /// Returns `None` when a record for the pair already exists.
    async fn insert_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<Option<NotificationRecord>, StoreError>;

    async fn notifications_for_stream(
        &self,
        stream_id: &str,
    ) -> Result<Vec<NotificationRecord>, StoreError>;

    async fn live_notifications(&self) -> Result<Vec<NotificationRecord>, StoreError>;

    /// Returns whether a record was updated.
    async fn set_live(
        &self,
        stream_id: &str,
        destination: Snowflake,
        live: bool,
    ) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct MemoryTables {
    channels: Vec<ChannelFollow>,
    entries: HashMap<EntryTable, Vec<FollowEntry>>,
    notifications: Vec<NotificationRecord>,
}

/// In-memory store for tests and database-less runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<MemoryTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn distinct<I: IntoIterator<Item = String>>(values: I) -> Vec<String> {
    let mut seen = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

#[async_trait]
impl FollowStore for MemoryStore {
    async fn add_channel(
        &self,
        follow: &ChannelFollow,
    ) -> Result<Option<ChannelFollow>, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .channels
            .iter()
            .any(|c| c.destination == follow.destination && c.user_id == follow.user_id)
        {
            return Ok(None);
        }
        tables.channels.push(follow.clone());
        Ok(Some(follow.clone()))
    }

    async fn remove_channel(
        &self,
        destination: Snowflake,
        user_id: &str,
    ) -> Result<Option<ChannelFollow>, StoreError> {
        let mut tables = self.tables.write().await;
        let position = tables
            .channels
            .iter()
            .position(|c| c.destination == destination && c.user_id == user_id);
        Ok(position.map(|i| tables.channels.remove(i)))
    }

    async fn channels_for(&self, destination: Snowflake) -> Result<Vec<ChannelFollow>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .channels
            .iter()
            .filter(|c| c.destination == destination)
            .cloned()
            .collect())
    }

    async fn destinations_for_user(&self, user_id: &str) -> Result<Vec<Snowflake>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .channels
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.destination)
            .collect())
    }

    async fn followed_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(distinct(tables.channels.iter().map(|c| c.user_id.clone())))
    }

    async fn add_entry(
        &self,
        table: EntryTable,
        entry: &FollowEntry,
    ) -> Result<Option<FollowEntry>, StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entries.entry(table).or_default();
        if rows.contains(entry) {
            return Ok(None);
        }
        rows.push(entry.clone());
        Ok(Some(entry.clone()))
    }

    async fn remove_entry(
        &self,
        table: EntryTable,
        entry: &FollowEntry,
    ) -> Result<Option<FollowEntry>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.entries.get_mut(&table) else {
            return Ok(None);
        };
        Ok(rows
            .iter()
            .position(|e| e == entry)
            .map(|i| rows.remove(i)))
    }

    async fn entries_for(
        &self,
        table: EntryTable,
        destination: Snowflake,
    ) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|e| e.destination == destination)
                    .map(|e| e.value.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn destinations_for(
        &self,
        table: EntryTable,
        value: &str,
    ) -> Result<Vec<Snowflake>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|e| e.value == value)
                    .map(|e| e.destination)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn distinct_values(&self, table: EntryTable) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .get(&table)
            .map(|rows| distinct(rows.iter().map(|e| e.value.clone())))
            .unwrap_or_default())
    }

    async fn insert_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .notifications
            .iter()
            .any(|n| n.stream_id == record.stream_id && n.destination == record.destination)
        {
            return Ok(None);
        }
        tables.notifications.push(record.clone());
        Ok(Some(record.clone()))
    }

    async fn notifications_for_stream(
        &self,
        stream_id: &str,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.stream_id == stream_id)
            .cloned()
            .collect())
    }

    async fn live_notifications(&self) -> Result<Vec<NotificationRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.live)
            .cloned()
            .collect())
    }

    async fn set_live(
        &self,
        stream_id: &str,
        destination: Snowflake,
        live: bool,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables
            .notifications
            .iter_mut()
            .find(|n| n.stream_id == stream_id && n.destination == destination)
        {
            Some(record) => {
                record.live = live;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS channels (
        channel_id  INTEGER NOT NULL,
        user_name   TEXT NOT NULL,
        user_id     TEXT NOT NULL,
        PRIMARY KEY (channel_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS filters (
        channel_id  INTEGER NOT NULL,
        filter      TEXT NOT NULL,
        PRIMARY KEY (channel_id, filter)
    )",
    "CREATE TABLE IF NOT EXISTS games (
        channel_id  INTEGER NOT NULL,
        game        TEXT NOT NULL,
        PRIMARY KEY (channel_id, game)
    )",
    "CREATE TABLE IF NOT EXISTS keywords (
        channel_id  INTEGER NOT NULL,
        keyword     TEXT NOT NULL,
        PRIMARY KEY (channel_id, keyword)
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        stream_id   TEXT NOT NULL,
        channel_id  INTEGER NOT NULL,
        message_id  INTEGER NOT NULL,
        live        BOOLEAN NOT NULL,
        PRIMARY KEY (stream_id, channel_id)
    )",
];

// Snowflakes stay below 2^63, so they round-trip through SQLite integers.
fn to_db(id: Snowflake) -> i64 {
    id as i64
}

fn from_db(id: i64) -> Snowflake {
    id as Snowflake
}

type NotificationRow = (String, i64, i64, bool);

fn notification(row: NotificationRow) -> NotificationRecord {
    NotificationRecord {
        stream_id: row.0,
        destination: from_db(row.1),
        message_id: from_db(row.2),
        live: row.3,
    }
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open (creating if needed) a database file, or a private in-memory
    /// database for `:memory:`, and create the schema.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

            // The database lives only as long as its single connection.
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        warn!(path = %parent.display(), error = %e, "Failed to create database directory");
                    }
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        };

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(path = %path, "Notification database ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl FollowStore for SqliteStore {
    #[instrument(skip(self))]
    async fn add_channel(
        &self,
        follow: &ChannelFollow,
    ) -> Result<Option<ChannelFollow>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "INSERT INTO channels (channel_id, user_name, user_id) VALUES (?, ?, ?)
             ON CONFLICT DO NOTHING
             RETURNING channel_id, user_name, user_id",
        )
        .bind(to_db(follow.destination))
        .bind(&follow.user_name)
        .bind(&follow.user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(destination, user_name, user_id)| ChannelFollow {
            destination: from_db(destination),
            user_name,
            user_id,
        }))
    }

    #[instrument(skip(self))]
    async fn remove_channel(
        &self,
        destination: Snowflake,
        user_id: &str,
    ) -> Result<Option<ChannelFollow>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "DELETE FROM channels WHERE channel_id = ? AND user_id = ?
             RETURNING channel_id, user_name, user_id",
        )
        .bind(to_db(destination))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(destination, user_name, user_id)| ChannelFollow {
            destination: from_db(destination),
            user_name,
            user_id,
        }))
    }

    async fn channels_for(&self, destination: Snowflake) -> Result<Vec<ChannelFollow>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT user_name, user_id FROM channels WHERE channel_id = ? ORDER BY rowid",
        )
        .bind(to_db(destination))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_name, user_id)| ChannelFollow {
                destination,
                user_name,
                user_id,
            })
            .collect())
    }

    async fn destinations_for_user(&self, user_id: &str) -> Result<Vec<Snowflake>, StoreError> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "SELECT channel_id FROM channels WHERE user_id = ? ORDER BY rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| from_db(id)).collect())
    }

    async fn followed_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT DISTINCT user_id FROM channels")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    #[instrument(skip(self))]
    async fn add_entry(
        &self,
        table: EntryTable,
        entry: &FollowEntry,
    ) -> Result<Option<FollowEntry>, StoreError> {
        let sql = format!(
            "INSERT INTO {table} (channel_id, {column}) VALUES (?, ?)
             ON CONFLICT DO NOTHING
             RETURNING channel_id, {column}",
            table = table.table(),
            column = table.column()
        );
        let row = sqlx::query_as::<_, (i64, String)>(&sql)
            .bind(to_db(entry.destination))
            .bind(&entry.value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(destination, value)| FollowEntry::new(from_db(destination), value)))
    }

    #[instrument(skip(self))]
    async fn remove_entry(
        &self,
        table: EntryTable,
        entry: &FollowEntry,
    ) -> Result<Option<FollowEntry>, StoreError> {
        let sql = format!(
            "DELETE FROM {table} WHERE channel_id = ? AND {column} = ?
             RETURNING channel_id, {column}",
            table = table.table(),
            column = table.column()
        );
        let row = sqlx::query_as::<_, (i64, String)>(&sql)
            .bind(to_db(entry.destination))
            .bind(&entry.value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(destination, value)| FollowEntry::new(from_db(destination), value)))
    }

    async fn entries_for(
        &self,
        table: EntryTable,
        destination: Snowflake,
    ) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT {column} FROM {table} WHERE channel_id = ? ORDER BY rowid",
            table = table.table(),
            column = table.column()
        );
        let rows = sqlx::query_as::<_, (String,)>(&sql)
            .bind(to_db(destination))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(value,)| value).collect())
    }

    async fn destinations_for(
        &self,
        table: EntryTable,
        value: &str,
    ) -> Result<Vec<Snowflake>, StoreError> {
        let sql = format!(
            "SELECT channel_id FROM {table} WHERE {column} = ? ORDER BY rowid",
            table = table.table(),
            column = table.column()
        );
        let rows = sqlx::query_as::<_, (i64,)>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| from_db(id)).collect())
    }

    async fn distinct_values(&self, table: EntryTable) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM {table}",
            table = table.table(),
            column = table.column()
        );
        let rows = sqlx::query_as::<_, (String,)>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(value,)| value).collect())
    }

    #[instrument(skip(self))]
    async fn insert_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "INSERT INTO notifications (stream_id, channel_id, message_id, live)
             VALUES (?, ?, ?, ?)
             ON CONFLICT DO NOTHING
             RETURNING stream_id, channel_id, message_id, live",
        )
        .bind(&record.stream_id)
        .bind(to_db(record.destination))
        .bind(to_db(record.message_id))
        .bind(record.live)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(notification))
    }

    async fn notifications_for_stream(
        &self,
        stream_id: &str,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT stream_id, channel_id, message_id, live
             FROM notifications WHERE stream_id = ? ORDER BY rowid",
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(notification).collect())
    }

    async fn live_notifications(&self) -> Result<Vec<NotificationRecord>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT stream_id, channel_id, message_id, live
             FROM notifications WHERE live = TRUE ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(notification).collect())
    }

    #[instrument(skip(self))]
    async fn set_live(
        &self,
        stream_id: &str,
        destination: Snowflake,
        live: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET live = ? WHERE stream_id = ? AND channel_id = ?",
        )
        .bind(live)
        .bind(stream_id)
        .bind(to_db(destination))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn follow(destination: Snowflake, user_id: &str) -> ChannelFollow {
        ChannelFollow {
            destination,
            user_name: format!("user{}", user_id),
            user_id: user_id.into(),
        }
    }

    fn record(stream_id: &str, destination: Snowflake) -> NotificationRecord {
        NotificationRecord {
            stream_id: stream_id.into(),
            destination,
            message_id: 900,
            live: true,
        }
    }

    async fn stores() -> Vec<Box<dyn FollowStore>> {
        vec![
            Box::new(MemoryStore::new()),
            Box::new(SqliteStore::connect(":memory:").await.unwrap()),
        ]
    }

    #[tokio::test]
    async fn test_add_channel_is_idempotent() {
        for store in stores().await {
            assert!(tokio_test::assert_ok!(store.add_channel(&follow(1, "42")).await).is_some());
            assert!(store.add_channel(&follow(1, "42")).await.unwrap().is_none());
            assert_eq!(store.channels_for(1).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_remove_missing_channel_returns_none() {
        for store in stores().await {
            store.add_channel(&follow(1, "42")).await.unwrap();
            assert!(store.remove_channel(1, "43").await.unwrap().is_none());
            assert!(store.remove_channel(2, "42").await.unwrap().is_none());
            assert_eq!(store.channels_for(1).await.unwrap().len(), 1);

            let removed = store.remove_channel(1, "42").await.unwrap();
            assert_eq!(removed, Some(follow(1, "42")));
            assert!(store.channels_for(1).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_followed_user_ids_are_distinct() {
        for store in stores().await {
            store.add_channel(&follow(1, "42")).await.unwrap();
            store.add_channel(&follow(2, "42")).await.unwrap();
            store.add_channel(&follow(2, "7")).await.unwrap();

            let mut ids = store.followed_user_ids().await.unwrap();
            ids.sort();
            assert_eq!(ids, vec!["42".to_string(), "7".to_string()]);
            assert_eq!(store.destinations_for_user("42").await.unwrap(), vec![1, 2]);
        }
    }

    #[tokio::test]
    async fn test_entry_tables_are_separate() {
        for store in stores().await {
            let chess = FollowEntry::new(1, "Chess");
            assert!(store
                .add_entry(EntryTable::Games, &chess)
                .await
                .unwrap()
                .is_some());
            assert!(store
                .add_entry(EntryTable::Games, &chess)
                .await
                .unwrap()
                .is_none());
            assert!(store
                .add_entry(EntryTable::Keywords, &chess)
                .await
                .unwrap()
                .is_some());
            store
                .add_entry(EntryTable::Games, &FollowEntry::new(2, "Chess"))
                .await
                .unwrap();

            assert_eq!(
                store.distinct_values(EntryTable::Games).await.unwrap(),
                vec!["Chess".to_string()]
            );
            assert_eq!(
                store.destinations_for(EntryTable::Games, "Chess").await.unwrap(),
                vec![1, 2]
            );
            assert!(store
                .entries_for(EntryTable::Filters, 1)
                .await
                .unwrap()
                .is_empty());

            assert_eq!(
                store.remove_entry(EntryTable::Keywords, &chess).await.unwrap(),
                Some(chess.clone())
            );
            assert!(store
                .remove_entry(EntryTable::Keywords, &chess)
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn test_notification_lifecycle() {
        for store in stores().await {
            assert!(store
                .insert_notification(&record("s1", 1))
                .await
                .unwrap()
                .is_some());
            assert!(store
                .insert_notification(&record("s1", 1))
                .await
                .unwrap()
                .is_none());
            store.insert_notification(&record("s1", 2)).await.unwrap();

            assert!(store.set_live("s1", 1, false).await.unwrap());
            assert!(!store.set_live("s9", 1, false).await.unwrap());

            let live = store.live_notifications().await.unwrap();
            assert_eq!(live, vec![record("s1", 2)]);

            let all = store.notifications_for_stream("s1").await.unwrap();
            assert_eq!(all.len(), 2);
            assert!(!all[0].live);
        }
    }

    #[tokio::test]
    async fn test_sqlite_file_persists_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harmon.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::connect(path).await.unwrap();
            store
                .add_entry(EntryTable::Filters, &FollowEntry::new(5, "speedrun"))
                .await
                .unwrap();
        }

        let store = SqliteStore::connect(path).await.unwrap();
        assert_eq!(
            store.entries_for(EntryTable::Filters, 5).await.unwrap(),
            vec!["speedrun".to_string()]
        );
    }
}
