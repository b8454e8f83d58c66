//! `SQLite` implementation of the memory service.
//!
//! Several agent processes may point at the same database file. Store names
//! carry a `UNIQUE` constraint, so two concurrent creators cannot both
//! succeed; the loser gets [`MemoryError::AlreadyExists`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::memory::core::config::StorageConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::{EventId, StoreId};
use crate::memory::core::strategy::{StrategyConfig, namespace_for};
use crate::memory::service::extraction::{StrategyExtractor, rank};
use crate::memory::service::{
    CreateStoreRequest, Event, EventMessage, EventQuery, MemoryRecord, MemoryService, NewEvent,
    RecordQuery, ServiceFuture, StoreStatus, StoreSummary,
};

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type StoreRow = (String, String, String, Option<String>, i64);

/// `SQLite`-backed memory service.
pub struct SqliteMemoryService {
    conn: Connection,
    extractor: StrategyExtractor,
}

impl SqliteMemoryService {
    /// Open (and migrate) the service database from config.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> MemoryResult<Self> {
        Self::open(&config.sqlite_path).await
    }

    /// Open (and migrate) the service database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS memory_stores (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL,
                    status TEXT NOT NULL,
                    failure_reason TEXT,
                    event_expiry_days INTEGER NOT NULL,
                    strategies_json TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS memory_events (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL,
                    store_id TEXT NOT NULL,
                    actor_id TEXT NOT NULL,
                    session_id TEXT NOT NULL,
                    ts INTEGER NOT NULL,
                    messages_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_memory_events_actor
                    ON memory_events (store_id, actor_id, session_id, seq);
                CREATE TABLE IF NOT EXISTS memory_records (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    store_id TEXT NOT NULL,
                    namespace TEXT NOT NULL,
                    strategy TEXT NOT NULL,
                    text TEXT NOT NULL,
                    ts INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_memory_records_namespace
                    ON memory_records (store_id, namespace);",
            )?;
            Ok(())
        })
        .await?;

        let extractor = StrategyExtractor::new()
            .map_err(|err| MemoryError::InvalidConfig(err.to_string()))?;
        Ok(Self { conn, extractor })
    }

    async fn load_strategies(&self, store_id: &StoreId) -> MemoryResult<Vec<StrategyConfig>> {
        let id = store_id.to_string();
        let json = self
            .conn
            .call(move |conn| {
                let json = conn
                    .query_row(
                        "SELECT strategies_json FROM memory_stores WHERE id = ?1",
                        rusqlite::params![id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(json)
            })
            .await?;
        let json = json.ok_or_else(|| MemoryError::StoreNotFound(store_id.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn timestamp(millis: i64) -> MemoryResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| MemoryError::Service(format!("invalid timestamp {millis}")))
}

fn summary_from_row(row: StoreRow) -> MemoryResult<StoreSummary> {
    let (id, name, status, failure_reason, created_at) = row;
    let status = StoreStatus::from_str(&status)
        .map_err(|value| MemoryError::Service(format!("invalid store status: {value}")))?;
    Ok(StoreSummary {
        id: StoreId::new(id),
        name,
        status,
        failure_reason,
        created_at: timestamp(created_at)?,
    })
}

fn read_store_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl MemoryService for SqliteMemoryService {
    fn list_stores(&self) -> ServiceFuture<'_, MemoryResult<Vec<StoreSummary>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(|conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, name, status, failure_reason, created_at
                         FROM memory_stores
                         ORDER BY created_at, id",
                    )?;
                    let rows = stmt
                        .query_map([], read_store_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;
            rows.into_iter().map(summary_from_row).collect()
        })
    }

    fn create_store(
        &self,
        request: CreateStoreRequest,
    ) -> ServiceFuture<'_, MemoryResult<StoreSummary>> {
        Box::pin(async move {
            let suffix = Uuid::new_v4().simple().to_string();
            let id = format!("{}-{}", request.name, &suffix[..10]);
            let strategies_json = serde_json::to_string(&request.strategies)?;
            let now = Utc::now();
            let created_at = now.timestamp_millis();

            let insert_id = id.clone();
            let name = request.name.clone();
            let inserted = self
                .conn
                .call(move |conn| {
                    let result = conn.execute(
                        "INSERT INTO memory_stores
                         (id, name, description, status, failure_reason, event_expiry_days, strategies_json, created_at)
                         VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7)",
                        rusqlite::params![
                            insert_id,
                            name,
                            request.description,
                            StoreStatus::Active.as_str(),
                            request.event_expiry_days,
                            strategies_json,
                            created_at
                        ],
                    );
                    match result {
                        Ok(_) => Ok(true),
                        Err(err) if is_unique_violation(&err) => Ok(false),
                        Err(err) => Err(err.into()),
                    }
                })
                .await?;

            if !inserted {
                debug!(name = %request.name, "Store name already taken");
                return Err(MemoryError::AlreadyExists { name: request.name });
            }

            Ok(StoreSummary {
                id: StoreId::new(id),
                name: request.name,
                status: StoreStatus::Active,
                failure_reason: None,
                created_at: timestamp(created_at)?,
            })
        })
    }

    fn get_store(&self, store_id: StoreId) -> ServiceFuture<'_, MemoryResult<StoreSummary>> {
        Box::pin(async move {
            let id = store_id.to_string();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            "SELECT id, name, status, failure_reason, created_at
                             FROM memory_stores WHERE id = ?1",
                            rusqlite::params![id],
                            read_store_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;
            let row = row.ok_or_else(|| MemoryError::StoreNotFound(store_id.to_string()))?;
            summary_from_row(row)
        })
    }

    fn delete_store(&self, store_id: StoreId) -> ServiceFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            let id = store_id.to_string();
            let deleted = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let deleted =
                        tx.execute("DELETE FROM memory_stores WHERE id = ?1", rusqlite::params![id])?;
                    tx.execute("DELETE FROM memory_events WHERE store_id = ?1", rusqlite::params![id])?;
                    tx.execute("DELETE FROM memory_records WHERE store_id = ?1", rusqlite::params![id])?;
                    tx.commit()?;
                    Ok(deleted)
                })
                .await?;
            if deleted == 0 {
                return Err(MemoryError::StoreNotFound(store_id.to_string()));
            }
            Ok(())
        })
    }

    fn list_strategies(
        &self,
        store_id: StoreId,
    ) -> ServiceFuture<'_, MemoryResult<Vec<StrategyConfig>>> {
        Box::pin(async move { self.load_strategies(&store_id).await })
    }

    fn create_event(&self, event: NewEvent) -> ServiceFuture<'_, MemoryResult<Event>> {
        Box::pin(async move {
            event.validate()?;
            let strategies = self.load_strategies(&event.store_id).await?;

            let mut records = Vec::new();
            for strategy in &strategies {
                let Some(template) = strategy.primary_namespace() else {
                    continue;
                };
                let namespace = namespace_for(template, &event.actor);
                for text in self.extractor.extract(strategy.kind, &event.messages) {
                    records.push((namespace.clone(), strategy.kind.as_str(), text));
                }
            }

            let stored = Event {
                id: EventId::new(),
                store_id: event.store_id,
                actor: event.actor,
                session: event.session,
                timestamp: Utc::now(),
                messages: event.messages,
            };
            let messages_json = serde_json::to_string(&stored.messages)?;
            let row = (
                stored.id.to_string(),
                stored.store_id.to_string(),
                stored.actor.to_string(),
                stored.session.to_string(),
                stored.timestamp.timestamp_millis(),
            );

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let (id, store_id, actor_id, session_id, ts) = row;
                    tx.execute(
                        "INSERT INTO memory_events
                         (id, store_id, actor_id, session_id, ts, messages_json)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![id, store_id, actor_id, session_id, ts, messages_json],
                    )?;
                    {
                        let mut stmt = tx.prepare(
                            "INSERT INTO memory_records (store_id, namespace, strategy, text, ts)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                        )?;
                        for (namespace, strategy, text) in records {
                            stmt.execute(rusqlite::params![store_id, namespace, strategy, text, ts])?;
                        }
                    }
                    tx.commit()?;
                    Ok(())
                })
                .await?;

            Ok(stored)
        })
    }

    fn list_events(&self, query: EventQuery) -> ServiceFuture<'_, MemoryResult<Vec<Event>>> {
        Box::pin(async move {
            let store_id = query.store_id.to_string();
            let actor = query.actor.to_string();
            let session = query.session.to_string();
            let limit = i64::try_from(query.max_results)
                .map_err(|_| MemoryError::InvalidEvent("max_results exceeds i64".to_string()))?;
            let now = Utc::now();

            let rows = self
                .conn
                .call(move |conn| {
                    let expiry_days = conn
                        .query_row(
                            "SELECT event_expiry_days FROM memory_stores WHERE id = ?1",
                            rusqlite::params![store_id],
                            |row| row.get::<_, i64>(0),
                        )
                        .optional()?;
                    let Some(expiry_days) = expiry_days else {
                        return Ok(None);
                    };
                    let cutoff = (now - ChronoDuration::days(expiry_days)).timestamp_millis();
                    let mut stmt = conn.prepare(
                        "SELECT id, ts, messages_json
                         FROM memory_events
                         WHERE store_id = ?1 AND actor_id = ?2 AND session_id = ?3 AND ts >= ?4
                         ORDER BY seq DESC
                         LIMIT ?5",
                    )?;
                    let rows = stmt
                        .query_map(
                            rusqlite::params![store_id, actor, session, cutoff, limit],
                            |row| {
                                let id: String = row.get(0)?;
                                let ts: i64 = row.get(1)?;
                                let messages: String = row.get(2)?;
                                Ok((id, ts, messages))
                            },
                        )?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(Some(rows))
                })
                .await?;

            let mut rows =
                rows.ok_or_else(|| MemoryError::StoreNotFound(query.store_id.to_string()))?;
            rows.reverse();

            let mut events = Vec::with_capacity(rows.len());
            for (id, ts, messages) in rows {
                let messages: Vec<EventMessage> = serde_json::from_str(&messages)?;
                events.push(Event {
                    id: id.parse().map_err(|err| {
                        MemoryError::Service(format!("invalid event id: {err}"))
                    })?,
                    store_id: query.store_id.clone(),
                    actor: query.actor.clone(),
                    session: query.session.clone(),
                    timestamp: timestamp(ts)?,
                    messages,
                });
            }
            Ok(events)
        })
    }

    fn retrieve_records(
        &self,
        query: RecordQuery,
    ) -> ServiceFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        Box::pin(async move {
            let store_id = query.store_id.to_string();
            let namespace = query.namespace.clone();
            let candidates = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT text, seq FROM memory_records
                         WHERE store_id = ?1 AND namespace = ?2",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![store_id, namespace], |row| {
                            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            Ok(rank(&query.query, candidates, query.top_k)
                .into_iter()
                .map(|(text, score)| MemoryRecord {
                    namespace: query.namespace.clone(),
                    text,
                    score,
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::ids::{ActorId, SessionId};
    use crate::memory::core::strategy::default_strategies;

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("market_memory_{}.sqlite", Uuid::new_v4()))
    }

    fn request(name: &str) -> CreateStoreRequest {
        CreateStoreRequest {
            name: name.to_string(),
            description: "test".to_string(),
            strategies: default_strategies(),
            event_expiry_days: 90,
        }
    }

    #[tokio::test]
    async fn second_connection_sees_conflict() {
        let path = temp_db();
        let first = SqliteMemoryService::open(&path).await.unwrap();
        let second = SqliteMemoryService::open(&path).await.unwrap();

        let created = first.create_store(request("Market")).await.unwrap();
        let err = second.create_store(request("Market")).await.unwrap_err();
        assert!(err.is_already_exists());

        let listed = second.list_stores().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn events_round_trip_with_strategy_records() {
        let path = temp_db();
        let service = SqliteMemoryService::open(&path).await.unwrap();
        let store = service.create_store(request("Market")).await.unwrap();
        let actor = ActorId::new("broker_tim_dunk");
        let session = SessionId::new("market-1");

        service
            .create_event(NewEvent {
                store_id: store.id.clone(),
                actor: actor.clone(),
                session: session.clone(),
                messages: vec![
                    EventMessage::user("I'm interested in tech stocks with a moderate risk tolerance"),
                    EventMessage::assistant("Understood."),
                ],
            })
            .await
            .unwrap();

        let events = service
            .list_events(EventQuery {
                store_id: store.id.clone(),
                actor,
                session,
                max_results: 10,
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].messages.len(), 2);

        let strategies = service.list_strategies(store.id.clone()).await.unwrap();
        assert_eq!(strategies, default_strategies());

        let records = service
            .retrieve_records(RecordQuery {
                store_id: store.id,
                namespace: "market-trends/broker/broker_tim_dunk/semantic".to_string(),
                query: "tech stocks".to_string(),
                top_k: 3,
            })
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn missing_store_is_reported() {
        let path = temp_db();
        let service = SqliteMemoryService::open(&path).await.unwrap();
        let err = service
            .list_strategies(StoreId::new("Market-missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::StoreNotFound(_)));
        assert!(matches!(
            service.delete_store(StoreId::new("Market-missing")).await,
            Err(MemoryError::StoreNotFound(_))
        ));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn only_unique_constraints_count_as_conflicts() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT NOT NULL UNIQUE)")
            .unwrap();
        conn.execute("INSERT INTO t (name) VALUES ('Market')", []).unwrap();

        let duplicate = conn
            .execute("INSERT INTO t (name) VALUES ('Market')", [])
            .unwrap_err();
        assert!(is_unique_violation(&duplicate));

        let missing = conn
            .execute("INSERT INTO t (name) VALUES (NULL)", [])
            .unwrap_err();
        assert!(!is_unique_violation(&missing));
    }
}
