use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::scoring::models::{RecordScope, StatRecord};
use crate::shared::AppError;

use super::models::{OrphanGroup, TableCounts};

/// Storage collaborator for the validator and repair procedure. The core
/// never talks to a database directly; everything flows through this trait.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn get_aggregate(&self, player_id: &str) -> Result<Option<StatRecord>, AppError>;

    async fn get_details(&self, player_id: &str) -> Result<Vec<StatRecord>, AppError>;

    /// Overwrites the given counters on the aggregate row in one atomic
    /// write. Implementations must not apply a partial update.
    async fn write_aggregate(
        &self,
        player_id: &str,
        totals: &BTreeMap<String, i64>,
    ) -> Result<(), AppError>;

    /// Player ids, most recently active first.
    async fn list_players(&self, limit: usize) -> Result<Vec<String>, AppError>;

    /// Detail rows whose player has no aggregate row, grouped by player id.
    async fn orphaned_details(&self) -> Result<Vec<OrphanGroup>, AppError>;

    /// Detail rows whose map id has no dimension row, grouped by map id.
    async fn unknown_map_details(&self) -> Result<Vec<OrphanGroup>, AppError>;

    async fn table_counts(&self) -> Result<TableCounts, AppError>;
}

/// In-memory implementation of StatsRepository for development and testing
///
/// Data is stored in memory and lost on restart. Player ordering follows
/// insertion order of aggregates, newest first, standing in for the
/// last-join-date ordering of the real store.
#[derive(Default)]
pub struct InMemoryStatsRepository {
    inner: RwLock<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    aggregates: HashMap<String, StatRecord>,
    details: HashMap<String, Vec<StatRecord>>,
    known_maps: Vec<String>,
    // newest first
    activity: Vec<String>,
}

impl InMemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_aggregate(&self, record: StatRecord) {
        let mut state = self.inner.write().await;
        let player_id = record.player_id.clone();
        state.activity.retain(|id| id != &player_id);
        state.activity.insert(0, player_id.clone());
        state.aggregates.insert(player_id, record);
    }

    pub async fn insert_detail(&self, record: StatRecord) {
        let mut state = self.inner.write().await;
        state
            .details
            .entry(record.player_id.clone())
            .or_default()
            .push(record);
    }

    pub async fn register_map(&self, map_id: impl Into<String>) {
        let mut state = self.inner.write().await;
        let map_id = map_id.into();
        if !state.known_maps.contains(&map_id) {
            state.known_maps.push(map_id);
        }
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn get_aggregate(&self, player_id: &str) -> Result<Option<StatRecord>, AppError> {
        let state = self.inner.read().await;
        Ok(state.aggregates.get(player_id).cloned())
    }

    async fn get_details(&self, player_id: &str) -> Result<Vec<StatRecord>, AppError> {
        let state = self.inner.read().await;
        Ok(state.details.get(player_id).cloned().unwrap_or_default())
    }

    async fn write_aggregate(
        &self,
        player_id: &str,
        totals: &BTreeMap<String, i64>,
    ) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        let aggregate = state.aggregates.get_mut(player_id).ok_or_else(|| {
            AppError::NotFound(format!("no aggregate record for player {player_id}"))
        })?;
        for (field, total) in totals {
            aggregate.counters.insert(field.clone(), *total as f64);
        }
        Ok(())
    }

    async fn list_players(&self, limit: usize) -> Result<Vec<String>, AppError> {
        let state = self.inner.read().await;
        Ok(state.activity.iter().take(limit).cloned().collect())
    }

    async fn orphaned_details(&self) -> Result<Vec<OrphanGroup>, AppError> {
        let state = self.inner.read().await;
        let mut groups: Vec<OrphanGroup> = state
            .details
            .iter()
            .filter(|(player_id, _)| !state.aggregates.contains_key(*player_id))
            .map(|(player_id, records)| OrphanGroup {
                key: player_id.clone(),
                session_count: records.len() as i64,
            })
            .collect();
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(groups)
    }

    async fn unknown_map_details(&self) -> Result<Vec<OrphanGroup>, AppError> {
        let state = self.inner.read().await;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for records in state.details.values() {
            for record in records {
                if let RecordScope::Map(map_id) = &record.scope {
                    if !state.known_maps.contains(map_id) {
                        *counts.entry(map_id.clone()).or_default() += 1;
                    }
                }
            }
        }
        Ok(counts
            .into_iter()
            .map(|(key, session_count)| OrphanGroup { key, session_count })
            .collect())
    }

    async fn table_counts(&self) -> Result<TableCounts, AppError> {
        let state = self.inner.read().await;
        Ok(TableCounts {
            aggregates: state.aggregates.len() as i64,
            details: state.details.values().map(|v| v.len() as i64).sum(),
            maps: state.known_maps.len() as i64,
        })
    }
}

/// Postgres-backed repository. Stat counters live in JSONB `data` columns so
/// the core stays schema-oblivious; `stats_users` holds one aggregate row per
/// player, `stats_map_users` one row per map session, `map_info` the map
/// dimension.
pub struct PostgresStatsRepository {
    pool: PgPool,
}

impl PostgresStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatsRepository for PostgresStatsRepository {
    async fn get_aggregate(&self, player_id: &str) -> Result<Option<StatRecord>, AppError> {
        let row = sqlx::query("SELECT data FROM stats_users WHERE steamid = $1")
            .bind(player_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| AppError::Repository(err.to_string()))?;

        Ok(row.map(|row| {
            let data: serde_json::Value = row.get("data");
            StatRecord::from_json(player_id, RecordScope::Lifetime, &data)
        }))
    }

    async fn get_details(&self, player_id: &str) -> Result<Vec<StatRecord>, AppError> {
        let rows = sqlx::query("SELECT mapid, data FROM stats_map_users WHERE steamid = $1")
            .bind(player_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| AppError::Repository(err.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let map_id: String = row.get("mapid");
                let data: serde_json::Value = row.get("data");
                StatRecord::from_json(player_id, RecordScope::Map(map_id), &data)
            })
            .collect())
    }

    async fn write_aggregate(
        &self,
        player_id: &str,
        totals: &BTreeMap<String, i64>,
    ) -> Result<(), AppError> {
        let patch = serde_json::to_value(totals)
            .map_err(|err| AppError::Transaction(err.to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| AppError::Transaction(err.to_string()))?;

        // Row lock serializes concurrent repairs of the same player.
        let locked = sqlx::query("SELECT steamid FROM stats_users WHERE steamid = $1 FOR UPDATE")
            .bind(player_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|err| AppError::Transaction(err.to_string()))?;

        if locked.is_none() {
            return Err(AppError::NotFound(format!(
                "no aggregate record for player {player_id}"
            )));
        }

        sqlx::query("UPDATE stats_users SET data = data || $2::jsonb WHERE steamid = $1")
            .bind(player_id)
            .bind(patch)
            .execute(&mut *tx)
            .await
            .map_err(|err| AppError::Transaction(err.to_string()))?;

        tx.commit()
            .await
            .map_err(|err| AppError::Transaction(err.to_string()))
    }

    async fn list_players(&self, limit: usize) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query(
            "SELECT steamid FROM stats_users ORDER BY last_join_date DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| AppError::Repository(err.to_string()))?;

        Ok(rows.into_iter().map(|row| row.get("steamid")).collect())
    }

    async fn orphaned_details(&self) -> Result<Vec<OrphanGroup>, AppError> {
        let rows = sqlx::query(
            "SELECT smu.steamid AS key, COUNT(*) AS session_count \
             FROM stats_map_users smu \
             LEFT JOIN stats_users su ON smu.steamid = su.steamid \
             WHERE su.steamid IS NULL \
             GROUP BY smu.steamid \
             ORDER BY smu.steamid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| AppError::Repository(err.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| OrphanGroup {
                key: row.get("key"),
                session_count: row.get("session_count"),
            })
            .collect())
    }

    async fn unknown_map_details(&self) -> Result<Vec<OrphanGroup>, AppError> {
        let rows = sqlx::query(
            "SELECT smu.mapid AS key, COUNT(*) AS session_count \
             FROM stats_map_users smu \
             LEFT JOIN map_info mi ON smu.mapid = mi.mapid \
             WHERE mi.mapid IS NULL \
             GROUP BY smu.mapid \
             ORDER BY smu.mapid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| AppError::Repository(err.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| OrphanGroup {
                key: row.get("key"),
                session_count: row.get("session_count"),
            })
            .collect())
    }

    async fn table_counts(&self) -> Result<TableCounts, AppError> {
        let row = sqlx::query(
            "SELECT \
                (SELECT COUNT(*) FROM stats_users) AS aggregates, \
                (SELECT COUNT(*) FROM stats_map_users) AS details, \
                (SELECT COUNT(*) FROM map_info) AS maps",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|err| AppError::Repository(err.to_string()))?;

        Ok(TableCounts {
            aggregates: row.get("aggregates"),
            details: row.get("details"),
            maps: row.get("maps"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifetime(player_id: &str) -> StatRecord {
        StatRecord::new(player_id, RecordScope::Lifetime)
    }

    fn map_session(player_id: &str, map_id: &str) -> StatRecord {
        StatRecord::new(player_id, RecordScope::Map(map_id.to_string()))
    }

    #[tokio::test]
    async fn write_aggregate_overwrites_tracked_fields() {
        let repo = InMemoryStatsRepository::new();
        repo.insert_aggregate(
            lifetime("p1")
                .with_counter("common_kills", 50.0)
                .with_counter("heal_others", 3.0),
        )
        .await;

        let mut totals = BTreeMap::new();
        totals.insert("common_kills".to_string(), 45);
        repo.write_aggregate("p1", &totals).await.unwrap();

        let aggregate = repo.get_aggregate("p1").await.unwrap().unwrap();
        assert_eq!(aggregate.counter("common_kills"), 45.0);
        // Untracked fields untouched.
        assert_eq!(aggregate.counter("heal_others"), 3.0);
    }

    #[tokio::test]
    async fn write_aggregate_for_unknown_player_is_not_found() {
        let repo = InMemoryStatsRepository::new();
        let totals = BTreeMap::new();
        let err = repo.write_aggregate("ghost", &totals).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_players_is_most_recent_first_and_bounded() {
        let repo = InMemoryStatsRepository::new();
        repo.insert_aggregate(lifetime("old")).await;
        repo.insert_aggregate(lifetime("mid")).await;
        repo.insert_aggregate(lifetime("new")).await;

        let players = repo.list_players(2).await.unwrap();
        assert_eq!(players, ["new", "mid"]);
    }

    #[tokio::test]
    async fn orphan_checks_group_by_dangling_key() {
        let repo = InMemoryStatsRepository::new();
        repo.insert_aggregate(lifetime("known")).await;
        repo.register_map("c1m1").await;

        repo.insert_detail(map_session("known", "c1m1")).await;
        repo.insert_detail(map_session("ghost", "c1m1")).await;
        repo.insert_detail(map_session("ghost", "c9m9")).await;

        let orphans = repo.orphaned_details().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].key, "ghost");
        assert_eq!(orphans[0].session_count, 2);

        let unknown_maps = repo.unknown_map_details().await.unwrap();
        assert_eq!(unknown_maps.len(), 1);
        assert_eq!(unknown_maps[0].key, "c9m9");
        assert_eq!(unknown_maps[0].session_count, 1);
    }

    #[tokio::test]
    async fn table_counts_cover_all_three_tables() {
        let repo = InMemoryStatsRepository::new();
        repo.insert_aggregate(lifetime("p1")).await;
        repo.insert_detail(map_session("p1", "c1m1")).await;
        repo.insert_detail(map_session("p1", "c1m2")).await;
        repo.register_map("c1m1").await;

        let counts = repo.table_counts().await.unwrap();
        assert_eq!(counts.aggregates, 1);
        assert_eq!(counts.details, 2);
        assert_eq!(counts.maps, 1);
    }
}
