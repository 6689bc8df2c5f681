//! SQLite-backed store
//!
//! Discord snowflakes are `u64`; SQLite integers are signed, so ids are
//! stored bit-cast to `i64` and cast back on read.

use super::{HistoryStore, ScheduleStore};
use crate::error::TrackerError;
use crate::types::{
    DatedSnapshot, PlayerKey, RankSnapshot, RegisteredPlayer, RiotId, Schedule, ScheduleSpec,
    ScheduleStatus, ServerId, Tier, UserId,
};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use tracing::info;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = include_str!("schema.sql");

const PLAYER_COLUMNS: &str =
    "server_id, discord_id, riot_id, summoner_id, local_id, registered_at";
const SCHEDULE_COLUMNS: &str =
    "server_id, local_id, schedule_time, channel_id, created_by, period, output_format, status";
const SNAPSHOT_COLUMNS: &str = "fetch_date, tier, division, points, wins, losses, observed_at";

/// Create a connection pool. `:memory:` gets a single shared connection so
/// every caller sees the same database.
pub fn create_pool(database_path: &str) -> crate::error::Result<DbPool> {
    let (manager, max_size) = if database_path == ":memory:" {
        (SqliteConnectionManager::memory(), 1)
    } else {
        (SqliteConnectionManager::file(database_path), 8)
    };

    r2d2::Pool::builder()
        .max_size(max_size)
        .build(manager)
        .context("Failed to create database connection pool")
}

/// Store over a pooled SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply the schema
    pub fn open(database_path: &str) -> crate::error::Result<Self> {
        let store = Self {
            pool: create_pool(database_path)?,
        };
        store.initialize()?;
        info!("Opened rank history database at {}", database_path);
        Ok(store)
    }

    pub fn in_memory() -> crate::error::Result<Self> {
        Self::open(":memory:")
    }

    fn initialize(&self) -> crate::error::Result<()> {
        self.conn()?
            .execute_batch(SCHEMA)
            .context("Failed to apply database schema")
    }

    fn conn(&self) -> crate::error::Result<DbConn> {
        self.pool
            .get()
            .context("Failed to get database connection from pool")
    }
}

fn id_to_sql(id: u64) -> i64 {
    id as i64
}

fn id_from_sql(id: i64) -> u64 {
    id as u64
}

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<RegisteredPlayer> {
    let riot_id: String = row.get(2)?;
    let local_id: i64 = row.get(4)?;
    Ok(RegisteredPlayer {
        server_id: id_from_sql(row.get(0)?),
        discord_id: id_from_sql(row.get(1)?),
        riot_id: RiotId::parse(&riot_id).map_err(|e| conversion_error(2, e))?,
        summoner_id: row.get(3)?,
        local_id: local_id as u32,
        registered_at: row.get(5)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<DatedSnapshot> {
    let tier: String = row.get(1)?;
    let division: Option<String> = row.get(2)?;
    let observed_at: DateTime<Utc> = row.get(6)?;

    Ok(DatedSnapshot {
        date: row.get(0)?,
        snapshot: RankSnapshot::new(
            tier.parse::<Tier>().map_err(|e| conversion_error(1, e))?,
            division.and_then(|d| d.parse().ok()),
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            observed_at,
        ),
    })
}

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    let local_id: i64 = row.get(1)?;
    let period: String = row.get(5)?;
    let format: String = row.get(6)?;
    let status: String = row.get(7)?;

    Ok(Schedule {
        server_id: id_from_sql(row.get(0)?),
        local_id: local_id as u32,
        time: row.get(2)?,
        channel_id: id_from_sql(row.get(3)?),
        created_by: id_from_sql(row.get(4)?),
        period: period.parse().map_err(|e| conversion_error(5, e))?,
        format: format.parse().map_err(|e| conversion_error(6, e))?,
        status: status.parse().map_err(|e| conversion_error(7, e))?,
    })
}

/// Renumber a server's rows `1..=n` in insertion order
fn reindex(tx: &Transaction<'_>, table: &str, order: &str, server_id: ServerId) -> rusqlite::Result<()> {
    let ids: Vec<i64> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT id FROM {} WHERE server_id = ?1 ORDER BY {}",
            table, order
        ))?;
        let rows = stmt.query_map(params![id_to_sql(server_id)], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    for (index, id) in ids.iter().enumerate() {
        tx.execute(
            &format!("UPDATE {} SET local_id = ?1 WHERE id = ?2", table),
            params![index as i64 + 1, id],
        )?;
    }
    Ok(())
}

fn next_local_id(tx: &Transaction<'_>, table: &str, server_id: ServerId) -> rusqlite::Result<i64> {
    let max: Option<i64> = tx.query_row(
        &format!("SELECT MAX(local_id) FROM {} WHERE server_id = ?1", table),
        params![id_to_sql(server_id)],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0) + 1)
}

impl HistoryStore for SqliteStore {
    fn register_player(
        &self,
        server_id: ServerId,
        discord_id: UserId,
        riot_id: &RiotId,
        summoner_id: Option<&str>,
    ) -> crate::error::Result<RegisteredPlayer> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let riot_text = riot_id.to_string();

        let updated = tx
            .execute(
                "UPDATE players SET summoner_id = ?4
                 WHERE server_id = ?1 AND discord_id = ?2 AND riot_id = ?3",
                params![id_to_sql(server_id), id_to_sql(discord_id), riot_text, summoner_id],
            )
            .context("Failed to update player")?;

        if updated == 0 {
            let local_id = next_local_id(&tx, "players", server_id)
                .context("Failed to allocate player local id")?;
            tx.execute(
                "INSERT INTO players (server_id, discord_id, riot_id, summoner_id, local_id, registered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id_to_sql(server_id),
                    id_to_sql(discord_id),
                    riot_text,
                    summoner_id,
                    local_id,
                    Utc::now()
                ],
            )
            .context("Failed to insert player")?;
        }

        let player = tx
            .query_row(
                &format!(
                    "SELECT {} FROM players WHERE server_id = ?1 AND discord_id = ?2 AND riot_id = ?3",
                    PLAYER_COLUMNS
                ),
                params![id_to_sql(server_id), id_to_sql(discord_id), riot_text],
                player_from_row,
            )
            .context("Failed to read registered player")?;

        tx.commit().context("Failed to commit registration")?;
        Ok(player)
    }

    fn players(&self, server_id: Option<ServerId>) -> crate::error::Result<Vec<RegisteredPlayer>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM players WHERE ?1 IS NULL OR server_id = ?1
                 ORDER BY server_id, local_id",
                PLAYER_COLUMNS
            ))
            .context("Failed to prepare player query")?;

        let rows = stmt
            .query_map(params![server_id.map(id_to_sql)], player_from_row)
            .context("Failed to query players")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read players")
    }

    fn find_player(
        &self,
        server_id: ServerId,
        riot_id: &RiotId,
    ) -> crate::error::Result<Option<RegisteredPlayer>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM players WHERE server_id = ?1 AND riot_id = ?2
                 ORDER BY local_id LIMIT 1",
                PLAYER_COLUMNS
            ),
            params![id_to_sql(server_id), riot_id.to_string()],
            player_from_row,
        )
        .optional()
        .context("Failed to query player")
    }

    fn remove_player(&self, server_id: ServerId, local_id: u32) -> crate::error::Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let removed = tx
            .execute(
                "DELETE FROM players WHERE server_id = ?1 AND local_id = ?2",
                params![id_to_sql(server_id), local_id],
            )
            .context("Failed to delete player")?;
        if removed > 0 {
            reindex(&tx, "players", "registered_at ASC, id ASC", server_id)
                .context("Failed to reindex players")?;
        }

        tx.commit().context("Failed to commit player removal")?;
        Ok(removed > 0)
    }

    fn record_snapshot(
        &self,
        key: &PlayerKey,
        date: NaiveDate,
        snapshot: &RankSnapshot,
    ) -> crate::error::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO rank_history
                (server_id, discord_id, riot_id, fetch_date, tier, division, points, wins, losses, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (server_id, discord_id, riot_id, fetch_date) DO UPDATE SET
                tier = excluded.tier,
                division = excluded.division,
                points = excluded.points,
                wins = excluded.wins,
                losses = excluded.losses,
                observed_at = excluded.observed_at",
            params![
                id_to_sql(key.server_id),
                id_to_sql(key.discord_id),
                key.riot_id,
                date,
                snapshot.tier.name(),
                snapshot.division.map(|d| d.roman()),
                snapshot.points,
                snapshot.wins,
                snapshot.losses,
                snapshot.observed_at
            ],
        )
        .context("Failed to record snapshot")?;
        Ok(())
    }

    fn history(
        &self,
        key: &PlayerKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> crate::error::Result<Vec<DatedSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM rank_history
                 WHERE server_id = ?1 AND discord_id = ?2 AND riot_id = ?3
                   AND fetch_date BETWEEN ?4 AND ?5
                 ORDER BY fetch_date ASC",
                SNAPSHOT_COLUMNS
            ))
            .context("Failed to prepare history query")?;

        let rows = stmt
            .query_map(
                params![
                    id_to_sql(key.server_id),
                    id_to_sql(key.discord_id),
                    key.riot_id,
                    start,
                    end
                ],
                snapshot_from_row,
            )
            .context("Failed to query history")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read history")
    }

    fn history_since(
        &self,
        key: &PlayerKey,
        start: NaiveDate,
    ) -> crate::error::Result<Vec<DatedSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM rank_history
                 WHERE server_id = ?1 AND discord_id = ?2 AND riot_id = ?3
                   AND fetch_date >= ?4
                 ORDER BY fetch_date ASC",
                SNAPSHOT_COLUMNS
            ))
            .context("Failed to prepare history query")?;

        let rows = stmt
            .query_map(
                params![
                    id_to_sql(key.server_id),
                    id_to_sql(key.discord_id),
                    key.riot_id,
                    start
                ],
                snapshot_from_row,
            )
            .context("Failed to query history")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read history")
    }
}

impl SqliteStore {
    fn require_schedule(&self, server_id: ServerId, local_id: u32) -> crate::error::Result<Schedule> {
        self.schedule(server_id, local_id)?
            .ok_or_else(|| TrackerError::ScheduleNotFound { local_id }.into())
    }
}

impl ScheduleStore for SqliteStore {
    fn add_schedule(
        &self,
        server_id: ServerId,
        created_by: UserId,
        spec: &ScheduleSpec,
    ) -> crate::error::Result<Schedule> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let local_id = next_local_id(&tx, "schedules", server_id)
            .context("Failed to allocate schedule local id")?;
        tx.execute(
            "INSERT INTO schedules
                (server_id, local_id, schedule_time, channel_id, created_by, period, output_format, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id_to_sql(server_id),
                local_id,
                spec.time,
                id_to_sql(spec.channel_id),
                id_to_sql(created_by),
                spec.period.as_str(),
                spec.format.as_str(),
                ScheduleStatus::Enabled.as_str()
            ],
        )
        .context("Failed to insert schedule")?;
        tx.commit().context("Failed to commit schedule")?;

        Ok(Schedule {
            server_id,
            local_id: local_id as u32,
            time: spec.time,
            channel_id: spec.channel_id,
            created_by,
            period: spec.period,
            format: spec.format,
            status: ScheduleStatus::Enabled,
        })
    }

    fn schedules(&self, server_id: Option<ServerId>) -> crate::error::Result<Vec<Schedule>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM schedules WHERE ?1 IS NULL OR server_id = ?1
                 ORDER BY server_id, local_id",
                SCHEDULE_COLUMNS
            ))
            .context("Failed to prepare schedule query")?;

        let rows = stmt
            .query_map(params![server_id.map(id_to_sql)], schedule_from_row)
            .context("Failed to query schedules")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read schedules")
    }

    fn schedule(
        &self,
        server_id: ServerId,
        local_id: u32,
    ) -> crate::error::Result<Option<Schedule>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM schedules WHERE server_id = ?1 AND local_id = ?2",
                SCHEDULE_COLUMNS
            ),
            params![id_to_sql(server_id), local_id],
            schedule_from_row,
        )
        .optional()
        .context("Failed to query schedule")
    }

    fn update_schedule(
        &self,
        server_id: ServerId,
        local_id: u32,
        spec: &ScheduleSpec,
    ) -> crate::error::Result<Schedule> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE schedules
                 SET schedule_time = ?3, channel_id = ?4, period = ?5, output_format = ?6
                 WHERE server_id = ?1 AND local_id = ?2",
                params![
                    id_to_sql(server_id),
                    local_id,
                    spec.time,
                    id_to_sql(spec.channel_id),
                    spec.period.as_str(),
                    spec.format.as_str()
                ],
            )
            .context("Failed to update schedule")?;

        if updated == 0 {
            return Err(TrackerError::ScheduleNotFound { local_id }.into());
        }
        self.require_schedule(server_id, local_id)
    }

    fn set_schedule_status(
        &self,
        server_id: ServerId,
        local_id: u32,
        status: ScheduleStatus,
    ) -> crate::error::Result<Schedule> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE schedules SET status = ?3 WHERE server_id = ?1 AND local_id = ?2",
                params![id_to_sql(server_id), local_id, status.as_str()],
            )
            .context("Failed to update schedule status")?;

        if updated == 0 {
            return Err(TrackerError::ScheduleNotFound { local_id }.into());
        }
        self.require_schedule(server_id, local_id)
    }

    fn delete_schedule(&self, server_id: ServerId, local_id: u32) -> crate::error::Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let removed = tx
            .execute(
                "DELETE FROM schedules WHERE server_id = ?1 AND local_id = ?2",
                params![id_to_sql(server_id), local_id],
            )
            .context("Failed to delete schedule")?;
        if removed > 0 {
            reindex(&tx, "schedules", "id ASC", server_id)
                .context("Failed to reindex schedules")?;
        }

        tx.commit().context("Failed to commit schedule removal")?;
        Ok(removed > 0)
    }
}
