//! Player, rank history and schedule persistence
//!
//! Two storage traits with an in-memory implementation and a SQLite one.
//! Per-server local ids are always a dense `1..=n` sequence: removing an
//! entry renumbers the rest in creation order.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::TrackerError;
use crate::types::{
    DatedSnapshot, PlayerKey, RankSnapshot, RegisteredPlayer, RiotId, Schedule, ScheduleSpec,
    ScheduleStatus, ServerId, UserId,
};
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Trait for tracked players and their daily rank history
pub trait HistoryStore: Send + Sync {
    /// Register a player, or refresh the summoner id of an existing
    /// registration. New players get the next local id in their server.
    fn register_player(
        &self,
        server_id: ServerId,
        discord_id: UserId,
        riot_id: &RiotId,
        summoner_id: Option<&str>,
    ) -> crate::error::Result<RegisteredPlayer>;

    /// Registered players ordered by server then local id
    fn players(&self, server_id: Option<ServerId>) -> crate::error::Result<Vec<RegisteredPlayer>>;

    fn find_player(
        &self,
        server_id: ServerId,
        riot_id: &RiotId,
    ) -> crate::error::Result<Option<RegisteredPlayer>>;

    /// Remove by local id; `false` when no such player
    fn remove_player(&self, server_id: ServerId, local_id: u32) -> crate::error::Result<bool>;

    /// Store the day's snapshot, replacing any earlier one for that date
    fn record_snapshot(
        &self,
        key: &PlayerKey,
        date: NaiveDate,
        snapshot: &RankSnapshot,
    ) -> crate::error::Result<()>;

    /// Snapshots dated within `start..=end`, ascending
    fn history(
        &self,
        key: &PlayerKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> crate::error::Result<Vec<DatedSnapshot>>;

    /// Snapshots dated on or after `start`, ascending
    fn history_since(
        &self,
        key: &PlayerKey,
        start: NaiveDate,
    ) -> crate::error::Result<Vec<DatedSnapshot>> {
        self.history(key, start, NaiveDate::MAX)
    }
}

/// Trait for report schedules
pub trait ScheduleStore: Send + Sync {
    /// Create an enabled schedule with the next local id in its server
    fn add_schedule(
        &self,
        server_id: ServerId,
        created_by: UserId,
        spec: &ScheduleSpec,
    ) -> crate::error::Result<Schedule>;

    /// Schedules ordered by server then local id
    fn schedules(&self, server_id: Option<ServerId>) -> crate::error::Result<Vec<Schedule>>;

    fn schedule(
        &self,
        server_id: ServerId,
        local_id: u32,
    ) -> crate::error::Result<Option<Schedule>>;

    fn update_schedule(
        &self,
        server_id: ServerId,
        local_id: u32,
        spec: &ScheduleSpec,
    ) -> crate::error::Result<Schedule>;

    fn set_schedule_status(
        &self,
        server_id: ServerId,
        local_id: u32,
        status: ScheduleStatus,
    ) -> crate::error::Result<Schedule>;

    /// Delete by local id; `false` when no such schedule
    fn delete_schedule(&self, server_id: ServerId, local_id: u32) -> crate::error::Result<bool>;
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Registration order
    players: Vec<RegisteredPlayer>,
    history: HashMap<PlayerKey, BTreeMap<NaiveDate, RankSnapshot>>,
    /// Creation order
    schedules: Vec<Schedule>,
}

/// In-memory store for tests and development
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> crate::error::Result<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| {
            TrackerError::InternalError {
                message: "Failed to acquire store read lock".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> crate::error::Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| {
            TrackerError::InternalError {
                message: "Failed to acquire store write lock".to_string(),
            }
            .into()
        })
    }
}

fn next_local_id(ids: impl Iterator<Item = u32>) -> u32 {
    ids.max().unwrap_or(0) + 1
}

fn sorted_by_server<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (ServerId, u32),
{
    items.sort_by_key(|item| key(item));
    items
}

impl HistoryStore for InMemoryStore {
    fn register_player(
        &self,
        server_id: ServerId,
        discord_id: UserId,
        riot_id: &RiotId,
        summoner_id: Option<&str>,
    ) -> crate::error::Result<RegisteredPlayer> {
        let mut state = self.write()?;

        if let Some(existing) = state.players.iter_mut().find(|p| {
            p.server_id == server_id && p.discord_id == discord_id && &p.riot_id == riot_id
        }) {
            existing.summoner_id = summoner_id.map(str::to_string);
            return Ok(existing.clone());
        }

        let local_id = next_local_id(
            state
                .players
                .iter()
                .filter(|p| p.server_id == server_id)
                .map(|p| p.local_id),
        );
        let player = RegisteredPlayer {
            server_id,
            discord_id,
            riot_id: riot_id.clone(),
            summoner_id: summoner_id.map(str::to_string),
            local_id,
            registered_at: Utc::now(),
        };
        state.players.push(player.clone());
        Ok(player)
    }

    fn players(&self, server_id: Option<ServerId>) -> crate::error::Result<Vec<RegisteredPlayer>> {
        let state = self.read()?;
        let players = state
            .players
            .iter()
            .filter(|p| server_id.map_or(true, |id| p.server_id == id))
            .cloned()
            .collect();
        Ok(sorted_by_server(players, |p| (p.server_id, p.local_id)))
    }

    fn find_player(
        &self,
        server_id: ServerId,
        riot_id: &RiotId,
    ) -> crate::error::Result<Option<RegisteredPlayer>> {
        let state = self.read()?;
        Ok(state
            .players
            .iter()
            .find(|p| p.server_id == server_id && &p.riot_id == riot_id)
            .cloned())
    }

    fn remove_player(&self, server_id: ServerId, local_id: u32) -> crate::error::Result<bool> {
        let mut state = self.write()?;
        let before = state.players.len();
        state
            .players
            .retain(|p| !(p.server_id == server_id && p.local_id == local_id));
        if state.players.len() == before {
            return Ok(false);
        }

        for (index, player) in state
            .players
            .iter_mut()
            .filter(|p| p.server_id == server_id)
            .enumerate()
        {
            player.local_id = index as u32 + 1;
        }
        Ok(true)
    }

    fn record_snapshot(
        &self,
        key: &PlayerKey,
        date: NaiveDate,
        snapshot: &RankSnapshot,
    ) -> crate::error::Result<()> {
        let mut state = self.write()?;
        state
            .history
            .entry(key.clone())
            .or_default()
            .insert(date, snapshot.clone());
        Ok(())
    }

    fn history(
        &self,
        key: &PlayerKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> crate::error::Result<Vec<DatedSnapshot>> {
        if start > end {
            return Ok(Vec::new());
        }
        let state = self.read()?;
        Ok(state
            .history
            .get(key)
            .map(|entries| {
                entries
                    .range(start..=end)
                    .map(|(date, snapshot)| DatedSnapshot {
                        date: *date,
                        snapshot: snapshot.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl ScheduleStore for InMemoryStore {
    fn add_schedule(
        &self,
        server_id: ServerId,
        created_by: UserId,
        spec: &ScheduleSpec,
    ) -> crate::error::Result<Schedule> {
        let mut state = self.write()?;
        let local_id = next_local_id(
            state
                .schedules
                .iter()
                .filter(|s| s.server_id == server_id)
                .map(|s| s.local_id),
        );
        let schedule = Schedule {
            server_id,
            local_id,
            time: spec.time,
            channel_id: spec.channel_id,
            created_by,
            period: spec.period,
            format: spec.format,
            status: ScheduleStatus::Enabled,
        };
        state.schedules.push(schedule.clone());
        Ok(schedule)
    }

    fn schedules(&self, server_id: Option<ServerId>) -> crate::error::Result<Vec<Schedule>> {
        let state = self.read()?;
        let schedules = state
            .schedules
            .iter()
            .filter(|s| server_id.map_or(true, |id| s.server_id == id))
            .cloned()
            .collect();
        Ok(sorted_by_server(schedules, |s| (s.server_id, s.local_id)))
    }

    fn schedule(
        &self,
        server_id: ServerId,
        local_id: u32,
    ) -> crate::error::Result<Option<Schedule>> {
        let state = self.read()?;
        Ok(state
            .schedules
            .iter()
            .find(|s| s.server_id == server_id && s.local_id == local_id)
            .cloned())
    }

    fn update_schedule(
        &self,
        server_id: ServerId,
        local_id: u32,
        spec: &ScheduleSpec,
    ) -> crate::error::Result<Schedule> {
        let mut state = self.write()?;
        let schedule = state
            .schedules
            .iter_mut()
            .find(|s| s.server_id == server_id && s.local_id == local_id)
            .ok_or(TrackerError::ScheduleNotFound { local_id })?;

        schedule.time = spec.time;
        schedule.channel_id = spec.channel_id;
        schedule.period = spec.period;
        schedule.format = spec.format;
        Ok(schedule.clone())
    }

    fn set_schedule_status(
        &self,
        server_id: ServerId,
        local_id: u32,
        status: ScheduleStatus,
    ) -> crate::error::Result<Schedule> {
        let mut state = self.write()?;
        let schedule = state
            .schedules
            .iter_mut()
            .find(|s| s.server_id == server_id && s.local_id == local_id)
            .ok_or(TrackerError::ScheduleNotFound { local_id })?;

        schedule.status = status;
        Ok(schedule.clone())
    }

    fn delete_schedule(&self, server_id: ServerId, local_id: u32) -> crate::error::Result<bool> {
        let mut state = self.write()?;
        let before = state.schedules.len();
        state
            .schedules
            .retain(|s| !(s.server_id == server_id && s.local_id == local_id));
        if state.schedules.len() == before {
            return Ok(false);
        }

        for (index, schedule) in state
            .schedules
            .iter_mut()
            .filter(|s| s.server_id == server_id)
            .enumerate()
        {
            schedule.local_id = index as u32 + 1;
        }
        Ok(true)
    }
}
