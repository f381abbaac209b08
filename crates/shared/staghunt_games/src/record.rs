//! Per-turn records, finished episodes and where they are kept.
//!
//! A turn is committed only after every step of it succeeded, so an episode
//! that aborts mid-turn holds exactly the turns that completed before the
//! failure.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use staghunt::mind::Tier;
use staghunt::payoff::Choice;
use thiserror::Error;

use crate::entities::Positions;
use crate::intent::{DistanceSnapshot, TargetId};
use crate::maze::{Move, WallMap};
use crate::sim::{Outcome, Payoffs};

pub type SessionId = u64;

/// Milliseconds since the Unix epoch; zero if the clock is before it.
pub fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// 1-based; turn 0 is the initial layout.
    pub turn: u32,
    /// Everyone's position after the turn resolved.
    pub positions: Positions,
    pub human_move: Move,
    pub distances: DistanceSnapshot,
    pub inferred_goal: TargetId,
    pub signal: Choice,
    pub decision: Choice,
    pub companion_target: TargetId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EpisodeEnd {
    Completed { outcome: Outcome, payoffs: Payoffs },
    Aborted { reason: String },
}

impl EpisodeEnd {
    pub fn is_completed(&self) -> bool {
        matches!(self, EpisodeEnd::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub session_id: SessionId,
    pub index: u32,
    pub seed: u64,
    pub tier: Tier,
    pub initial: Positions,
    pub map: WallMap,
    pub turns: Vec<TurnRecord>,
    /// `None` while the episode is still being played.
    #[serde(default)]
    pub end: Option<EpisodeEnd>,
    pub started_at_ms: u64,
    #[serde(default)]
    pub ended_at_ms: Option<u64>,
}

impl Episode {
    /// Positions after the last committed turn.
    pub fn last_positions(&self) -> Positions {
        self.turns.last().map(|t| t.positions).unwrap_or(self.initial)
    }
}

/// Append-only log of one episode's committed turns.
#[derive(Debug, Clone)]
pub struct EpisodeRecorder {
    episode: Episode,
}

impl EpisodeRecorder {
    pub fn begin(
        session_id: SessionId,
        index: u32,
        seed: u64,
        tier: Tier,
        initial: Positions,
        map: WallMap,
    ) -> Self {
        Self {
            episode: Episode {
                session_id,
                index,
                seed,
                tier,
                initial,
                map,
                turns: Vec::new(),
                end: None,
                started_at_ms: unix_ms(),
                ended_at_ms: None,
            },
        }
    }

    pub fn commit(&mut self, record: TurnRecord) {
        debug_assert_eq!(record.turn as usize, self.episode.turns.len() + 1);
        self.episode.turns.push(record);
    }

    pub fn turns(&self) -> &[TurnRecord] {
        &self.episode.turns
    }

    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    pub fn finish(mut self, end: EpisodeEnd) -> Episode {
        self.episode.end = Some(end);
        self.episode.ended_at_ms = Some(unix_ms());
        self.episode
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed record: {0}")]
    Format(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Format(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: SessionId,
    pub tier: Tier,
    pub episodes_planned: u32,
    pub started_at_ms: u64,
}

/// Everything persisted for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(flatten)]
    pub meta: SessionMeta,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl SessionRecord {
    pub fn new(meta: SessionMeta) -> Self {
        Self {
            meta,
            episodes: Vec::new(),
        }
    }
}

/// Monotonic session id allocator. Safe to share between concurrent
/// sessions; ids are never reused within a process.
#[derive(Debug)]
pub struct SessionIds {
    next: AtomicU64,
}

impl SessionIds {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Ids continue after the largest one already on record.
    pub fn starting_after(max: SessionId) -> Self {
        Self {
            next: AtomicU64::new(max.saturating_add(1)),
        }
    }

    pub fn allocate(&self) -> SessionId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for SessionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Where finished episodes go.
pub trait EpisodeStore {
    fn allocate_session_id(&mut self) -> Result<SessionId, StoreError>;

    /// Persist `episode` under its session. Called once per episode, in
    /// order, including for aborted episodes.
    fn append_episode(&mut self, meta: &SessionMeta, episode: &Episode) -> Result<(), StoreError>;
}

/// Keeps sessions in memory. Used by tests and as a scratch store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ids: SessionIds,
    sessions: Vec<SessionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    pub fn session(&self, id: SessionId) -> Option<&SessionRecord> {
        self.sessions.iter().find(|s| s.meta.id == id)
    }
}

impl EpisodeStore for MemoryStore {
    fn allocate_session_id(&mut self) -> Result<SessionId, StoreError> {
        Ok(self.ids.allocate())
    }

    fn append_episode(&mut self, meta: &SessionMeta, episode: &Episode) -> Result<(), StoreError> {
        if episode.session_id != meta.id {
            return Err(StoreError::Format(format!(
                "episode belongs to session {}, not {}",
                episode.session_id, meta.id
            )));
        }
        match self.sessions.iter_mut().find(|s| s.meta.id == meta.id) {
            Some(s) => s.episodes.push(episode.clone()),
            None => {
                let mut s = SessionRecord::new(meta.clone());
                s.episodes.push(episode.clone());
                self.sessions.push(s);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::Grid;

    fn sample_turn(turn: u32) -> TurnRecord {
        let positions = Positions::default();
        TurnRecord {
            turn,
            positions,
            human_move: Move::Stay,
            distances: DistanceSnapshot::measure(positions.human, &positions),
            inferred_goal: TargetId::Hare1,
            signal: Choice::Hare,
            decision: Choice::Hare,
            companion_target: TargetId::Hare1,
        }
    }

    fn recorder(session: SessionId) -> EpisodeRecorder {
        EpisodeRecorder::begin(
            session,
            0,
            7,
            Tier::default(),
            Positions::default(),
            Grid::generate(7, 7, 7).wall_map(),
        )
    }

    #[test]
    fn recorder_keeps_commit_order() {
        let mut r = recorder(1);
        r.commit(sample_turn(1));
        r.commit(sample_turn(2));
        assert_eq!(r.turns().len(), 2);
        let ep = r.finish(EpisodeEnd::Aborted {
            reason: "no path".into(),
        });
        assert_eq!(ep.turns.iter().map(|t| t.turn).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!ep.end.as_ref().unwrap().is_completed());
        assert!(ep.ended_at_ms.is_some());
    }

    #[test]
    fn last_positions_fall_back_to_initial() {
        let r = recorder(1);
        assert_eq!(r.episode().last_positions(), Positions::default());
    }

    #[test]
    fn session_ids_continue_after_max() {
        let ids = SessionIds::starting_after(41);
        assert_eq!(ids.allocate(), 42);
        assert_eq!(ids.allocate(), 43);
        assert_eq!(SessionIds::new().allocate(), 1);
    }

    #[test]
    fn session_ids_are_unique_across_threads() {
        let ids = std::sync::Arc::new(SessionIds::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.allocate()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<SessionId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn memory_store_groups_episodes_by_session() {
        let mut store = MemoryStore::new();
        let id = store.allocate_session_id().unwrap();
        let meta = SessionMeta {
            id,
            tier: Tier::default(),
            episodes_planned: 2,
            started_at_ms: 0,
        };
        let ep = recorder(id).finish(EpisodeEnd::Aborted {
            reason: "cancelled".into(),
        });
        store.append_episode(&meta, &ep).unwrap();
        store.append_episode(&meta, &ep).unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.session(id).unwrap().episodes.len(), 2);

        let stray = recorder(id + 1).finish(EpisodeEnd::Aborted {
            reason: "x".into(),
        });
        assert!(matches!(
            store.append_episode(&meta, &stray),
            Err(StoreError::Format(_))
        ));
    }

    #[test]
    fn session_record_json_is_flat() {
        let meta = SessionMeta {
            id: 3,
            tier: Tier::new(4).unwrap(),
            episodes_planned: 1,
            started_at_ms: 10,
        };
        let json = serde_json::to_value(SessionRecord::new(meta.clone())).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["tier"], 4);
        assert!(json["episodes"].as_array().unwrap().is_empty());
        let back: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.meta, meta);
    }
}
