//! A session: one companion mind playing a run of episodes against the same
//! human, each on a freshly generated maze.

use serde::{Deserialize, Serialize};
use staghunt::mind::{MentalModelAdapter, Prior, Tier};
use staghunt::payoff::PayoffMatrix;
use tracing::{error, info};

use crate::entities::Positions;
use crate::error::GameError;
use crate::maze::Grid;
use crate::planner::{AStar, PathPlanner};
use crate::record::{unix_ms, EpisodeEnd, EpisodeRecorder, EpisodeStore, SessionId, SessionMeta};
use crate::sim::{Frontend, GameLoop, Termination};

/// Added per episode so consecutive episodes get unrelated mazes.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

pub const MAX_SIDE: u32 = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub rows: u32,
    pub cols: u32,
    pub tier: Tier,
    pub episodes: u32,
    pub max_turns: u32,
    pub stop_on_capture: bool,
    pub seed: u64,
    pub layout: Positions,
    /// Weights over opponent tiers `0..tier`; the weighted default if unset.
    pub prior: Option<Vec<f64>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rows: 7,
            cols: 7,
            tier: Tier::default(),
            episodes: 1,
            max_turns: 50,
            stop_on_capture: true,
            seed: 0x5EED,
            layout: Positions::default(),
            prior: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), GameError> {
        let bad = |msg: String| Err(GameError::InvalidConfig(msg));
        if !(2..=MAX_SIDE).contains(&self.rows) || !(2..=MAX_SIDE).contains(&self.cols) {
            return bad(format!(
                "grid {}x{} must be between 2x2 and {MAX_SIDE}x{MAX_SIDE}",
                self.rows, self.cols
            ));
        }
        if self.episodes == 0 {
            return bad("episodes must be at least 1".into());
        }
        if self.max_turns == 0 {
            return bad("max_turns must be at least 1".into());
        }
        for (id, cell) in self.layout.iter() {
            if cell.row >= self.rows || cell.col >= self.cols {
                return bad(format!(
                    "{} at {cell} is outside the {}x{} grid",
                    id.tag(),
                    self.rows,
                    self.cols
                ));
            }
        }
        if self.layout.human == self.layout.companion {
            return bad("human and companion cannot start on the same cell".into());
        }
        self.prior()?;
        Ok(())
    }

    pub fn prior(&self) -> Result<Option<Prior>, GameError> {
        self.prior
            .clone()
            .map(|w| Prior::new(self.tier, w))
            .transpose()
            .map_err(GameError::invalid_config)
    }

    pub fn termination(&self) -> Termination {
        Termination {
            max_turns: self.max_turns,
            stop_on_capture: self.stop_on_capture,
        }
    }

    pub fn episode_seed(&self, index: u32) -> u64 {
        self.seed
            .wrapping_add(SEED_STRIDE.wrapping_mul(u64::from(index)))
    }
}

/// Parses `RxC`, e.g. `7x7`.
pub fn parse_size(s: &str) -> Result<(u32, u32), GameError> {
    let bad = || GameError::InvalidConfig(format!("size {s:?} is not ROWSxCOLS"));
    let (r, c) = s
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(bad)?;
    let rows = r.trim().parse().map_err(|_| bad())?;
    let cols = c.trim().parse().map_err(|_| bad())?;
    Ok((rows, cols))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub episodes: Vec<EpisodeEnd>,
    /// Why the session stopped before playing every episode.
    pub stopped_early: Option<String>,
}

impl SessionReport {
    pub fn completed(&self) -> usize {
        self.episodes.iter().filter(|e| e.is_completed()).count()
    }
}

/// Play every configured episode with the built-in level-k companion and A*.
pub fn run_session<F, S>(
    cfg: &SessionConfig,
    frontend: &mut F,
    store: &mut S,
) -> Result<SessionReport, GameError>
where
    F: Frontend + ?Sized,
    S: EpisodeStore + ?Sized,
{
    cfg.validate()?;
    let mut mind = MentalModelAdapter::configure(PayoffMatrix::stag_hunt(), cfg.tier, cfg.prior()?)
        .map_err(GameError::invalid_config)?;
    run_session_with(cfg, frontend, store, &mut mind, || AStar)
}

/// Play every configured episode, persisting each one as it ends.
///
/// `mind` serves the whole session so the companion keeps learning across
/// episodes; `planner` builds a fresh planner per episode. An episode that
/// aborts on a planner or bounds failure is stored and the next one starts;
/// a closed input or a broken mind stops the session. Store failures are
/// returned as errors.
pub fn run_session_with<F, S, P>(
    cfg: &SessionConfig,
    frontend: &mut F,
    store: &mut S,
    mind: &mut MentalModelAdapter,
    mut planner: impl FnMut() -> P,
) -> Result<SessionReport, GameError>
where
    F: Frontend + ?Sized,
    S: EpisodeStore + ?Sized,
    P: PathPlanner,
{
    cfg.validate()?;
    let tier = mind.tier();
    let meta = SessionMeta {
        id: store.allocate_session_id()?,
        tier,
        episodes_planned: cfg.episodes,
        started_at_ms: unix_ms(),
    };
    info!(session = meta.id, tier = %tier, episodes = cfg.episodes, "session started");

    let mut report = SessionReport {
        session_id: meta.id,
        episodes: Vec::with_capacity(cfg.episodes as usize),
        stopped_early: None,
    };

    for index in 0..cfg.episodes {
        let seed = cfg.episode_seed(index);
        let grid = Grid::generate(cfg.rows, cfg.cols, seed);
        let recorder =
            EpisodeRecorder::begin(meta.id, index, seed, tier, cfg.layout, grid.wall_map());
        let mut game = GameLoop::with_planner(
            grid,
            cfg.layout,
            &mut *mind,
            recorder,
            cfg.termination(),
            planner(),
        )?;
        let result = game.run(frontend);
        let episode = game.finish();

        store.append_episode(&meta, &episode)?;
        frontend.finished(&episode);
        if let Some(end) = &episode.end {
            report.episodes.push(end.clone());
        }

        match result {
            Ok(outcome) => info!(
                session = meta.id,
                episode = index,
                turns = episode.turns.len(),
                ?outcome,
                "episode finished"
            ),
            Err(e) if e.ends_session() => {
                error!(session = meta.id, episode = index, error = %e, "session stopped");
                report.stopped_early = Some(e.to_string());
                break;
            }
            Err(e) => error!(session = meta.id, episode = index, error = %e, "episode aborted"),
        }
    }

    info!(
        session = meta.id,
        played = report.episodes.len(),
        completed = report.completed(),
        "session ended"
    );
    Ok(report)
}
