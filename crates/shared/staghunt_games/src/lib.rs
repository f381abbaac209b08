//! The maze side of the stag hunt: the grid, the planner the companion walks
//! with, intent inference over the human's moves, the turn loop and the
//! episode records it produces.

pub mod entities;
pub mod error;
pub mod intent;
pub mod maze;
pub mod planner;
pub mod record;
pub mod session;
pub mod sim;

pub use entities::{EntityId, Positions};
pub use error::GameError;
pub use intent::{infer_goal, infer_signal, DistanceSnapshot, TargetId};
pub use maze::{Cell, Direction, Grid, Move, WallMap};
pub use planner::{AStar, PathPlanner, PathTable};
pub use record::{
    Episode, EpisodeEnd, EpisodeRecorder, EpisodeStore, MemoryStore, SessionId, SessionIds,
    SessionMeta, SessionRecord, StoreError, TurnRecord,
};
pub use session::{run_session, run_session_with, SessionConfig, SessionReport};
pub use sim::{Frontend, GameLoop, Outcome, Payoffs, Phase, Scripted, Termination, TurnView};
