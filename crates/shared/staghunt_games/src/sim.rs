//! The turn loop.
//!
//! One turn walks the phases in a fixed order:
//!
//! ```text
//! AwaitingHumanMove -> Moved -> Inferring -> CompanionDeciding
//!     -> CompanionMoving -> Recorded -> (AwaitingHumanMove | Terminal)
//! ```
//!
//! An illegal move keeps the loop in `AwaitingHumanMove` and is re-requested
//! with nothing changed. Any other failure ends the episode in `Terminal`;
//! turns committed before it are kept, the failing turn is not recorded.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use staghunt::mind::MentalModelAdapter;
use staghunt::payoff::{Choice, PayoffMatrix, Player};
use tracing::{debug, warn};

use crate::entities::{EntityId, Positions};
use crate::error::GameError;
use crate::intent::{infer_goal, DistanceSnapshot, TargetId};
use crate::maze::{Grid, Move};
use crate::planner::{AStar, PathPlanner};
use crate::record::{Episode, EpisodeEnd, EpisodeRecorder, TurnRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingHumanMove,
    Moved,
    Inferring,
    CompanionDeciding,
    CompanionMoving,
    Recorded,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Both hunters stand on the stag.
    StagCaught,
    HareCaught { hunter: EntityId, hare: TargetId },
    TurnLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Payoffs {
    pub human: f64,
    pub companion: f64,
}

impl Outcome {
    /// Score the outcome with `matrix`. A hare catcher is scored as having
    /// chosen hare; the other hunter is scored on its last pursuit signal.
    pub fn payoffs(&self, matrix: &PayoffMatrix, human: Choice, companion: Choice) -> Payoffs {
        let score = |h: Choice, c: Choice| Payoffs {
            human: matrix.payoff(Player::Row, h, c),
            companion: matrix.payoff(Player::Col, c, h),
        };
        match self {
            Outcome::StagCaught => score(Choice::Stag, Choice::Stag),
            Outcome::HareCaught {
                hunter: EntityId::Human,
                ..
            } => score(Choice::Hare, companion),
            Outcome::HareCaught { .. } => score(human, Choice::Hare),
            Outcome::TurnLimit => Payoffs::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    pub max_turns: u32,
    /// End the episode as soon as a hunter catches something.
    pub stop_on_capture: bool,
}

impl Default for Termination {
    fn default() -> Self {
        Self {
            max_turns: 50,
            stop_on_capture: true,
        }
    }
}

/// What a frontend gets to see.
#[derive(Debug, Clone, Copy)]
pub struct TurnView<'a> {
    pub phase: Phase,
    /// Number of the turn about to be played (or just played, once terminal).
    pub turn: u32,
    pub grid: &'a Grid,
    pub positions: &'a Positions,
    pub legal: &'a [Move],
    pub last: Option<&'a TurnRecord>,
}

/// Human input and display.
pub trait Frontend {
    /// `None` means the human is gone (input closed or timed out).
    fn request_move(&mut self, view: &TurnView<'_>) -> Option<Move>;

    fn display(&mut self, view: &TurnView<'_>);

    fn rejected(&mut self, _err: &GameError) {}

    /// Called once per episode with how it ended.
    fn finished(&mut self, _episode: &Episode) {}
}

/// Plays a fixed list of moves, then reports the input as closed.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    moves: VecDeque<Move>,
    pub shown: usize,
    pub rejections: usize,
    pub episodes: usize,
}

impl Scripted {
    pub fn new(moves: impl IntoIterator<Item = Move>) -> Self {
        Self {
            moves: moves.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.moves.len()
    }
}

impl Frontend for Scripted {
    fn request_move(&mut self, _view: &TurnView<'_>) -> Option<Move> {
        self.moves.pop_front()
    }

    fn display(&mut self, _view: &TurnView<'_>) {
        self.shown += 1;
    }

    fn rejected(&mut self, _err: &GameError) {
        self.rejections += 1;
    }

    fn finished(&mut self, _episode: &Episode) {
        self.episodes += 1;
    }
}

/// One episode in progress.
///
/// The adapter is borrowed rather than owned so its beliefs carry over from
/// one episode to the next within a session.
pub struct GameLoop<'a, P: PathPlanner = AStar> {
    grid: Grid,
    positions: Positions,
    history: Vec<DistanceSnapshot>,
    mind: &'a mut MentalModelAdapter,
    planner: P,
    recorder: EpisodeRecorder,
    termination: Termination,
    phase: Phase,
    turn: u32,
    outcome: Option<Outcome>,
    abort: Option<String>,
}

impl<'a> GameLoop<'a, AStar> {
    pub fn new(
        grid: Grid,
        positions: Positions,
        mind: &'a mut MentalModelAdapter,
        recorder: EpisodeRecorder,
        termination: Termination,
    ) -> Result<Self, GameError> {
        Self::with_planner(grid, positions, mind, recorder, termination, AStar)
    }
}

impl<'a, P: PathPlanner> GameLoop<'a, P> {
    pub fn with_planner(
        grid: Grid,
        positions: Positions,
        mind: &'a mut MentalModelAdapter,
        recorder: EpisodeRecorder,
        termination: Termination,
        planner: P,
    ) -> Result<Self, GameError> {
        if termination.max_turns == 0 {
            return Err(GameError::InvalidConfig("max_turns must be at least 1".into()));
        }
        positions.validate(&grid)?;
        let history = vec![DistanceSnapshot::measure(positions.human, &positions)];
        Ok(Self {
            grid,
            positions,
            history,
            mind,
            planner,
            recorder,
            termination,
            phase: Phase::AwaitingHumanMove,
            turn: 0,
            outcome: None,
            abort: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed turns.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    /// Human distance snapshots; index 0 is the initial layout.
    pub fn history(&self) -> &[DistanceSnapshot] {
        &self.history
    }

    pub fn recorder(&self) -> &EpisodeRecorder {
        &self.recorder
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    fn view<'v>(&'v self, legal: &'v [Move]) -> TurnView<'v> {
        TurnView {
            phase: self.phase,
            turn: self.turn + u32::from(self.phase != Phase::Terminal),
            grid: &self.grid,
            positions: &self.positions,
            legal,
            last: self.recorder.turns().last(),
        }
    }

    /// Play one full turn. Returns the outcome once the episode is over.
    pub fn play_turn<F: Frontend + ?Sized>(
        &mut self,
        frontend: &mut F,
    ) -> Result<Option<Outcome>, GameError> {
        if self.phase == Phase::Terminal {
            return match (self.outcome, &self.abort) {
                (Some(outcome), _) => Ok(Some(outcome)),
                (None, Some(reason)) => Err(GameError::EpisodeOver(reason.clone())),
                (None, None) => Err(GameError::EpisodeOver("no outcome".into())),
            };
        }
        match self.step(frontend) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(turn = self.turn + 1, error = %e, "episode aborted");
                self.phase = Phase::Terminal;
                self.abort = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn step<F: Frontend + ?Sized>(&mut self, frontend: &mut F) -> Result<Option<Outcome>, GameError> {
        self.phase = Phase::AwaitingHumanMove;
        let from = self.positions.human;
        let legal = self.grid.legal_moves(from);
        frontend.display(&self.view(&legal));

        let mv = loop {
            let Some(mv) = frontend.request_move(&self.view(&legal)) else {
                return Err(GameError::Cancelled);
            };
            if legal.contains(&mv) {
                break mv;
            }
            let err = GameError::InvalidMove {
                at: from,
                attempted: mv,
                legal: legal.clone(),
            };
            warn!(turn = self.turn + 1, %mv, at = %from, "rejected move");
            frontend.rejected(&err);
        };

        self.phase = Phase::Moved;
        let to = match mv.direction() {
            Some(d) => self.grid.step(from, d)?,
            None => from,
        };
        self.positions.human = to;
        let snapshot = DistanceSnapshot::measure(to, &self.positions);
        let prev = self.history.last().copied().unwrap_or(snapshot);
        self.history.push(snapshot);

        self.phase = Phase::Inferring;
        let goal = infer_goal(&prev, &snapshot);
        let signal = goal.pursuit_signal();

        self.phase = Phase::CompanionDeciding;
        let decision = self.mind.respond(signal)?;
        let target = match decision {
            Choice::Stag => TargetId::Stag,
            Choice::Hare => self.positions.nearest_hare(self.positions.companion),
        };

        self.phase = Phase::CompanionMoving;
        self.grid.reroot(self.positions.target(target))?;
        let at = self.positions.companion;
        let table = self.planner.find_paths(&self.grid, at)?;
        if let Some(next) = table.next_step(&self.grid, at)? {
            self.positions.companion = next;
        }

        self.phase = Phase::Recorded;
        self.turn += 1;
        self.recorder.commit(TurnRecord {
            turn: self.turn,
            positions: self.positions,
            human_move: mv,
            distances: snapshot,
            inferred_goal: goal,
            signal,
            decision,
            companion_target: target,
        });
        debug!(
            turn = self.turn,
            %mv,
            goal = goal.tag(),
            signal = signal.as_str(),
            decision = decision.as_str(),
            human = %self.positions.human,
            companion = %self.positions.companion,
            "turn committed"
        );

        let outcome = self.check_termination();
        if let Some(o) = outcome {
            self.phase = Phase::Terminal;
            self.outcome = Some(o);
            frontend.display(&self.view(&[]));
        }
        Ok(outcome)
    }

    fn capture(&self) -> Option<Outcome> {
        let p = &self.positions;
        if p.human == p.stag && p.companion == p.stag {
            return Some(Outcome::StagCaught);
        }
        for hunter in [EntityId::Human, EntityId::Companion] {
            let at = p.get(hunter);
            for hare in [TargetId::Hare1, TargetId::Hare2] {
                if p.target(hare) == at {
                    return Some(Outcome::HareCaught { hunter, hare });
                }
            }
        }
        None
    }

    fn check_termination(&self) -> Option<Outcome> {
        if self.termination.stop_on_capture {
            if let Some(o) = self.capture() {
                return Some(o);
            }
        }
        (self.turn >= self.termination.max_turns).then_some(Outcome::TurnLimit)
    }

    /// Play turns until the episode terminates or fails.
    pub fn run<F: Frontend + ?Sized>(&mut self, frontend: &mut F) -> Result<Outcome, GameError> {
        loop {
            if let Some(outcome) = self.play_turn(frontend)? {
                return Ok(outcome);
            }
        }
    }

    /// Close the episode. An episode stopped before reaching a terminal
    /// condition is recorded as aborted.
    pub fn finish(self) -> Episode {
        let end = match (self.outcome, self.abort) {
            (Some(outcome), _) => {
                let last = self.recorder.turns().last();
                let human = last.map(|t| t.signal).unwrap_or(Choice::Hare);
                let companion = last.map(|t| t.decision).unwrap_or(Choice::Hare);
                EpisodeEnd::Completed {
                    outcome,
                    payoffs: outcome.payoffs(self.mind.payoff(), human, companion),
                }
            }
            (None, Some(reason)) => EpisodeEnd::Aborted { reason },
            (None, None) => EpisodeEnd::Aborted {
                reason: "stopped before termination".into(),
            },
        };
        self.recorder.finish(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::Cell;
    use crate::planner::PathTable;
    use staghunt::mind::{BeliefState, OracleError, Tier};
    use staghunt::oracle::DecisionOracle;

    fn mind(tier: u8) -> MentalModelAdapter {
        MentalModelAdapter::configure(PayoffMatrix::stag_hunt(), Tier::new(tier).unwrap(), None)
            .unwrap()
    }

    fn recorder(grid: &Grid, positions: Positions) -> EpisodeRecorder {
        EpisodeRecorder::begin(1, 0, 0, Tier::default(), positions, grid.wall_map())
    }

    fn endless(max_turns: u32) -> Termination {
        Termination {
            max_turns,
            stop_on_capture: false,
        }
    }

    #[derive(Debug)]
    struct AlwaysStag;

    impl DecisionOracle for AlwaysStag {
        fn respond(&mut self, _signal: Choice) -> Result<Choice, OracleError> {
            Ok(Choice::Stag)
        }

        fn beliefs(&self) -> BeliefState {
            BeliefState {
                opponent_tiers: vec![1.0],
                opponent_stag: 1.0,
            }
        }
    }

    #[derive(Debug)]
    struct Corrupt;

    impl DecisionOracle for Corrupt {
        fn respond(&mut self, _signal: Choice) -> Result<Choice, OracleError> {
            Err(OracleError::State("posterior went negative".into()))
        }

        fn beliefs(&self) -> BeliefState {
            BeliefState {
                opponent_tiers: vec![1.0],
                opponent_stag: 0.5,
            }
        }
    }

    /// Delegates to A* but fails on the `fail_on`-th call.
    struct FaultyPlanner {
        calls: u32,
        fail_on: u32,
    }

    impl PathPlanner for FaultyPlanner {
        fn find_paths(&mut self, grid: &Grid, start: Cell) -> Result<PathTable, GameError> {
            self.calls += 1;
            if self.calls == self.fail_on {
                return Err(GameError::NoPath {
                    from: start,
                    root: grid.root(),
                });
            }
            AStar.find_paths(grid, start)
        }
    }

    #[test]
    fn planner_failure_keeps_earlier_turns() {
        let grid = Grid::generate(7, 7, 5);
        let layout = Positions::default();
        let mut mind = mind(2);
        let mut game = GameLoop::with_planner(
            grid.clone(),
            layout,
            &mut mind,
            recorder(&grid, layout),
            endless(10),
            FaultyPlanner {
                calls: 0,
                fail_on: 3,
            },
        )
        .unwrap();
        let mut input = Scripted::new([Move::Stay; 10]);

        let err = game.run(&mut input).unwrap_err();
        assert!(matches!(err, GameError::NoPath { .. }));
        assert_eq!(game.phase(), Phase::Terminal);
        assert_eq!(game.recorder().turns().len(), 2);
        // Later turns report the original failure, not a cancellation.
        match game.play_turn(&mut input) {
            Err(GameError::EpisodeOver(reason)) => assert!(reason.starts_with("no path")),
            other => panic!("expected EpisodeOver, got {other:?}"),
        }
        assert_eq!(input.remaining(), 7);

        let ep = game.finish();
        assert_eq!(ep.turns.len(), 2);
        assert!(matches!(ep.end, Some(EpisodeEnd::Aborted { .. })));
    }

    #[test]
    fn illegal_move_is_requested_again() {
        let grid = Grid::arena(7, 7);
        let layout = Positions {
            human: Cell::new(0, 0),
            ..Positions::default()
        };
        let mut mind = mind(0);
        let mut game =
            GameLoop::new(grid.clone(), layout, &mut mind, recorder(&grid, layout), endless(5))
                .unwrap();
        let mut input = Scripted::new([Move::North, Move::West, Move::Stay]);

        assert_eq!(game.play_turn(&mut input).unwrap(), None);
        assert_eq!(input.rejections, 2);
        assert_eq!(game.turn(), 1);
        assert_eq!(game.positions().human, Cell::new(0, 0));
        assert_eq!(game.history().len(), 2);
        assert_eq!(game.recorder().turns()[0].human_move, Move::Stay);
        assert_eq!(game.phase(), Phase::Recorded);
    }

    #[test]
    fn closed_input_cancels_without_recording() {
        let grid = Grid::generate(7, 7, 1);
        let layout = Positions::default();
        let mut mind = mind(2);
        let mut game =
            GameLoop::new(grid.clone(), layout, &mut mind, recorder(&grid, layout), endless(5))
                .unwrap();
        let mut input = Scripted::new([]);

        assert!(matches!(game.run(&mut input), Err(GameError::Cancelled)));
        assert!(game.recorder().turns().is_empty());
        assert_eq!(game.history().len(), 1);
        match game.play_turn(&mut input) {
            Err(GameError::EpisodeOver(reason)) => {
                assert_eq!(reason, GameError::Cancelled.to_string())
            }
            other => panic!("expected EpisodeOver, got {other:?}"),
        }
    }

    #[test]
    fn runs_until_the_turn_limit() {
        let grid = Grid::generate(7, 7, 12);
        let layout = Positions::default();
        let mut mind = mind(2);
        let mut game =
            GameLoop::new(grid.clone(), layout, &mut mind, recorder(&grid, layout), endless(3))
                .unwrap();
        let mut input = Scripted::new([Move::Stay; 5]);

        assert_eq!(game.run(&mut input).unwrap(), Outcome::TurnLimit);
        assert_eq!(input.remaining(), 2);
        let ep = game.finish();
        assert_eq!(ep.turns.len(), 3);
        assert_eq!(
            ep.end,
            Some(EpisodeEnd::Completed {
                outcome: Outcome::TurnLimit,
                payoffs: Payoffs::default(),
            })
        );
        assert_eq!(mind.calls(), 3);
    }

    #[test]
    fn companion_walks_its_route_one_step_per_turn() {
        let grid = Grid::generate(7, 7, 33);
        let layout = Positions::default();
        let mut mind = mind(0);
        let mut game =
            GameLoop::new(grid.clone(), layout, &mut mind, recorder(&grid, layout), endless(4))
                .unwrap();
        let mut input = Scripted::new([Move::Stay; 4]);

        let mut at = layout.companion;
        for _ in 0..4 {
            game.play_turn(&mut input).unwrap();
            let rec = game.recorder().turns().last().unwrap().clone();
            // A tier-0 companion facing a human who never moves hunts hares.
            assert_eq!(rec.decision, Choice::Hare);
            assert_eq!(rec.companion_target, layout.nearest_hare(at));

            let mut expected = grid.clone();
            expected.reroot(layout.target(rec.companion_target)).unwrap();
            let want = expected.parent(at).unwrap_or(at);
            assert_eq!(rec.positions.companion, want);
            at = want;
        }
    }

    #[test]
    fn both_hunters_on_the_stag_end_the_episode() {
        let grid = Grid::arena(7, 7);
        let layout = Positions {
            hare1: Cell::new(6, 0),
            hare2: Cell::new(6, 1),
            stag: Cell::new(2, 5),
            human: Cell::new(2, 4),
            companion: Cell::new(2, 5),
        };
        let mut mind = MentalModelAdapter::with_oracle(
            PayoffMatrix::stag_hunt(),
            Tier::default(),
            Box::new(AlwaysStag),
        );
        let mut game = GameLoop::new(
            grid.clone(),
            layout,
            &mut mind,
            recorder(&grid, layout),
            Termination::default(),
        )
        .unwrap();
        let mut input = Scripted::new([Move::East]);

        assert_eq!(game.run(&mut input).unwrap(), Outcome::StagCaught);
        let ep = game.finish();
        assert_eq!(ep.turns[0].signal, Choice::Stag);
        match ep.end {
            Some(EpisodeEnd::Completed { payoffs, .. }) => {
                assert_eq!(payoffs.human, 5.0);
                assert_eq!(payoffs.companion, 5.0);
            }
            other => panic!("unexpected end {other:?}"),
        }
    }

    #[test]
    fn companion_grabbing_a_hare_ends_the_episode() {
        let grid = Grid::arena(7, 7);
        let layout = Positions::default();
        let mut mind = mind(0);
        let mut game = GameLoop::new(
            grid.clone(),
            layout,
            &mut mind,
            recorder(&grid, layout),
            Termination::default(),
        )
        .unwrap();
        let mut input = Scripted::new([Move::Stay]);

        assert_eq!(
            game.run(&mut input).unwrap(),
            Outcome::HareCaught {
                hunter: EntityId::Companion,
                hare: TargetId::Hare1,
            }
        );
        assert_eq!(game.positions().companion, layout.hare1);
        // Terminal state is shown once more after the turn.
        assert_eq!(input.shown, 2);
    }

    #[test]
    fn oracle_failure_aborts_before_commit() {
        let grid = Grid::generate(7, 7, 4);
        let layout = Positions::default();
        let mut mind = MentalModelAdapter::with_oracle(
            PayoffMatrix::stag_hunt(),
            Tier::default(),
            Box::new(Corrupt),
        );
        let mut game =
            GameLoop::new(grid.clone(), layout, &mut mind, recorder(&grid, layout), endless(5))
                .unwrap();
        let mut input = Scripted::new([Move::Stay; 3]);

        let err = game.run(&mut input).unwrap_err();
        assert!(matches!(err, GameError::OracleState(_)));
        assert!(err.ends_session());
        assert!(game.recorder().turns().is_empty());
        assert_eq!(game.positions().companion, layout.companion);
    }

    #[test]
    fn layout_outside_the_grid_is_rejected() {
        let grid = Grid::generate(4, 4, 1);
        let layout = Positions::default();
        let mut mind = mind(1);
        assert!(matches!(
            GameLoop::new(grid.clone(), layout, &mut mind, recorder(&grid, layout), endless(5)),
            Err(GameError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn payoffs_follow_the_matrix() {
        let m = PayoffMatrix::stag_hunt();
        let hare_by_human = Outcome::HareCaught {
            hunter: EntityId::Human,
            hare: TargetId::Hare2,
        };
        let p = hare_by_human.payoffs(&m, Choice::Stag, Choice::Stag);
        assert_eq!((p.human, p.companion), (3.0, 0.0));
        let p = Outcome::StagCaught.payoffs(&m, Choice::Hare, Choice::Hare);
        assert_eq!((p.human, p.companion), (5.0, 5.0));
    }
}
