//! Choices, players and the two-player payoff structure.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A pursuit signal: which kind of prey an agent is going after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Choice {
    Hare = 0,
    Stag = 1,
}

impl Choice {
    pub const ALL: [Choice; 2] = [Choice::Hare, Choice::Stag];

    pub fn as_str(self) -> &'static str {
        match self {
            Choice::Hare => "hare",
            Choice::Stag => "stag",
        }
    }

    fn idx(self) -> usize {
        self as usize
    }
}

/// Which side of the matrix an agent plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Player {
    Row,
    Col,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Player::Row => Player::Col,
            Player::Col => Player::Row,
        }
    }
}

/// Payoffs indexed `[row_choice][col_choice]` for each player.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PayoffMatrix {
    pub name: String,
    pub row: [[f64; 2]; 2],
    pub col: [[f64; 2]; 2],
}

impl PayoffMatrix {
    /// Classic stag hunt: a hare always pays 3, the stag pays 5 only when
    /// both hunters commit to it and 0 to a lone stag hunter.
    pub fn stag_hunt() -> Self {
        Self {
            name: "staghunt".to_string(),
            row: [[3.0, 3.0], [0.0, 5.0]],
            col: [[3.0, 0.0], [3.0, 5.0]],
        }
    }

    pub fn payoff(&self, player: Player, own: Choice, other: Choice) -> f64 {
        match player {
            Player::Row => self.row[own.idx()][other.idx()],
            Player::Col => self.col[other.idx()][own.idx()],
        }
    }

    /// Expected payoff of `own` when the opponent hunts stag with probability
    /// `p_other_stag`.
    pub fn expected(&self, player: Player, own: Choice, p_other_stag: f64) -> f64 {
        let p = p_other_stag.clamp(0.0, 1.0);
        p * self.payoff(player, own, Choice::Stag) + (1.0 - p) * self.payoff(player, own, Choice::Hare)
    }

    /// `E[stag] - E[hare]` for `player` against the given opponent stag rate.
    pub fn stag_advantage(&self, player: Player, p_other_stag: f64) -> f64 {
        self.expected(player, Choice::Stag, p_other_stag)
            - self.expected(player, Choice::Hare, p_other_stag)
    }

    pub fn is_finite(&self) -> bool {
        self.row.iter().chain(self.col.iter()).flatten().all(|v| v.is_finite())
    }
}

impl Default for PayoffMatrix {
    fn default() -> Self {
        Self::stag_hunt()
    }
}
