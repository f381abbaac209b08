//! Reading the human's intent from how their distances to the prey change.
//!
//! The inferred goal is the target the human closed in on fastest between two
//! snapshots (most negative delta). Equal deltas resolve in target-id order
//! `r1 < r2 < s1`, so a human who stays put reads as going for the first hare.

use serde::{Deserialize, Serialize};
use staghunt::payoff::Choice;

use crate::entities::{EntityId, Positions};
use crate::maze::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetId {
    #[serde(rename = "r1")]
    Hare1,
    #[serde(rename = "r2")]
    Hare2,
    #[serde(rename = "s1")]
    Stag,
}

impl TargetId {
    /// In target-id order, which is also the tie-break order.
    pub const ALL: [TargetId; 3] = [TargetId::Hare1, TargetId::Hare2, TargetId::Stag];

    pub fn entity(self) -> EntityId {
        match self {
            TargetId::Hare1 => EntityId::Hare1,
            TargetId::Hare2 => EntityId::Hare2,
            TargetId::Stag => EntityId::Stag,
        }
    }

    pub fn tag(self) -> &'static str {
        self.entity().tag()
    }

    pub fn is_primary(self) -> bool {
        self == TargetId::Stag
    }

    /// Hares read as 0, the stag as 1.
    pub fn pursuit_signal(self) -> Choice {
        if self.is_primary() {
            Choice::Stag
        } else {
            Choice::Hare
        }
    }
}

/// Straight-line distance from the human to every target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceSnapshot {
    #[serde(rename = "r1")]
    pub hare1: f64,
    #[serde(rename = "r2")]
    pub hare2: f64,
    #[serde(rename = "s1")]
    pub stag: f64,
}

impl DistanceSnapshot {
    pub fn measure(from: Cell, positions: &Positions) -> Self {
        Self {
            hare1: from.dist(positions.hare1),
            hare2: from.dist(positions.hare2),
            stag: from.dist(positions.stag),
        }
    }

    pub fn get(&self, t: TargetId) -> f64 {
        match t {
            TargetId::Hare1 => self.hare1,
            TargetId::Hare2 => self.hare2,
            TargetId::Stag => self.stag,
        }
    }

    pub fn scaled(&self, k: f64) -> Self {
        Self {
            hare1: self.hare1 * k,
            hare2: self.hare2 * k,
            stag: self.stag * k,
        }
    }
}

pub fn infer_goal(prev: &DistanceSnapshot, curr: &DistanceSnapshot) -> TargetId {
    let mut best = TargetId::ALL[0];
    let mut best_delta = f64::INFINITY;
    for t in TargetId::ALL {
        let delta = curr.get(t) - prev.get(t);
        // Strict: earlier ids keep ties.
        if delta < best_delta {
            best = t;
            best_delta = delta;
        }
    }
    best
}

pub fn infer_signal(prev: &DistanceSnapshot, curr: &DistanceSnapshot) -> Choice {
    infer_goal(prev, curr).pursuit_signal()
}
