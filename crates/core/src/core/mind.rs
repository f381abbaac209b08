//! Sophistication tiers, priors and the sequential oracle adapter.
//!
//! The adapter is the only way the game talks to a decision oracle. It takes
//! `&mut self` on every call, so a single adapter can never be driven from two
//! places at once; sharing one across concurrently running episodes is a
//! compile error rather than a silent corruption of its belief state.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::oracle::{DecisionOracle, KLevelOracle};
use crate::payoff::{Choice, PayoffMatrix, Player};

/// Tolerance used when checking that a distribution sums to one.
const MASS_EPS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    #[error("sophistication tier {0} is outside 0..={max}", max = Tier::MAX)]
    InvalidTier(u8),

    #[error("unrecognised sophistication tier {0:?}")]
    UnknownTier(String),

    #[error("prior has {got} entries but tier {tier} reasons about {expected} opponent tiers")]
    PriorLength { tier: u8, expected: usize, got: usize },

    #[error("prior is not a probability distribution: {0:?}")]
    InvalidPrior(Vec<f64>),

    #[error("payoff matrix contains non-finite values")]
    InvalidPayoff,

    /// The oracle's belief state no longer holds valid probabilities.
    #[error("belief state is invalid: {0}")]
    State(String),
}

/// Depth of recursive reasoning (`k` in k-ToM), `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Tier(u8);

impl Tier {
    pub const MAX: u8 = 4;

    pub fn new(level: u8) -> Result<Self, OracleError> {
        if level > Self::MAX {
            return Err(OracleError::InvalidTier(level));
        }
        Ok(Self(level))
    }

    pub fn all() -> impl Iterator<Item = Tier> {
        (0..=Self::MAX).map(Tier)
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier(2)
    }
}

impl TryFrom<u8> for Tier {
    type Error = OracleError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Tier::new(v)
    }
}

impl From<Tier> for u8 {
    fn from(t: Tier) -> u8 {
        t.0
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-ToM", self.0)
    }
}

impl FromStr for Tier {
    type Err = OracleError;

    /// Accepts `"2"`, `"2-ToM"` or `"2-TOM"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let digits = t
            .strip_suffix("-ToM")
            .or_else(|| t.strip_suffix("-TOM"))
            .or_else(|| t.strip_suffix("-tom"))
            .unwrap_or(t);
        let level: u8 = digits
            .parse()
            .map_err(|_| OracleError::UnknownTier(s.to_string()))?;
        Tier::new(level)
    }
}

/// Prior belief over the opponent's tier, one weight per tier below ours.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Prior(Vec<f64>);

impl Prior {
    /// 70% on the highest tier the agent can model, the rest spread evenly
    /// over the lower ones. Tier 2 gets `[0.3, 0.7]`.
    pub fn weighted(tier: Tier) -> Self {
        let k = tier.level() as usize;
        match k {
            0 => Prior(Vec::new()),
            1 => Prior(vec![1.0]),
            _ => {
                let low = 0.3 / (k - 1) as f64;
                let mut w = vec![low; k];
                w[k - 1] = 0.7;
                Prior(w)
            }
        }
    }

    pub fn new(tier: Tier, weights: Vec<f64>) -> Result<Self, OracleError> {
        let expected = tier.level() as usize;
        if weights.len() != expected {
            return Err(OracleError::PriorLength {
                tier: tier.level(),
                expected,
                got: weights.len(),
            });
        }
        if !is_distribution(&weights) {
            return Err(OracleError::InvalidPrior(weights));
        }
        Ok(Prior(weights))
    }

    pub fn weights(&self) -> &[f64] {
        &self.0
    }

    pub fn into_weights(self) -> Vec<f64> {
        self.0
    }
}

fn is_distribution(w: &[f64]) -> bool {
    if w.is_empty() {
        return true;
    }
    let all_valid = w.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p));
    all_valid && (w.iter().sum::<f64>() - 1.0).abs() <= MASS_EPS
}

/// Snapshot of what an oracle currently believes about its opponent.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BeliefState {
    /// Posterior over the opponent's tier (empty for tier 0).
    pub opponent_tiers: Vec<f64>,
    /// Predicted probability that the opponent hunts the stag next.
    pub opponent_stag: f64,
}

impl BeliefState {
    pub fn validate(&self) -> Result<(), OracleError> {
        if !self.opponent_stag.is_finite() || !(0.0..=1.0).contains(&self.opponent_stag) {
            return Err(OracleError::State(format!(
                "opponent stag probability {} is not in [0, 1]",
                self.opponent_stag
            )));
        }
        if !is_distribution(&self.opponent_tiers) {
            return Err(OracleError::State(format!(
                "tier posterior {:?} does not sum to one",
                self.opponent_tiers
            )));
        }
        Ok(())
    }
}

/// Boundary wrapper around a decision oracle.
///
/// Calls must arrive in the order the human's signals were observed; the
/// oracle's posterior after call `n` is the prior for call `n + 1`. Once the
/// belief state is found invalid the adapter stays poisoned and every later
/// call fails.
#[derive(Debug)]
pub struct MentalModelAdapter {
    payoff: PayoffMatrix,
    tier: Tier,
    oracle: Box<dyn DecisionOracle + Send>,
    calls: u64,
    poisoned: Option<OracleError>,
}

impl MentalModelAdapter {
    /// Build an adapter around the built-in level-k oracle playing the column
    /// side of `payoff`. `prior` defaults to [`Prior::weighted`].
    pub fn configure(
        payoff: PayoffMatrix,
        tier: Tier,
        prior: Option<Prior>,
    ) -> Result<Self, OracleError> {
        if !payoff.is_finite() {
            return Err(OracleError::InvalidPayoff);
        }
        let prior = match prior {
            Some(p) => Prior::new(tier, p.into_weights())?,
            None => Prior::weighted(tier),
        };
        let oracle = KLevelOracle::new(payoff.clone(), Player::Col, tier, prior);
        Ok(Self::with_oracle(payoff, tier, Box::new(oracle)))
    }

    /// Wrap an externally supplied oracle.
    pub fn with_oracle(
        payoff: PayoffMatrix,
        tier: Tier,
        oracle: Box<dyn DecisionOracle + Send>,
    ) -> Self {
        Self {
            payoff,
            tier,
            oracle,
            calls: 0,
            poisoned: None,
        }
    }

    /// Feed the human's latest pursuit signal and get the companion's decision.
    pub fn respond(&mut self, signal: Choice) -> Result<Choice, OracleError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        let decision = self.oracle.respond(signal).and_then(|d| {
            self.oracle.beliefs().validate()?;
            Ok(d)
        });
        match decision {
            Ok(d) => {
                self.calls += 1;
                Ok(d)
            }
            Err(e) => {
                self.poisoned = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn beliefs(&self) -> BeliefState {
        self.oracle.beliefs()
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn payoff(&self) -> &PayoffMatrix {
        &self.payoff
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }
}
