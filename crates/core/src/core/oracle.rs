//! Decision oracles.
//!
//! [`DecisionOracle`] is the seam the adapter talks through. The built-in
//! [`KLevelOracle`] is a compact recursive reasoner:
//!
//! - tier 0 keeps an exponentially weighted estimate of how often the
//!   opponent hunts the stag and best-responds to it;
//! - tier `k > 0` simulates the opponent at every tier `0..k` (each simulated
//!   opponent is itself a `KLevelOracle` on the other side of the matrix),
//!   keeps a posterior over which of those tiers the opponent really is, and
//!   best-responds to the posterior-weighted prediction.
//!
//! Simulated opponents choose stochastically (a logistic choice rule on the
//! payoff advantage); the oracle's own decision is the greedy best response,
//! with hare on an exact tie.

use std::fmt;

use crate::mind::{BeliefState, OracleError, Prior, Tier};
use crate::payoff::{Choice, PayoffMatrix, Player};

/// Learning rate of the tier-0 stag-rate estimate.
const VOLATILITY: f64 = 0.3;
/// Softness of the simulated opponents' choice rule.
const TEMPERATURE: f64 = 1.0;
/// Floor on observation likelihoods so one surprise cannot zero a tier.
const MIN_LIKELIHOOD: f64 = 1e-3;

pub trait DecisionOracle: fmt::Debug {
    /// Observe the opponent's latest choice and return our own.
    fn respond(&mut self, signal: Choice) -> Result<Choice, OracleError>;

    fn beliefs(&self) -> BeliefState;
}

#[derive(Debug, Clone)]
pub struct KLevelOracle {
    tier: Tier,
    player: Player,
    payoff: PayoffMatrix,
    /// Tier 0: estimated opponent stag rate.
    stag_rate: f64,
    /// Tier k: posterior over opponent tiers `0..k`.
    beliefs: Vec<f64>,
    /// Tier k: the opponent simulated at each tier `0..k`.
    models: Vec<KLevelOracle>,
    last_own: Option<Choice>,
}

impl KLevelOracle {
    pub fn new(payoff: PayoffMatrix, player: Player, tier: Tier, prior: Prior) -> Self {
        let models = Tier::all()
            .take_while(|t| *t < tier)
            .map(|t| KLevelOracle::new(payoff.clone(), player.opponent(), t, Prior::weighted(t)))
            .collect();
        Self {
            tier,
            player,
            payoff,
            stag_rate: 0.5,
            beliefs: prior.into_weights(),
            models,
            last_own: None,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn player(&self) -> Player {
        self.player
    }

    /// Probability that the opponent hunts the stag on the next round.
    pub fn predict_opponent_stag(&self) -> f64 {
        if self.models.is_empty() {
            return self.stag_rate;
        }
        self.beliefs
            .iter()
            .zip(&self.models)
            .map(|(b, m)| b * m.stag_probability())
            .sum()
    }

    /// Probability that this agent hunts the stag under the logistic rule.
    pub fn stag_probability(&self) -> f64 {
        let adv = self
            .payoff
            .stag_advantage(self.player, self.predict_opponent_stag());
        logistic(adv / TEMPERATURE)
    }

    fn choose(&self) -> Choice {
        let adv = self
            .payoff
            .stag_advantage(self.player, self.predict_opponent_stag());
        if adv > 0.0 {
            Choice::Stag
        } else {
            Choice::Hare
        }
    }

    /// Update on the opponent's choice for the round just played.
    fn learn(&mut self, opponent: Choice) {
        // The simulated opponents first see what we did last round.
        if let Some(own) = self.last_own {
            for m in &mut self.models {
                m.learn(own);
            }
        }

        if self.models.is_empty() {
            let x = if opponent == Choice::Stag { 1.0 } else { 0.0 };
            self.stag_rate += VOLATILITY * (x - self.stag_rate);
        } else {
            for (b, m) in self.beliefs.iter_mut().zip(&self.models) {
                let p = m.stag_probability();
                let lik = match opponent {
                    Choice::Stag => p,
                    Choice::Hare => 1.0 - p,
                };
                *b *= lik.max(MIN_LIKELIHOOD);
            }
            let total: f64 = self.beliefs.iter().sum();
            if total > 0.0 && total.is_finite() {
                for b in &mut self.beliefs {
                    *b /= total;
                }
            }
        }

        for m in &mut self.models {
            m.last_own = Some(opponent);
        }
    }
}

impl DecisionOracle for KLevelOracle {
    fn respond(&mut self, signal: Choice) -> Result<Choice, OracleError> {
        self.learn(signal);
        let choice = self.choose();
        self.last_own = Some(choice);
        Ok(choice)
    }

    fn beliefs(&self) -> BeliefState {
        BeliefState {
            opponent_tiers: self.beliefs.clone(),
            opponent_stag: self.predict_opponent_stag(),
        }
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle(k: u8) -> KLevelOracle {
        let tier = Tier::new(k).unwrap();
        KLevelOracle::new(PayoffMatrix::stag_hunt(), Player::Col, tier, Prior::weighted(tier))
    }

    #[test]
    fn tier_zero_follows_a_stag_signal() {
        let mut o = oracle(0);
        // 0.5 -> 0.65, above the 3/5 indifference point.
        assert_eq!(o.respond(Choice::Stag).unwrap(), Choice::Stag);
        // 0.65 -> 0.455.
        assert_eq!(o.respond(Choice::Hare).unwrap(), Choice::Hare);
    }

    #[test]
    fn tier_zero_starts_cautious() {
        let mut o = oracle(0);
        assert_eq!(o.respond(Choice::Hare).unwrap(), Choice::Hare);
        assert!(o.beliefs().opponent_tiers.is_empty());
        assert!((o.beliefs().opponent_stag - 0.35).abs() < 1e-12);
    }

    #[test]
    fn nested_models_play_the_other_side() {
        let o = oracle(3);
        assert_eq!(o.models.len(), 3);
        for (lvl, m) in o.models.iter().enumerate() {
            assert_eq!(m.tier().level() as usize, lvl);
            assert_eq!(m.player(), Player::Row);
            for inner in &m.models {
                assert_eq!(inner.player(), Player::Col);
            }
        }
    }

    #[test]
    fn posterior_stays_normalised() {
        let mut o = oracle(2);
        assert_eq!(o.beliefs().opponent_tiers, vec![0.3, 0.7]);
        let signals = [
            Choice::Stag,
            Choice::Hare,
            Choice::Stag,
            Choice::Stag,
            Choice::Hare,
            Choice::Stag,
        ];
        for s in signals {
            o.respond(s).unwrap();
            let b = o.beliefs();
            assert!(b.validate().is_ok(), "{b:?}");
        }
    }

    #[test]
    fn same_history_same_decisions() {
        let mut a = oracle(4);
        let mut b = oracle(4);
        let signals = [Choice::Stag, Choice::Stag, Choice::Hare, Choice::Stag];
        for s in signals {
            assert_eq!(a.respond(s).unwrap(), b.respond(s).unwrap());
        }
        assert_eq!(a.beliefs(), b.beliefs());
    }

    #[test]
    fn tier_two_comes_round_to_a_persistent_stag_hunter() {
        let mut o = oracle(2);
        let decisions: Vec<Choice> = (0..12).map(|_| o.respond(Choice::Stag).unwrap()).collect();
        assert_eq!(decisions[0], Choice::Hare);
        assert_eq!(*decisions.last().unwrap(), Choice::Stag);
    }
}
