//! # staghunt
//!
//! The companion's mind for the maze stag hunt.
//!
//! This crate owns the decision side of the game: the payoff structure, the
//! sophistication tiers a companion can reason at, and the
//! [`MentalModelAdapter`](mind::MentalModelAdapter) that wraps a decision
//! oracle behind a strictly sequential `respond(signal) -> signal` contract.
//!
//! ## Quick Start
//!
//! ```
//! use staghunt::prelude::*;
//!
//! let mut mind = MentalModelAdapter::configure(
//!     PayoffMatrix::stag_hunt(),
//!     Tier::new(2).unwrap(),
//!     None,
//! )
//! .unwrap();
//!
//! let decision = mind.respond(Choice::Stag).unwrap();
//! assert!(matches!(decision, Choice::Stag | Choice::Hare));
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Enable serialization/deserialization
//!
//! ## Modules
//!
//! - [`payoff`]: Choices, players and the payoff matrix
//! - [`mind`]: Tiers, priors and the sequential adapter
//! - [`oracle`]: The oracle trait and the built-in level-k reasoner
//! - [`prng`]: Small deterministic PRNG

#[path = "core/payoff.rs"]
pub mod payoff;

#[path = "core/mind.rs"]
pub mod mind;

#[path = "core/oracle.rs"]
pub mod oracle;

#[path = "core/prng.rs"]
pub mod prng;

/// Prelude module for convenient imports.
///
/// ```
/// use staghunt::prelude::*;
/// ```
pub mod prelude {
    pub use crate::mind::{BeliefState, MentalModelAdapter, OracleError, Prior, Tier};
    pub use crate::oracle::{DecisionOracle, KLevelOracle};
    pub use crate::payoff::{Choice, PayoffMatrix, Player};
    pub use crate::prng::Prng;
}
