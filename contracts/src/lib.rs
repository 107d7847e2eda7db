//! # Fae Reference Contracts
//!
//! Contracts written against the engine's public API, exercising it the
//! way user code actually will. Two primitives:
//!
//! - **Mint** — issues escrow-backed coins, one per call, releasing a
//!   continuation that keeps issuing. The canonical "value enters the
//!   system" contract.
//! - **Swap** — a two-party exchange: each side deposits a coin, each
//!   side walks away with the other's. Three calls, three transactions,
//!   no moment at which either coin has two owners or none.
//!
//! ## Design Principles
//!
//! 1. A contract's argument and return types are fixed at publication, so
//!    multi-phase protocols speak one payment type throughout:
//!    [`Payment`], a (usually singleton) list of coins.
//! 2. Nothing here touches engine internals. If a reference contract
//!    needs a private hook, the engine API is wrong.
//! 3. Every flow that moves a coin has a test proving where the coin
//!    ended up, and a test proving where it didn't.

pub mod mint;
pub mod swap;

pub use mint::{publish_mint, redeem, Coin, Payment};
pub use swap::publish_swap;
