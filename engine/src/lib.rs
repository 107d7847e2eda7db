//! # Fae Engine — Core Library
//!
//! Fae is a deterministic smart-contract execution substrate whose one
//! organizing idea is *scarcity by construction*: value-bearing objects
//! (escrows) are held linearly inside contracts, move only by being
//! returned across a call boundary, and cannot be forged or duplicated.
//! There is no native token and no gas; a transaction's own return value
//! is informational and worth nothing; only escrows carry value.
//!
//! This crate is the transaction execution engine. Given a transaction
//! request and the current storage, it dispatches the input contracts in
//! order, threads their results into the body under the trust discipline,
//! tracks every escrow creation, transfer, and closure, commits outputs
//! with correct versioning and nonces, and leaves behind an auditable
//! record, poisoned but readable if anything failed.
//!
//! ## Architecture
//!
//! The modules mirror the layers of the engine, leaves first:
//!
//! - **crypto** — SHA3-256 digests and Ed25519 signer identities.
//! - **ids** — contract, transaction, entry, and version identifiers,
//!   with their parsers and printers.
//! - **value** — the dynamic value model: nominal type tags over
//!   structural trees, bridged to Rust types by [`FaeValue`].
//! - **escrow** — linear escrow references, maps, and the traversal that
//!   enforces the transfer discipline.
//! - **runtime** — the contract coroutine (`release`/`spend` as an
//!   explicit state machine) and the ambient call context.
//! - **storage** — the transaction-entry map with typed, nonce-checked
//!   path access.
//! - **transaction** — `run_transaction` itself.
//! - **display** — the audit rendering, which doubles as the engine's
//!   determinism witness.
//!
//! ## Design Ground Rules
//!
//! 1. Deterministic or broken: no clocks, no RNG, no hash-randomized
//!    iteration anywhere in the execution path.
//! 2. Failures poison, they never half-commit. Storage after a failed
//!    transaction differs by exactly one (poisoned) entry.
//! 3. Every error names the contract, index, type, or nonce it is about.
//! 4. If it moves value, it has tests.

pub mod crypto;
pub mod display;
pub mod error;
pub mod escrow;
pub mod ids;
pub mod runtime;
pub mod storage;
pub mod transaction;
pub mod value;

pub use crypto::{Digest, Keypair, PublicKey};
pub use display::show_transaction;
pub use error::{EngineError, EscrowError, InputError, StorageError};
pub use escrow::{EscrowId, EscrowPath};
pub use ids::{ContractId, ContractRef, EntryId, ShortContractId, TransactionId, VersionId};
pub use runtime::{contract_fn, one_shot, CallCtx, ContractCode, Outcome, Step};
pub use storage::{OutputSlot, Storage, StoredContract, TransactionEntry};
pub use transaction::{run_transaction, InputArg, InputTuple, Reward, TxRequest};
pub use value::{Dynamic, FaeValue, TypeTag, Value};
