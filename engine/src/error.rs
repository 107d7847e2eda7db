//! # Engine Errors
//!
//! One enum per subsystem, each variant carrying enough identity to
//! diagnose a failure without reading engine internals: which contract,
//! which index, which types, which nonce. The umbrella [`EngineError`]
//! is what `run_transaction` returns and what a poisoned transaction
//! entry re-raises from its fields, so everything here is `Clone` and
//! comparable.
//!
//! Contracts cannot catch these to keep a transaction alive: a failed
//! input or body poisons the whole transaction. Catching (and deciding
//! what an error is worth) is the host's job.

use thiserror::Error;

use crate::crypto::keys::KeyError;
use crate::escrow::EscrowPath;
use crate::ids::{ContractId, EntryId, IdParseError, ShortContractId, TransactionId};
use crate::value::TypeTag;

/// Failures while assembling a transaction's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The input's slot resolved but holds no contract (already spent).
    #[error("input contract {0} is not available for dispatch")]
    BadInput(ContractId),

    /// A `Trusted(i)` argument referenced an input that has not been
    /// dispatched yet (or does not exist).
    #[error("input {0} chains from input #{1}, which has not produced a result")]
    BadChainedInput(ContractId, usize),

    /// The chained source is not in the receiving contract's trust set.
    #[error("input {contract} does not trust chained results from {source_contract}")]
    UntrustedInput {
        contract: ContractId,
        source_contract: ContractId,
    },

    /// A dynamic's tag did not match the declared type at a boundary.
    #[error("argument type mismatch: expected {expected}, got {actual}")]
    BadArgType { expected: TypeTag, actual: TypeTag },

    /// A tag-matched value whose tree did not decode. Indicates a corrupt
    /// or miscoded dynamic rather than a caller mistake.
    #[error("malformed value for type {0}")]
    MalformedValue(TypeTag),

    /// More input results than the body's argument tuple has fields.
    #[error("transaction body takes {expected} inputs but {actual} were supplied")]
    TooManyInputs { expected: usize, actual: usize },

    /// Fewer input results than the body's argument tuple has fields.
    #[error("transaction body takes {expected} inputs but only {actual} were supplied")]
    NotEnoughInputs { expected: usize, actual: usize },
}

/// Violations of the escrow linearity discipline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    /// `use_escrow` on an entry not present in the ambient escrow map.
    #[error("no escrow with entry ID {0} in the current frame")]
    BadEscrowId(EntryId),

    /// The transaction ended with live escrows in its map.
    #[error("transaction ended with {} open escrow(s): {}", .0.len(), fmt_entries(.0))]
    OpenEscrows(Vec<EntryId>),

    /// A returned value referenced an escrow its frame does not hold.
    #[error("escrow {0} is referenced but its backing entry is missing")]
    MissingEscrow(EntryId),

    /// A value referenced the same escrow entry more than once.
    #[error("escrow {0} is referenced more than once in a single value")]
    DuplicateEscrow(EntryId),

    /// A locator reached an operational point unresolved, or resolution
    /// found no (or no unique) escrow at its path.
    #[error("escrow locator `{0}` did not resolve to a unique escrow")]
    UnresolvedEscrowLocator(EscrowPath),

    /// Asked for the completed value of a deferred call that has not run.
    #[error("escrow {0} is not a completed deferred call")]
    NotEscrowOut(EntryId),
}

fn fmt_entries(entries: &[EntryId]) -> String {
    entries
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures while descending the storage map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No entry under this transaction ID (or the ID is already taken,
    /// when committing).
    #[error("no transaction entry for {0}")]
    BadTransactionId(TransactionId),

    /// The entry exists but has no output at the referenced index.
    #[error("no contract at {0}")]
    BadContractId(ContractId),

    /// The entry has no input record under the referenced short ID.
    #[error("transaction {0} has no input record {1}")]
    BadInputId(TransactionId, ShortContractId),

    /// A nonce assertion did not match the slot's current call count.
    #[error("nonce mismatch at {id}: slot is at nonce {actual}, reference asserts {claimed}")]
    BadNonce {
        id: ContractId,
        actual: u64,
        claimed: u64,
    },

    /// A staged contract update targeted a slot that no longer exists.
    #[error("cannot write through {0}: slot vanished between dispatch and commit")]
    InvalidNonceAt(ContractId),

    /// `JustTransaction` IDs name a transaction, not a dispatchable slot.
    #[error("{0} does not name a dispatchable contract")]
    InvalidContractId(ContractId),
}

/// Any failure the engine can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Escrow(#[from] EscrowError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    IdParse(#[from] IdParseError),
    #[error(transparent)]
    Key(#[from] KeyError),
}
