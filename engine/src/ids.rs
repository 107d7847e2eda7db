//! # Identifiers
//!
//! Every name the engine uses to address state, in one place:
//!
//! - [`TransactionId`] — names a committed (or poisoned) transaction entry.
//! - [`ContractId`] — names a contract slot by its provenance: a
//!   transaction's own ID, one of its top-level outputs, or an output
//!   published by one of its inputs.
//! - [`ShortContractId`] — the SHA3-256 digest of a [`ContractId`]'s
//!   canonical encoding. Input records and trust sets are keyed by short
//!   IDs so their size does not depend on how deep the provenance chain is.
//! - [`EntryId`] — names a live escrow. Derived, never random: the engine
//!   hashes the owning transaction ID with a per-transaction counter, so
//!   two runs over equal inputs allocate identical entry IDs.
//! - [`VersionId`] — names a recorded contract version in the audit output.
//! - [`ContractRef`] — a [`ContractId`] plus an optional asserted nonce,
//!   written `<id> :# <n>`. Dispatching through a ref whose nonce does not
//!   match the slot's current call count aborts with `BadNonce`.
//!
//! All identifiers round-trip through `Display`/`FromStr`; the text forms
//! are the ones used in audit output and accepted from hosts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::crypto::hash::{sha3_256, sha3_256_multi, Digest};

/// Error parsing any of the identifier text forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("invalid digest in identifier")]
    BadDigest,
    #[error("invalid output index in contract ID")]
    BadIndex,
    #[error("unrecognized contract ID form: {0:?}")]
    BadForm(String),
    #[error("invalid nonce assertion: expected `:# <n>`")]
    BadNonceSuffix,
}

macro_rules! digest_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub Digest);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map($name).map_err(|_| IdParseError::BadDigest)
            }
        }
    };
}

digest_id! {
    /// Identifies a transaction in storage.
    ///
    /// Transaction IDs are assigned by the host (typically a hash of the
    /// signed submission); the engine treats them as opaque digests.
    TransactionId
}

digest_id! {
    /// Identifies a live escrow in some escrow map.
    EntryId
}

digest_id! {
    /// Identifies a recorded contract version in an input's version map.
    VersionId
}

digest_id! {
    /// The SHA3-256 digest of a [`ContractId`]'s canonical bincode bytes.
    ShortContractId
}

impl TransactionId {
    /// Derive a transaction ID from arbitrary host-side bytes.
    ///
    /// Convenience for hosts and tests that name transactions by label
    /// rather than by submission hash.
    pub fn derive(data: &[u8]) -> Self {
        TransactionId(sha3_256(data))
    }
}

impl EntryId {
    /// Derive the `counter`-th entry ID allocated under `tx`.
    ///
    /// Domain-separated so entry IDs can never collide with shortened
    /// contract IDs over the same bytes.
    pub fn derive(tx: &TransactionId, counter: u64) -> Self {
        EntryId(sha3_256_multi(&[
            b"fae/entry",
            &tx.0 .0,
            &counter.to_le_bytes(),
        ]))
    }
}

/// Names a contract slot by provenance.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContractId {
    /// The transaction itself. Not dispatchable; used to attribute values
    /// (such as the reward escrow) to the transaction rather than to any
    /// input.
    JustTransaction(TransactionId),
    /// The `i`-th top-level output of a transaction.
    TransactionOutput(TransactionId, usize),
    /// The `i`-th output published by the input `short` during a
    /// transaction.
    InputOutput(TransactionId, ShortContractId, usize),
}

impl ContractId {
    /// The transaction this contract's provenance starts at.
    pub fn transaction(&self) -> &TransactionId {
        match self {
            ContractId::JustTransaction(tx)
            | ContractId::TransactionOutput(tx, _)
            | ContractId::InputOutput(tx, _, _) => tx,
        }
    }

    /// Content-addressed shortening: the digest of this ID's canonical
    /// encoding, domain-separated from other derived digests.
    pub fn shorten(&self) -> ShortContractId {
        let bytes =
            bincode::serialize(self).expect("ContractId serialization should never fail");
        ShortContractId(sha3_256_multi(&[b"fae/contract", &bytes]))
    }

    /// Attach a nonce assertion, producing a [`ContractRef`] that only
    /// dispatches if the slot's current nonce equals `nonce`.
    pub fn at_nonce(self, nonce: u64) -> ContractRef {
        ContractRef {
            id: self,
            claimed_nonce: Some(nonce),
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractId::JustTransaction(tx) => write!(f, "tx {tx}"),
            ContractId::TransactionOutput(tx, i) => write!(f, "txout {tx} {i}"),
            ContractId::InputOutput(tx, short, i) => write!(f, "inout {tx} {short} {i}"),
        }
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for ContractId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            ["tx", tx] => Ok(ContractId::JustTransaction(tx.parse()?)),
            ["txout", tx, i] => Ok(ContractId::TransactionOutput(
                tx.parse()?,
                i.parse().map_err(|_| IdParseError::BadIndex)?,
            )),
            ["inout", tx, short, i] => Ok(ContractId::InputOutput(
                tx.parse()?,
                short.parse()?,
                i.parse().map_err(|_| IdParseError::BadIndex)?,
            )),
            _ => Err(IdParseError::BadForm(s.to_string())),
        }
    }
}

/// A contract ID with an optional asserted nonce, written `<id> :# <n>`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractRef {
    /// The slot being referenced.
    pub id: ContractId,
    /// If present, the nonce the slot must currently hold.
    pub claimed_nonce: Option<u64>,
}

impl From<ContractId> for ContractRef {
    fn from(id: ContractId) -> Self {
        ContractRef {
            id,
            claimed_nonce: None,
        }
    }
}

impl fmt::Display for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.claimed_nonce {
            Some(n) => write!(f, "{} :# {}", self.id, n),
            None => write!(f, "{}", self.id),
        }
    }
}

impl fmt::Debug for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for ContractRef {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(":#") {
            None => Ok(ContractRef {
                id: s.trim().parse()?,
                claimed_nonce: None,
            }),
            Some((id, nonce)) => Ok(ContractRef {
                id: id.trim().parse()?,
                claimed_nonce: Some(
                    nonce
                        .trim()
                        .parse()
                        .map_err(|_| IdParseError::BadNonceSuffix)?,
                ),
            }),
        }
    }
}
