//! # Hashing Utilities
//!
//! SHA3-256 is the only digest algorithm in Fae, full stop. Contract IDs,
//! escrow entry IDs, and transaction records are all content-addressed with
//! it, so supporting a second algorithm would mean two incompatible notions
//! of identity for the same bytes. Not worth it.
//!
//! The [`Digest`] newtype wraps the 32-byte output. It is `Ord` on purpose:
//! every digest-keyed map in the engine is a `BTreeMap`, because iteration
//! order over storage is observable in the audit output and therefore
//! consensus-critical. A `HashMap` here would be a determinism bug waiting
//! for a seed change.

use serde::{Deserialize, Serialize};
use sha3::{Digest as Sha3Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of bytes in a SHA3-256 digest.
pub const DIGEST_LENGTH: usize = 32;

/// A 32-byte SHA3-256 digest.
///
/// Prints and parses as 64 lowercase hex characters. Two digests are equal
/// exactly when their bytes are equal; there is no truncated or "short
/// display" form anywhere in the engine, because truncated IDs in audit
/// output invite collision confusion.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Digest(pub [u8; DIGEST_LENGTH]);

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Error parsing a hex-encoded digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid digest: expected {expected} hex characters", expected = DIGEST_LENGTH * 2)]
pub struct InvalidDigest;

impl FromStr for Digest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidDigest)?;
        let arr: [u8; DIGEST_LENGTH] = bytes.try_into().map_err(|_| InvalidDigest)?;
        Ok(Digest(arr))
    }
}

/// Compute the SHA3-256 hash of the input data.
pub fn sha3_256(data: &[u8]) -> Digest {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    Digest(hasher.finalize().into())
}

/// Hash multiple byte slices together without concatenation overhead.
///
/// Feeding the parts sequentially into the hasher produces the same digest
/// as hashing the concatenation, minus the temporary buffer. Used by the
/// derived-ID constructions (`entry IDs`, shortened contract IDs) that hash
/// a domain tag together with structured bytes.
pub fn sha3_256_multi(parts: &[&[u8]]) -> Digest {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    Digest(hasher.finalize().into())
}
