//! # Signer Identities
//!
//! Ed25519 keypairs for transaction signers.
//!
//! The engine itself never verifies a signature; ordering and
//! authentication are the host chain's problem. What the engine does need
//! is a stable, comparable identity for the party running a transaction:
//! `sender()` hands it to contract code, and every committed transaction
//! entry records its signer map. That identity is the Ed25519 public key.
//!
//! Keypair generation lives here anyway so that tests and reference
//! contracts can mint identities without dragging in the host. Private key
//! material deliberately does not implement `Serialize`; if you want to
//! persist a signing key, you get to do it explicitly and own the
//! consequences.

use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors during key handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid public key: expected 32 bytes of hex")]
    InvalidPublicKey,
}

/// The public half of a signer identity. Safe to share, cheap to copy.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; 32],
}

impl PublicKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.bytes))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.bytes))
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(PublicKey { bytes })
    }
}

/// An Ed25519 keypair identifying a transaction signer.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    ///
    /// This is the only place the engine touches randomness, and it is
    /// host-side by construction: keys are minted before a transaction is
    /// submitted, never during execution.
    pub fn generate() -> Self {
        Keypair {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// In Ed25519 the 32-byte secret key *is* the seed. Tests lean on this
    /// for reproducible signer identities; production callers should prefer
    /// [`generate`](Self::generate) unless the seed comes out of a proper
    /// KDF.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Keypair {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The public key for this identity.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic() {
        let a = Keypair::from_seed(&[7u8; 32]);
        let b = Keypair::from_seed(&[7u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn distinct_seeds_distinct_keys() {
        let a = Keypair::from_seed(&[1u8; 32]);
        let b = Keypair::from_seed(&[2u8; 32]);
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let key = Keypair::from_seed(&[9u8; 32]).public_key();
        let parsed: PublicKey = key.to_string().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn public_key_parse_rejects_short_hex() {
        assert!("abcd".parse::<PublicKey>().is_err());
    }
}
