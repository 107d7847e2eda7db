//! Cryptographic primitives: SHA3-256 digests and Ed25519 signer identities.
//!
//! Everything here is pure and total. Hash functions come from the
//! RustCrypto `sha3` crate, signatures from `ed25519-dalek`; the engine
//! wraps rather than reimplements, because hand-rolled crypto is how
//! substrates die.

pub mod hash;
pub mod keys;

pub use hash::{sha3_256, sha3_256_multi, Digest, InvalidDigest, DIGEST_LENGTH};
pub use keys::{KeyError, Keypair, PublicKey};
