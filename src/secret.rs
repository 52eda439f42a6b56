//! HTLC hash commitment (spec §6, §9 Open Question).
//!
//! The reference on-chain contract double-hashes the secret with SHA-256:
//! `hashed = sha256(sha256(secret))`. Other chains in the wild sometimes use
//! `keccak(abi.encodePacked(secret))` or single `sha256(secret)`; we pick and
//! document the double-SHA-256 scheme as the one this core validates against
//! (see DESIGN.md). A real deployment adapting a chain with a different
//! on-chain scheme would perform the chain-specific hash inside that chain's
//! adapter and present the core with the already-normalized `HashedSecret`.

use sha2::{Digest, Sha256};

pub const SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secret(pub [u8; SECRET_LEN]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashedSecret(pub [u8; 32]);

impl HashedSecret {
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl std::fmt::Display for HashedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Double SHA-256 of the raw secret, per the reference contract.
pub fn commit(secret: &Secret) -> HashedSecret {
    let first = Sha256::digest(secret.0);
    let second = Sha256::digest(first);
    HashedSecret(second.into())
}

/// Verifies `hash(secret) == hashed`, the predicate used by the HTLC claim
/// handler (spec §4.6 `completed -> claimed`).
pub fn verify(secret: &Secret, hashed: &HashedSecret) -> bool {
    commit(secret) == *hashed
}
