/// Salted credential generation and verification
///
/// A credential is a (salt, hash) pair derived from an identifier (the
/// email, used as the keying context) and a secret. The salt is minted
/// fresh on every generation; the pair is always replaced together.
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fixed salt size in bytes
pub const SALT_LEN: usize = 16;

/// A freshly minted credential. Both fields are text-safe encodings,
/// opaque to everything above `CredentialStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Base64-encoded random salt
    pub salt: String,
    /// Hex-encoded salted hash
    pub hash: String,
}

/// Generates and verifies salted password hashes
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialStore;

impl CredentialStore {
    pub fn new() -> Self {
        Self
    }

    /// Mint a fresh salt and the matching hash over `identifier ‖ secret`.
    /// Always succeeds.
    pub fn generate(&self, identifier: &str, secret: &str) -> Credential {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        Credential {
            salt: base64::engine::general_purpose::STANDARD.encode(salt),
            hash: hex::encode(Self::digest(&salt, identifier, secret)),
        }
    }

    /// Recompute the hash with the supplied salt and compare byte-for-byte.
    ///
    /// Returns a plain bool: an undecodable salt and a wrong secret are
    /// indistinguishable to the caller.
    pub fn verify(&self, identifier: &str, secret: &str, salt: &str, hash: &str) -> bool {
        let salt_bytes = match base64::engine::general_purpose::STANDARD.decode(salt) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        hex::encode(Self::digest(&salt_bytes, identifier, secret)) == hash
    }

    fn digest(salt: &[u8], identifier: &str, secret: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(identifier.as_bytes());
        hasher.update(secret.as_bytes());
        hasher.finalize().into()
    }
}
