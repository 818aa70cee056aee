//! PKCE (RFC 7636) verifier/challenge generation and verifier custody.
//!
//! The verifier is stored in the injected key-value store across the OAuth
//! redirect and is strictly single-use: `take_verifier` removes it
//! regardless of what the subsequent code exchange does with it.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::debug;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::host::KeyValueStore;

const PKCE_VERIFIER_KEY: &str = "orbit.pkce_verifier";

/// A generated verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a fresh PKCE pair: 32 random bytes, base64url without
/// padding, challenged via SHA-256.
pub fn generate_pkce_pair() -> PkcePair {
    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    let verifier = URL_SAFE_NO_PAD.encode(random_bytes);

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    PkcePair {
        verifier,
        challenge,
    }
}

/// Persist the verifier for retrieval after the redirect round-trip.
pub fn store_verifier(kv: &Arc<dyn KeyValueStore>, verifier: &str) {
    if let Err(e) = kv.set(PKCE_VERIFIER_KEY, verifier) {
        debug!("[PKCE] Failed to store verifier: {}", e);
    }
}

/// Retrieve and delete the stored verifier.
///
/// The removal happens unconditionally: a verifier is consumed by the
/// first callback that reads it, whatever the exchange outcome. Storage
/// errors read as "no verifier".
pub fn take_verifier(kv: &Arc<dyn KeyValueStore>) -> Option<String> {
    let verifier = kv.get(PKCE_VERIFIER_KEY).ok().flatten();
    if let Err(e) = kv.remove(PKCE_VERIFIER_KEY) {
        debug!("[PKCE] Failed to remove verifier: {}", e);
    }
    verifier.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryKeyValueStore;

    #[test]
    fn test_pair_shape() {
        let pair = generate_pkce_pair();
        // 32 bytes base64url unpadded = 43 chars, same for the SHA-256 digest
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge.len(), 43);
        assert!(!pair.verifier.contains('='));
        assert!(!pair.challenge.contains('='));
    }

    #[test]
    fn test_challenge_matches_verifier() {
        let pair = generate_pkce_pair();
        let mut hasher = Sha256::new();
        hasher.update(pair.verifier.as_bytes());
        assert_eq!(pair.challenge, URL_SAFE_NO_PAD.encode(hasher.finalize()));
    }

    #[test]
    fn test_pairs_are_unique() {
        let a = generate_pkce_pair();
        let b = generate_pkce_pair();
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn test_take_verifier_is_single_use() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        store_verifier(&kv, "ver123");
        assert_eq!(take_verifier(&kv).as_deref(), Some("ver123"));
        assert_eq!(take_verifier(&kv), None);
    }

    #[test]
    fn test_take_verifier_when_absent() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        assert_eq!(take_verifier(&kv), None);
    }
}
