//! PKCE (RFC 7636) and state nonce generation.
//!
//! Every authorization attempt gets a fresh [`PkceVerifier`] and a fresh
//! state nonce. Neither is persisted or reused.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;

/// Characters used for state nonces. Visually ambiguous glyphs
/// (`0 O 1 l I`) are left out so a nonce can be read back by a human.
const STATE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

pub const STATE_LENGTH: usize = 32;

pub const CHALLENGE_METHOD: &str = "S256";

/// A PKCE code verifier and its S256 challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceVerifier {
    verifier: String,
}

impl PkceVerifier {
    /// Generates a verifier from 32 random bytes (43 base64url characters).
    pub fn new() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            verifier: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// `BASE64URL(SHA256(verifier))`.
    pub fn challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.verifier.as_bytes()))
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .finish()
    }
}

/// A random state nonce of [`STATE_LENGTH`] characters.
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    (0..STATE_LENGTH)
        .map(|_| char::from(STATE_ALPHABET[rng.gen_range(0..STATE_ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_shape() {
        let verifier = PkceVerifier::new();
        assert_eq!(verifier.verifier().len(), 43);
        assert!(verifier
            .verifier()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_challenge_is_s256_of_verifier() {
        // RFC 7636 appendix B.
        let verifier = PkceVerifier {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
        };
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert_ne!(verifier.challenge(), verifier.verifier());
    }

    #[test]
    fn test_verifiers_are_unique() {
        assert_ne!(PkceVerifier::new(), PkceVerifier::new());
    }

    #[test]
    fn test_state_uses_unambiguous_alphabet() {
        let state = generate_state();
        assert_eq!(state.len(), STATE_LENGTH);
        assert!(state.bytes().all(|b| STATE_ALPHABET.contains(&b)));
        assert!(!state.contains(['0', 'O', '1', 'l', 'I']));
        assert_ne!(state, generate_state());
    }

    #[test]
    fn test_debug_hides_verifier() {
        let verifier = PkceVerifier::new();
        assert!(!format!("{:?}", verifier).contains(verifier.verifier()));
    }
}
