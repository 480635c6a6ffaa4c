//! Local password checks against the challenge hash sent by the backend.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Checks a password candidate against an opaque challenge hash.
///
/// Must be fast and non-blocking: it runs on the dispatcher context.
pub trait PasswordVerifier: Send + Sync + 'static {
    fn verify(&self, candidate: &str, hash: &str) -> bool;
}

impl<F> PasswordVerifier for F
where
    F: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    fn verify(&self, candidate: &str, hash: &str) -> bool {
        self(candidate, hash)
    }
}

/// Verifier for `sha256$<salt>$<hex digest>` hashes, where the digest is
/// SHA-256 over `salt || candidate`.
///
/// Anything that does not parse never matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct SaltedSha256Verifier;

impl SaltedSha256Verifier {
    const SCHEME: &'static str = "sha256";

    /// Produce a hash string this verifier accepts.
    pub fn hash(salt: &str, password: &str) -> String {
        format!(
            "{}${}${}",
            Self::SCHEME,
            salt,
            hex::encode(Self::digest(salt, password))
        )
    }

    fn digest(salt: &str, password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }
}

impl PasswordVerifier for SaltedSha256Verifier {
    fn verify(&self, candidate: &str, hash: &str) -> bool {
        let mut parts = hash.splitn(3, '$');
        let (Some(scheme), Some(salt), Some(digest_hex)) = (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        if scheme != Self::SCHEME {
            return false;
        }
        let Ok(expected) = hex::decode(digest_hex) else {
            return false;
        };
        if expected.len() != 32 {
            return false;
        }
        let actual = Self::digest(salt, candidate);
        bool::from(actual.as_slice().ct_eq(expected.as_slice()))
    }
}
