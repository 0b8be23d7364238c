//! Password hashing.
//!
//! Stored form is `"{salt_hex}${digest_hex}"`: a per-account random salt
//! and a PBKDF2-HMAC-SHA256 key derived from the password.

use rand::RngCore;
use sha2::Sha256;

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Derived key length in bytes.
const DIGEST_BYTES: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_HASH_ITERATIONS: u32 = 100_000;

/// Salt used for the dummy hash on unknown accounts.
const DUMMY_SALT: [u8; SALT_BYTES] = [0u8; SALT_BYTES];

/// One-way password hash with a constant-time verify step.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into its stored form.
    fn hash(&self, password: &str) -> String;

    /// Check a plaintext password against a stored hash.
    /// Malformed stored hashes never verify.
    fn verify(&self, password: &str, stored: &str) -> bool;

    /// Burn the same work as a real verify. Called when the account does not
    /// exist so unknown-email and wrong-password take comparable time.
    fn dummy_verify(&self, password: &str);
}

/// Salted PBKDF2-HMAC-SHA256.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    iterations: u32,
}

impl Pbkdf2Hasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_ITERATIONS)
    }
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> String {
        let salt = generate_salt();
        let digest = stretch(password, &salt, self.iterations);
        format!("{}${digest}", hex::encode(salt))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt, expected)) = stored.split_once('$') else {
            return false;
        };
        if salt.is_empty() || expected.is_empty() {
            return false;
        }
        let Ok(salt) = hex::decode(salt) else {
            return false;
        };
        let attempt = stretch(password, &salt, self.iterations);
        constant_time_eq(expected.as_bytes(), attempt.as_bytes())
    }

    fn dummy_verify(&self, password: &str) {
        let _ = stretch(password, &DUMMY_SALT, self.iterations);
    }
}

fn generate_salt() -> [u8; SALT_BYTES] {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Derive the hex-encoded PBKDF2-HMAC-SHA256 key for `password`.
fn stretch(password: &str, salt: &[u8], iterations: u32) -> String {
    let mut key = [0u8; DIGEST_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    hex::encode(key)
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Pbkdf2Hasher {
        Pbkdf2Hasher::new(10)
    }

    #[test]
    fn correct_password_verifies() {
        let h = hasher();
        let stored = h.hash("p1");
        assert!(h.verify("p1", &stored));
    }

    #[test]
    fn wrong_password_fails() {
        let h = hasher();
        let stored = h.hash("p1");
        assert!(!h.verify("p2", &stored));
        assert!(!h.verify("", &stored));
    }

    #[test]
    fn stored_hash_never_contains_plaintext() {
        let h = hasher();
        let stored = h.hash("hunter2-plaintext");
        assert!(!stored.contains("hunter2-plaintext"));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let h = hasher();
        let a = h.hash("same");
        let b = h.hash("same");
        assert_ne!(a, b);
        assert!(h.verify("same", &a));
        assert!(h.verify("same", &b));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        let h = hasher();
        assert!(!h.verify("p1", "no-separator"));
        assert!(!h.verify("p1", "$deadbeef"));
        assert!(!h.verify("p1", "abcd$"));
        assert!(!h.verify("p1", ""));
    }

    #[test]
    fn iteration_count_changes_digest() {
        assert_ne!(stretch("pw", b"salt", 1), stretch("pw", b"salt", 2));
        assert_eq!(stretch("pw", b"salt", 5), stretch("pw", b"salt", 5));
    }

    #[test]
    fn stretch_is_standard_pbkdf2_hmac_sha256() {
        assert_eq!(
            stretch("password", b"salt", 1),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }

    #[test]
    fn stored_form_is_hex_salt_and_digest() {
        let stored = hasher().hash("p1");
        let (salt, digest) = stored.split_once('$').unwrap();
        assert_eq!(hex::decode(salt).unwrap().len(), SALT_BYTES);
        assert_eq!(hex::decode(digest).unwrap().len(), DIGEST_BYTES);
    }

    #[test]
    fn non_hex_salt_never_verifies() {
        let h = hasher();
        let stored = h.hash("p1");
        let (_, digest) = stored.split_once('$').unwrap();
        assert!(!h.verify("p1", &format!("zz${digest}")));
    }

    #[test]
    fn hash_from_other_iteration_count_does_not_verify() {
        let stored = Pbkdf2Hasher::new(3).hash("pw");
        assert!(!Pbkdf2Hasher::new(4).verify("pw", &stored));
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
