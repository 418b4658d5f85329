/// Salted SHA-256 credential hashing
///
/// Encoded form: `sha256$<salt hex>$<digest hex>` where digest = SHA256(salt || password).

use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";

pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4();
    let digest = digest(salt.as_bytes(), password);
    format!("{}${}${}", SCHEME, hex::encode(salt.as_bytes()), hex::encode(digest))
}

/// Check a password against an encoded hash. Malformed hashes never verify.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(salt), Some(expected), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
        return false;
    };
    constant_time_eq(&digest(&salt, password), &expected)
}

/// Byte comparison whose running time does not depend on where inputs differ
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_is_salted() {
        let first = hash_password("correct horse");
        let second = hash_password("correct horse");
        assert_ne!(first, second);
        assert!(first.starts_with("sha256$"));
        assert!(verify_password("correct horse", &first));
        assert!(verify_password("correct horse", &second));
        assert!(!verify_password("wrong horse", &first));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "sha256$zz$zz"));
        assert!(!verify_password("x", "md5$00$00"));
        assert!(!verify_password("x", "sha256$00$00$00"));
    }
}
