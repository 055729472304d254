//! Salted PBKDF2-HMAC-SHA256 password hashes.
//!
//! Stored form: `pbkdf2-sha256$<rounds>$<salt-hex>$<digest-hex>`.

use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;
pub const DEFAULT_ROUNDS: u32 = 10_000;

pub fn hash_password(plain: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with(plain, &salt, DEFAULT_ROUNDS)
}

fn hash_with(plain: &str, salt: &[u8], rounds: u32) -> String {
    format!(
        "{}${}${}${}",
        SCHEME,
        rounds,
        hex::encode(salt),
        hex::encode(derive(plain, salt, rounds))
    )
}

fn derive(plain: &str, salt: &[u8], rounds: u32) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(plain.as_bytes(), salt, rounds, &mut out);
    out
}

/// False for any stored value that does not parse; never panics.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(rounds), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    if rounds == 0 {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
        return false;
    };
    if expected.len() != DIGEST_LEN {
        return false;
    }
    derive(plain, &salt, rounds).ct_eq(&expected[..]).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let stored = hash_password("hunter2");
        assert!(stored.starts_with("pbkdf2-sha256$10000$"));
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn test_salt_differs_per_hash() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn test_rfc7914_vector() {
        // PBKDF2-HMAC-SHA256("passwd", "salt", 1), first 32 bytes
        let stored = hash_with("passwd", b"salt", 1);
        assert_eq!(
            stored,
            "pbkdf2-sha256$1$73616c74$55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
        assert!(verify_password("passwd", &stored));
    }

    #[test]
    fn test_malformed_never_verifies() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "pw"));
        assert!(!verify_password("pw", "md5$1$00$00"));
        assert!(!verify_password("pw", "sha256$1$00$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$x$00$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$0$00$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$1$zz$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$1$00$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$1$00$00$extra"));
    }
}
