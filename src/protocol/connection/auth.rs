use sha1::Sha1;
use sha2::{Digest, Sha256};

pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
pub const MYSQL_OLD_PASSWORD: &str = "mysql_old_password";

/// caching_sha2_password continuation codes inside an auth-more-data packet
pub const CACHING_SHA2_FAST_AUTH_OK: u8 = 0x03;
pub const CACHING_SHA2_FULL_AUTH: u8 = 0x04;

/// mysql_native_password challenge response:
/// `SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))`
///
/// An empty password responds with an empty payload.
pub fn scramble_password(scramble: &[u8], password: &str) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = if scramble.len() > 20 {
        &scramble[..20]
    } else {
        scramble
    };

    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let stage1: [u8; 20] = hasher.finalize().into();

    let mut hasher = Sha1::new();
    hasher.update(stage1);
    let stage2: [u8; 20] = hasher.finalize().into();

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// caching_sha2_password fast-path response:
/// `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + scramble)`
pub fn scramble_sha256_password(scramble: &[u8], password: &str) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    // Servers occasionally hand over the scramble with its trailing NUL.
    let seed = if scramble.len() == 21 && scramble.last() == Some(&0) {
        &scramble[..20]
    } else {
        scramble
    };

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let hash1: [u8; 32] = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(hash1);
    let hash2: [u8; 32] = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(hash2);
    hasher.update(seed);
    let mask: [u8; 32] = hasher.finalize().into();

    hash1.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}
