//! Deterministic secret derivation. No credential is ever stored: every
//! password and generated username is recomputed on demand from a
//! process-wide seed, keeping Bind/Unbind and credential self-healing
//! stateless across restarts.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MASTER_PASSWORD_LEN: usize = 32;
const MASTER_USERNAME_LEN: usize = 16;
const BINDING_PASSWORD_LEN: usize = 32;
const BINDING_USERNAME_LEN: usize = 16;

/// The seed configured on the broker. Wrapping it keeps the raw bytes out of
/// `Debug`/`Display` output by accident.
#[derive(Clone)]
pub struct MasterPasswordSeed(Vec<u8>);

impl MasterPasswordSeed {
    pub fn new(seed: impl Into<String>) -> Self {
        Self(seed.into().into_bytes())
    }
}

impl std::fmt::Debug for MasterPasswordSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterPasswordSeed(..)")
    }
}

/// HMAC-SHA256 over `seed` keyed, message domain-separated by `label`, then
/// base64url-encoded and reduced to a character set every supported engine
/// accepts for passwords and usernames: ASCII letters and digits only.
fn derive(seed: &MasterPasswordSeed, label: &str, parts: &[&str]) -> String {
    let mut mac = HmacSha256::new_from_slice(&seed.0).expect("HMAC accepts any key length");
    mac.update(label.as_bytes());
    for part in parts {
        mac.update(b"\0");
        mac.update(part.as_bytes());
    }
    let digest = mac.finalize().into_bytes();
    URL_SAFE_NO_PAD
        .encode(digest)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn alphanumeric_only(s: &str, len: usize) -> String {
    let mut out: String = s.chars().take(len).collect();
    while out.len() < len {
        out.push('x');
    }
    out
}

/// Deterministic master password for a DB instance. Stable across process
/// restarts and recomputed (never persisted) by `CheckAndRotateCredentials`.
pub fn master_password(seed: &MasterPasswordSeed, db_instance_identifier: &str) -> String {
    alphanumeric_only(
        &derive(seed, "master-password", &[db_instance_identifier]),
        MASTER_PASSWORD_LEN,
    )
}

/// Deterministic master username. The data model calls for the master
/// credential's username to be as stateless as its password: both are
/// recomputed from the seed rather than fixed at creation time.
pub fn master_username(seed: &MasterPasswordSeed, db_instance_identifier: &str) -> String {
    let raw = alphanumeric_only(
        &derive(seed, "master-username", &[db_instance_identifier]),
        MASTER_USERNAME_LEN,
    );
    match raw.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("u{}", &raw[..raw.len() - 1]),
        _ => raw,
    }
}

/// Deterministic per-binding username. Independent of `binding_password` even
/// though both are keyed by `bindingId`, thanks to label domain-separation.
pub fn binding_username(seed: &MasterPasswordSeed, binding_id: &str) -> String {
    let raw = alphanumeric_only(
        &derive(seed, "binding-username", &[binding_id]),
        BINDING_USERNAME_LEN,
    );
    // engines reject usernames starting with a digit.
    match raw.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("u{}", &raw[..raw.len() - 1]),
        _ => raw,
    }
}

/// Deterministic per-binding password, keyed by both `bindingId` and the
/// owning instance so the same binding on two instances never collides.
pub fn binding_password(
    seed: &MasterPasswordSeed,
    binding_id: &str,
    db_instance_identifier: &str,
) -> String {
    alphanumeric_only(
        &derive(
            seed,
            "binding-password",
            &[binding_id, db_instance_identifier],
        ),
        BINDING_PASSWORD_LEN,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_password_is_deterministic() {
        let seed = MasterPasswordSeed::new("s3cr3t-seed");
        let a = master_password(&seed, "rdsbroker-instance-1");
        let b = master_password(&seed, "rdsbroker-instance-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), MASTER_PASSWORD_LEN);
    }

    #[test]
    fn master_password_differs_by_instance() {
        let seed = MasterPasswordSeed::new("s3cr3t-seed");
        let a = master_password(&seed, "instance-1");
        let b = master_password(&seed, "instance-2");
        assert_ne!(a, b);
    }

    #[test]
    fn master_password_differs_by_seed() {
        let a = master_password(&MasterPasswordSeed::new("seed-a"), "instance-1");
        let b = master_password(&MasterPasswordSeed::new("seed-b"), "instance-1");
        assert_ne!(a, b);
    }

    #[test]
    fn binding_username_and_password_are_independent() {
        let seed = MasterPasswordSeed::new("s3cr3t-seed");
        let username = binding_username(&seed, "binding-1");
        let password = binding_password(&seed, "binding-1", "instance-1");
        assert_ne!(username, password);
        assert_eq!(username.len(), BINDING_USERNAME_LEN);
        assert_eq!(password.len(), BINDING_PASSWORD_LEN);
    }

    #[test]
    fn binding_password_keyed_by_instance_too() {
        let seed = MasterPasswordSeed::new("s3cr3t-seed");
        let a = binding_password(&seed, "binding-1", "instance-1");
        let b = binding_password(&seed, "binding-1", "instance-2");
        assert_ne!(a, b);
    }

    #[test]
    fn master_username_is_deterministic_and_distinct_from_password() {
        let seed = MasterPasswordSeed::new("s3cr3t-seed");
        let username = master_username(&seed, "cf-instance-id");
        let username_again = master_username(&seed, "cf-instance-id");
        let password = master_password(&seed, "cf-instance-id");
        assert_eq!(username, username_again);
        assert_ne!(username, password);
    }

    #[test]
    fn binding_username_never_starts_with_a_digit() {
        let seed = MasterPasswordSeed::new("0");
        for i in 0..50 {
            let username = binding_username(&seed, &format!("binding-{i}"));
            assert!(!username.chars().next().unwrap().is_ascii_digit());
        }
    }
}
