// crates/signet-core/tests/proptest_crypto.rs
// ============================================================================
// Module: Crypto Property-Based Tests
// Description: Property tests for AEAD, secret hashing, and cookie sealing.
// Purpose: Verify round-trip and tamper-rejection invariants over wide inputs.
// ============================================================================

//! Property-based tests for crypto primitive invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use signet_core::AeadKey;
use signet_core::CookieCodec;
use signet_core::CookiePayload;
use signet_core::SessionId;
use signet_core::TenantId;
use signet_core::crypto::aead;
use signet_core::crypto::secrets;

proptest! {
    #[test]
    fn aead_round_trips_any_plaintext(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
        let key = AeadKey::generate();
        let sealed = aead::seal(&key, &plaintext, b"").unwrap();
        let opened = aead::open(&key, &sealed, b"").unwrap();
        prop_assert_eq!(opened, plaintext);
    }

    #[test]
    fn aead_rejects_foreign_key(plaintext in prop::collection::vec(any::<u8>(), 1..256)) {
        let key = AeadKey::generate();
        let other = AeadKey::generate();
        let sealed = aead::seal(&key, &plaintext, b"").unwrap();
        prop_assert!(aead::open(&other, &sealed, b"").is_err());
    }

    #[test]
    fn aead_rejects_altered_iv(plaintext in prop::collection::vec(any::<u8>(), 1..256)) {
        let key = AeadKey::generate();
        let mut sealed = aead::seal(&key, &plaintext, b"").unwrap();
        sealed.iv = if sealed.iv.starts_with('A') {
            sealed.iv.replacen('A', "B", 1)
        } else {
            let mut iv = sealed.iv.clone();
            iv.replace_range(0..1, "A");
            iv
        };
        prop_assert!(aead::open(&key, &sealed, b"").is_err());
    }

    #[test]
    fn secret_hash_verifies_only_the_original(
        secret in "[ -~]{1,64}",
        other in "[ -~]{1,64}",
    ) {
        let stored = secrets::hash_secret(&secret);
        prop_assert!(secrets::verify_secret(&secret, &stored).unwrap());
        if other != secret {
            prop_assert!(!secrets::verify_secret(&other, &stored).unwrap());
        }
    }

    #[test]
    fn cookie_round_trips_payload(version in 1u64..1_000_000, iat in 0i64..4_000_000_000) {
        let codec = CookieCodec::new(AeadKey::generate());
        let payload = CookiePayload {
            sid: SessionId::new(secrets::generate_secret()),
            tid: TenantId::new("acme"),
            v: version,
            iat,
        };
        let cookie = codec.seal(&payload).unwrap();
        let opened = codec.open(&cookie).unwrap();
        prop_assert_eq!(opened, payload);
    }
}

// ============================================================================
// SECTION: Deterministic Cases
// ============================================================================

/// Verifies the stored hash format is `$pbkdf2-sha256$<iter>$<salt>$<hash>`.
#[test]
fn secret_hash_uses_spec_format() {
    let stored = secrets::hash_secret("hunter2");
    let parts: Vec<&str> = stored.split('$').collect();
    assert_eq!(parts.len(), 5);
    assert_eq!(parts[0], "");
    assert_eq!(parts[1], "pbkdf2-sha256");
    assert_eq!(parts[2], "100000");
    assert!(!parts[3].is_empty());
    assert!(!parts[4].is_empty());
}

/// Verifies the at-rest form keeps ciphertext and tag dot-separated.
#[test]
fn aead_at_rest_form_has_tag_suffix() {
    let key = AeadKey::generate();
    let sealed = aead::seal(&key, b"provider-secret", b"").unwrap();
    assert_eq!(sealed.ciphertext.matches('.').count(), 1);
    assert!(!sealed.iv.is_empty());
}

/// Verifies a tampered cookie ciphertext fails to open.
#[test]
fn cookie_rejects_tampering() {
    let codec = CookieCodec::new(AeadKey::generate());
    let payload = CookiePayload {
        sid: SessionId::new("sid"),
        tid: TenantId::new("default"),
        v: 1,
        iat: 1_700_000_000,
    };
    let cookie = codec.seal(&payload).unwrap();
    let mut parts: Vec<String> = cookie.split('.').map(ToString::to_string).collect();
    let ct = parts[3].clone();
    parts[3] = if ct.starts_with('A') { ct.replacen('A', "B", 1) } else { format!("A{}", &ct[1..]) };
    assert!(codec.open(&parts.join(".")).is_err());
}

/// Verifies a foreign codec key cannot open the cookie.
#[test]
fn cookie_rejects_foreign_key() {
    let codec = CookieCodec::new(AeadKey::generate());
    let other = CookieCodec::new(AeadKey::generate());
    let payload = CookiePayload {
        sid: SessionId::new("sid"),
        tid: TenantId::new("default"),
        v: 3,
        iat: 1_700_000_000,
    };
    let cookie = codec.seal(&payload).unwrap();
    assert!(other.open(&cookie).is_err());
}
