//! Property-based tests for hatch-updater.
//!
//! # Properties Tested
//!
//! - Signing round-trip: any payload signed with any key verifies
//! - Tamper detection: flipping a single bit breaks verification
//! - Resolution is deterministic and absent targets resolve to `None`
//! - Version comparison is a strict order on semver versions

#![cfg(test)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::SigningKey;
use proptest::prelude::*;
use semver::Version;

use crate::controller::is_newer;
use crate::manifest::UpdateManifest;
use crate::platform::Target;
use crate::signature::{public_key_from_private, sign, verify};

// =============================================================================
// Generators
// =============================================================================

/// Base64 private key from 32 random bytes.
fn arb_private_key() -> impl Strategy<Value = String> {
    prop::array::uniform32(any::<u8>())
        .prop_map(|bytes| STANDARD.encode(SigningKey::from_bytes(&bytes).to_bytes()))
}

/// Random artifact content (1 byte to 4KB).
fn arb_artifact_content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..4096)
}

fn arb_version() -> impl Strategy<Value = Version> {
    (0u64..50, 0u64..50, 0u64..50).prop_map(|(major, minor, patch)| Version::new(major, minor, patch))
}

fn arb_target() -> impl Strategy<Value = Target> {
    prop::sample::select(Target::ALL.to_vec())
}

/// Multi-platform manifest JSON publishing a subset of targets.
fn arb_multi_platform_manifest() -> impl Strategy<Value = (String, Vec<Target>)> {
    (arb_version(), prop::sample::subsequence(Target::ALL.to_vec(), 1..=5)).prop_map(
        |(version, targets)| {
            let platforms: serde_json::Map<String, serde_json::Value> = targets
                .iter()
                .map(|t| {
                    (
                        t.to_string(),
                        serde_json::json!({
                            "url": format!("https://cdn.example.com/{}/app.tar.gz", t),
                            "signature": "c2ln",
                            "size": 10
                        }),
                    )
                })
                .collect();
            let json = serde_json::json!({
                "version": version.to_string(),
                "pub_date": "2024-01-01T00:00:00Z",
                "platforms": platforms,
            });
            (json.to_string(), targets)
        },
    )
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_sign_verify_round_trip(key in arb_private_key(), content in arb_artifact_content()) {
        let public = public_key_from_private(&key).unwrap();
        let sig = sign(&content, &key).unwrap();
        prop_assert!(verify(&content, &sig, &public));
    }

    #[test]
    fn prop_single_bit_flip_detected(
        key in arb_private_key(),
        content in arb_artifact_content(),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let public = public_key_from_private(&key).unwrap();
        let sig = sign(&content, &key).unwrap();

        let mut tampered = content.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= 1 << bit;

        prop_assert!(!verify(&tampered, &sig, &public));
    }

    #[test]
    fn prop_resolution_deterministic((json, published) in arb_multi_platform_manifest(), target in arb_target()) {
        let a = UpdateManifest::from_slice(json.as_bytes()).unwrap();
        let b = UpdateManifest::from_slice(json.as_bytes()).unwrap();

        let resolved = a.resolve(target);
        prop_assert_eq!(&resolved, &b.resolve(target));
        prop_assert_eq!(resolved.is_some(), published.contains(&target));
    }

    #[test]
    fn prop_is_newer_matches_semver(a in arb_version(), b in arb_version()) {
        prop_assert_eq!(is_newer(&a.to_string(), &b.to_string()), a > b);
        prop_assert!(!(is_newer(&a.to_string(), &b.to_string()) && is_newer(&b.to_string(), &a.to_string())));
    }
}
