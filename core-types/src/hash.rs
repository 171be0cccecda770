// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Canonical-serialization fingerprints.
//!
//! `serde_json::Map` keeps its keys sorted, so the compact serialization of
//! any value built through this workspace is already canonical: two
//! semantically equal documents serialize to identical bytes regardless of
//! the field order or whitespace of the text they were parsed from.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Base64-encoded SHA-256 of the canonical compact serialization of `value`.
pub fn hash_value(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Short url-safe identifier derived from a domain tag and a sequence
/// number.  Inputs are length-prefixed so no two write streams collide.
pub fn sequence_uid(domain: &str, scope: &str, seq: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u32).to_le_bytes());
    hasher.update(domain.as_bytes());
    hasher.update((scope.len() as u32).to_le_bytes());
    hasher.update(scope.as_bytes());
    hasher.update(seq.to_le_bytes());
    URL_SAFE_NO_PAD.encode(&hasher.finalize()[..16])
}
