// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content fingerprints: SHA-256 over input and output buffers so log lines
// and handles can name a document without carrying its bytes.

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as a lowercase hex string.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// First 12 hex digits of the fingerprint, enough to tell inputs apart in logs.
pub fn short_fingerprint(data: &[u8]) -> String {
    let mut full = fingerprint(data);
    full.truncate(12);
    full
}
