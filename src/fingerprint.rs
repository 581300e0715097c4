//! Candidate fingerprinting
//!
//! Candidates are integers; the fingerprint of a candidate is the MD5
//! digest of its canonical fixed-width decimal representation. The target
//! digest is normalized to upper-case hex at parse time and compared
//! case-insensitively, so operators can paste digests in either case.

use std::fmt;

use md5::{Digest, Md5};

/// Width of the canonical zero-padded candidate representation
pub const CANDIDATE_WIDTH: usize = 10;

/// MD5 digests are 16 bytes, 32 hex characters
const DIGEST_HEX_LEN: usize = 32;

/// The target digest candidates are tested against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Upper-case hex digest
    digest: String,
}

impl Fingerprint {
    /// Parse and validate a target digest
    pub fn parse(input: &str) -> crate::Result<Self> {
        let digest = input.trim().to_ascii_uppercase();
        if digest.len() != DIGEST_HEX_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            anyhow::bail!(
                "target hash must be {} hex characters, got {:?}",
                DIGEST_HEX_LEN,
                input
            );
        }
        Ok(Self { digest })
    }

    /// Canonical fixed-width representation of a candidate
    pub fn format_candidate(candidate: u64) -> String {
        format!("{:0width$}", candidate, width = CANDIDATE_WIDTH)
    }

    /// Test one candidate against the target
    pub fn matches(&self, candidate: u64) -> bool {
        let formatted = Self::format_candidate(candidate);
        let hex = format!("{:x}", Md5::digest(formatted.as_bytes()));
        hex.eq_ignore_ascii_case(&self.digest)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}
