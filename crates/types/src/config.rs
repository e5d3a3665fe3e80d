// Path: crates/types/src/config.rs

//! Shared configuration structures for the trust database.

use serde::{Deserialize, Serialize};

/// Tunables of the trust evaluation and of batch reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustOptions {
    /// How many fully-trusted introducer paths make a key fully valid.
    #[serde(default = "default_completes_needed")]
    pub completes_needed: u32,
    /// How many marginally-trusted introducer paths make a key fully valid.
    #[serde(default = "default_marginals_needed")]
    pub marginals_needed: u32,
    /// Maximum certification-chain depth the evaluator will walk.
    #[serde(default = "default_max_cert_depth")]
    pub max_cert_depth: u32,
    /// Verbosity of informational logging (0 quiet, 1 verbose, 2 chatty).
    #[serde(default)]
    pub verbose: u8,
}

fn default_completes_needed() -> u32 {
    1
}
fn default_marginals_needed() -> u32 {
    3
}
fn default_max_cert_depth() -> u32 {
    5
}

impl Default for TrustOptions {
    fn default() -> Self {
        Self {
            completes_needed: default_completes_needed(),
            marginals_needed: default_marginals_needed(),
            max_cert_depth: default_max_cert_depth(),
            verbose: 0,
        }
    }
}
