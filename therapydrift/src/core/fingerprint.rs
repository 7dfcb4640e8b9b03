//! Evidence fingerprints used to detect "nothing changed since last time".

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::types::SignalEvent;

/// SHA-256 (hex) over filtered signal identities and unresolved follow-up ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Signals are hashed in ledger order; follow-up ids in sorted order.
    pub fn compute(signals: &[&SignalEvent], followup_ids: &BTreeSet<String>) -> Self {
        let mut hasher = Sha256::new();
        for signal in signals {
            let ts = signal
                .timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            hasher.update(b"signal\0");
            hasher.update(ts.as_bytes());
            hasher.update(b"\0");
            hasher.update(signal.source_tag.as_bytes());
            hasher.update(b"\0");
            hasher.update(signal.raw_text.as_bytes());
            hasher.update(b"\n");
        }
        for id in followup_ids {
            hasher.update(b"followup\0");
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already-computed digest (e.g. one read back from the state store).
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines and task descriptions.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
