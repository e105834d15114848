//! Content fingerprints used as convergence keys
//!
//! The digest covers the structured content of a candidate (origin, title,
//! severity, ordered fields). The rendered timestamp and occurrence time are
//! left out by construction, so repeats of the same condition collide while
//! a timestamp-looking substring inside a message still counts as content.

use crate::types::{AlertCandidate, AlertField, AlertOrigin};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

#[derive(Serialize)]
struct FingerprintInput<'a> {
    origin: AlertOrigin,
    title: &'a str,
    severity: &'a str,
    fields: &'a [AlertField],
}

impl Fingerprint {
    pub fn of(candidate: &AlertCandidate) -> Self {
        let input = FingerprintInput {
            origin: candidate.origin,
            title: &candidate.title,
            severity: &candidate.severity,
            fields: &candidate.fields,
        };
        // Serializing plain strings and enums cannot fail
        let bytes = serde_json::to_vec(&input).unwrap_or_default();
        Self(blake3::hash(&bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}
