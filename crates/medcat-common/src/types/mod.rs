//! Common types used across MedCat

use serde::{Deserialize, Serialize};

use crate::error::MdcError;

/// Checksum algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

// ============================================================================
// Ledger Types
// ============================================================================

/// Lifecycle of one snapshot row in the ledger.
///
/// A snapshot is inserted as `Pending` when the first attempt of an ingestion
/// run produces a stream, and is finalised exactly once to `Completed` or
/// `Failed`. A run that is cancelled mid-flight stays `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Pending,
    Completed,
    Failed,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Pending => "pending",
            SnapshotStatus::Completed => "completed",
            SnapshotStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SnapshotStatus {
    type Err = MdcError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SnapshotStatus::Pending),
            "completed" => Ok(SnapshotStatus::Completed),
            "failed" => Ok(SnapshotStatus::Failed),
            other => Err(MdcError::InvalidStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_status_round_trip_text() {
        for status in [SnapshotStatus::Pending, SnapshotStatus::Completed, SnapshotStatus::Failed] {
            assert_eq!(status.as_str().parse::<SnapshotStatus>().unwrap(), status);
        }
        assert!("running".parse::<SnapshotStatus>().is_err());
    }

    #[test]
    fn test_snapshot_status_serde_is_lowercase() {
        let json = serde_json::to_string(&SnapshotStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
