//! Scanner data types

use crate::remote::types::RepoMeta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// A repository found while scanning an owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryCandidate {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    pub private: bool,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub html_url: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Set once the compatibility probe has completed
    pub compatible: bool,
}

impl RepositoryCandidate {
    pub fn from_meta(meta: &RepoMeta, compatible: bool) -> Self {
        Self {
            owner: meta.owner.clone(),
            name: meta.name.clone(),
            default_branch: meta.default_branch.clone(),
            private: meta.private,
            description: meta.description.clone(),
            stars: meta.stars,
            forks: meta.forks,
            html_url: meta.html_url.clone(),
            topics: meta.topics.clone(),
            compatible,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Scan lifecycle phase reported through progress callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Started,
    Running,
    Completed,
    Cancelled,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Started => "started",
            ScanPhase::Running => "running",
            ScanPhase::Completed => "completed",
            ScanPhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Transient progress snapshot, emitted on every state change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanProgress {
    pub scanned: usize,
    pub total: usize,
    pub current_name: String,
    pub percentage: f64,
    pub phase: ScanPhase,
}

impl ScanProgress {
    pub fn new(scanned: usize, total: usize, current_name: &str, phase: ScanPhase) -> Self {
        let percentage = if total == 0 {
            if phase == ScanPhase::Completed {
                100.0
            } else {
                0.0
            }
        } else {
            scanned as f64 * 100.0 / total as f64
        };
        Self {
            scanned,
            total,
            current_name: current_name.to_string(),
            percentage,
            phase,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.phase, ScanPhase::Completed | ScanPhase::Cancelled)
    }
}

/// Result of one compatibility probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Compatible,
    /// Marker absent or not declaring the required identifier
    Incompatible,
    /// Probe could not complete; the repository is treated as incompatible
    Failed(String),
}

impl ProbeOutcome {
    pub fn is_compatible(&self) -> bool {
        matches!(self, ProbeOutcome::Compatible)
    }
}

/// A repository whose probe failed for a reason other than a missing marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub repository: String,
    pub reason: String,
}

/// Full outcome of one scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub owner: String,
    /// Compatible repositories, in listing order
    pub candidates: Vec<RepositoryCandidate>,
    pub failures: Vec<ProbeFailure>,
    pub scanned: usize,
    pub total: usize,
    pub cancelled: bool,
    /// Served from a fresh cache entry without remote calls
    pub from_cache: bool,
}

/// Summary of the last completed scan of an owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub owner: String,
    pub scanned: usize,
    pub compatible: usize,
    pub failed: usize,
    pub completed_at: SystemTime,
}
