//! Scanner API
//!
//! Public surface of the scanner: the scanner itself, its configuration and the
//! values it streams back to callers.

pub use crate::scanner::error::{ScanError, ScanResult};
pub use crate::scanner::manager::{
    RepositoryScanner, ScannerConfig, DEFAULT_PROBE_CONCURRENCY, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_SCAN_TTL_SECS,
};
pub use crate::scanner::probe::{
    CompatibilityRule, DEFAULT_MARKER_PATH, DEFAULT_REQUIRED_IDENTIFIER,
};
pub use crate::scanner::types::{
    ProbeFailure, ProbeOutcome, RepositoryCandidate, ScanPhase, ScanProgress, ScanReport,
    ScanSummary,
};
