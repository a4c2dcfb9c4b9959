//! The latest scan session, for status polling.

use crate::core::ScanReport;

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// What a status poll returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Whether the latest scan has finished (successfully or not).
    pub scan_completed: bool,

    /// Results of the latest scan, once completed.
    pub scan_results: Option<ScanReport>,

    /// Whether the latest scan reported any finding.
    pub findings_exist: bool,

    /// Request-level error of the latest scan, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Proof that the holder started the scan currently tracked by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    generation: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    generation: u64,
    snapshot: SessionSnapshot,
}

/// A single-slot, latest-wins record of the most recent scan.
///
/// Each new scan takes a ticket with [`begin`](Self::begin). Completing with
/// a ticket that has been superseded by a later `begin` is ignored, so a slow
/// earlier scan can never overwrite a newer one.
#[derive(Debug, Default)]
pub struct ScanSession {
    state: RwLock<SessionState>,
}

impl ScanSession {
    /// Creates an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a new scan, resetting the snapshot.
    pub fn begin(&self) -> SessionTicket {
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.generation += 1;
        state.snapshot = SessionSnapshot::default();
        SessionTicket {
            generation: state.generation,
        }
    }

    /// Records the report of the scan identified by `ticket`.
    ///
    /// Returns `false` if a newer scan has started since.
    pub fn complete(&self, ticket: SessionTicket, report: ScanReport) -> bool {
        let findings_exist = report.findings_exist();
        self.replace(
            ticket,
            SessionSnapshot {
                scan_completed: true,
                scan_results: Some(report),
                findings_exist,
                error: None,
            },
        )
    }

    /// Records a request-level failure of the scan identified by `ticket`.
    pub fn fail(&self, ticket: SessionTicket, error: impl Into<String>) -> bool {
        self.replace(
            ticket,
            SessionSnapshot {
                scan_completed: true,
                scan_results: None,
                findings_exist: false,
                error: Some(error.into()),
            },
        )
    }

    fn replace(&self, ticket: SessionTicket, snapshot: SessionSnapshot) -> bool {
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.generation != ticket.generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = state.generation,
                "Discarding superseded scan session"
            );
            return false;
        }
        state.snapshot = snapshot;
        true
    }

    /// Returns a copy of the current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot
            .clone()
    }

    /// Returns true if the latest scan has finished.
    pub fn is_complete(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot
            .scan_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactKind, Detection, ScanResult, ScannerKind, Severity};

    fn report_with_hit() -> ScanReport {
        let mut report = ScanReport::new();
        report.extend(
            ArtifactKind::Filesystem,
            vec![ScanResult::success(ScannerKind::Av, "ClamAV", "/x", "x: Sig FOUND")
                .with_detections(vec![Detection::new("Sig", Severity::Critical)])],
        );
        report
    }

    #[test]
    fn test_begin_resets_snapshot() {
        let session = ScanSession::new();
        let ticket = session.begin();
        session.complete(ticket, report_with_hit());
        assert!(session.snapshot().findings_exist);

        session.begin();
        let snapshot = session.snapshot();
        assert!(!snapshot.scan_completed);
        assert!(snapshot.scan_results.is_none());
        assert!(!snapshot.findings_exist);
    }

    #[test]
    fn test_latest_wins() {
        let session = ScanSession::new();
        let first = session.begin();
        let second = session.begin();

        assert!(session.complete(second, ScanReport::new()));
        assert!(!session.complete(first, report_with_hit()));

        let snapshot = session.snapshot();
        assert!(snapshot.scan_completed);
        assert!(!snapshot.findings_exist);
    }

    #[test]
    fn test_fail_records_error() {
        let session = ScanSession::new();
        let ticket = session.begin();
        session.fail(ticket, "invalid input");

        let snapshot = session.snapshot();
        assert!(snapshot.scan_completed);
        assert_eq!(snapshot.error.as_deref(), Some("invalid input"));
        assert!(session.is_complete());
    }
}
