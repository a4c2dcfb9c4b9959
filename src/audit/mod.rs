//! Structured audit logging.
//!
//! This module provides functions for emitting structured audit events
//! using the `tracing` crate under the `scanwarden::audit` target. Events
//! can be captured by any tracing subscriber (JSON file, OpenTelemetry,
//! etc.) and kept apart from operational logs.

pub(crate) mod events;

pub use events::{
    emit_escalation, emit_review_change, emit_scan_report, emit_scan_result, emit_scan_started,
    DetectionSummary,
};
