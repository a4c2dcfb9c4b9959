//! Scan orchestration.
//!
//! The [`ScanDispatcher`] fans one artifact out to every applicable adapter,
//! normalizes what comes back and escalates malware hits into review. The
//! [`ScanService`] sits on top: it stages uploads, tracks the latest request
//! in a [`ScanSession`] and exposes the review actions.

mod dispatcher;
mod service;
mod session;

pub use dispatcher::{DispatcherConfig, ScanDispatcher, ScanDispatcherBuilder};
pub use service::{ActionResponse, ScanRequest, ScanService, UploadedFile};
pub use session::{ScanSession, SessionSnapshot, SessionTicket};
