//! Manual-review queue for escalated detections.
//!
//! This module provides a trait-based abstraction for review persistence
//! and the [`ReviewQueue`] that serializes every mutation over it.

mod filesystem;
mod queue;
mod record;
mod traits;

pub use filesystem::JsonFileStore;
pub use queue::ReviewQueue;
pub use record::{ReviewEntry, ReviewId, ReviewRef, ReviewStatus};
pub use traits::{MemoryStore, ReviewStore};
