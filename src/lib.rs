//! Client-side synchronization for an AI-assisted backlog tracker: job
//! status polling, retried document indexing and a cached, organized view
//! of each project's work item hierarchy.

pub mod backlog;
pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;

pub use error::{SyncError, SyncResult};
