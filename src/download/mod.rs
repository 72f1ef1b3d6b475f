/// Download backend trait, events, and the HTTP implementation
pub mod service;
/// Per-model download state machines
pub mod tracker;

pub use service::{
    DownloadErrorReason, DownloadEvent, DownloadService, HttpDownloadService, ModelStatus,
};
pub use tracker::{DownloadStatus, ModelDownloadState, ModelDownloadTracker};
