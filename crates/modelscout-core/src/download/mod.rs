//! Verified resumable downloads.

pub mod engine;
pub mod hashing;
pub mod retry;

pub use engine::{DownloadEngine, DownloadJob, DownloadOutcome, JobStatus, ProgressSnapshot};
pub use hashing::{ExpectedHash, HashAlgorithm};
pub use retry::RetryPolicy;
