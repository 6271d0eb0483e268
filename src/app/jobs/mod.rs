//! Download job tracking
//!
//! Jobs are submitted for listing entries, run in a bounded pool of background
//! tasks and observed by polling:
//!
//! - `types`: [`JobId`], the [`JobStatus`] state machine, [`DownloadJob`]
//!   snapshots and submission options
//! - `tracker`: the [`JobTracker`] registry that runs jobs and commits results

pub mod tracker;
pub mod types;

pub use tracker::JobTracker;
pub use types::{DownloadJob, JobId, JobStatus, SubmitOptions, TrackerConfig};
