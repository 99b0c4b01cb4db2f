// Job store, worker pool and the import pipeline they run

pub mod error_log;
pub mod jobs;
pub mod pipeline;
pub mod workers;

pub use error_log::{ErrorLog, ErrorRecord};
pub use jobs::{JobOutcome, JobStatus, JobStatusView, JobStore, QueueCounts};
pub use pipeline::ImportPipeline;
pub use workers::ImportService;
