pub mod generation;

pub use generation::{Job, JobStatus, JobUpdate, NewJob, StatusCounts};
