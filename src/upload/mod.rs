//! Filesystem side of an upload: turning a directory tree into jobs and
//! writing those jobs to a destination.

pub mod local;
pub mod tree;

pub use local::{LocalUploader, UploadError};
pub use tree::{collect_jobs, UploadEntry};
