//! Utility modules.

pub mod file;
pub mod retry;

pub use file::{calculate_checksum, calculate_file_checksum, write_atomic};
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
