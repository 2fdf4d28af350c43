//! HTTP plumbing for talking to the hosting API.

mod client;
mod retry;

pub use client::{Credentials, Download, HttpClient};
pub use retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};
