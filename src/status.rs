//! Process-scoped service status.
//!
//! Holds the process start instant and the shared request counter. The
//! counter is the only mutable state shared between requests; it is a
//! single atomic so concurrent increments are never lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::models::Status;

#[derive(Debug)]
pub struct ServiceStatus {
    started: Instant,
    requests: AtomicU64,
    data_as_of: String,
}

impl ServiceStatus {
    pub fn new(data_as_of: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            data_as_of: data_as_of.into(),
        }
    }

    /// Counts one received request and returns its sequence number.
    pub fn record_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn requests_served(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Status {
        Status {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime: self.started.elapsed().as_millis() as u64,
            data_as_of: self.data_as_of.clone(),
            requests_served: self.requests_served(),
        }
    }
}
