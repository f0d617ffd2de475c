//! Identifier generation: request ids and the persistent application id.

use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Next process-unique request id (decimal, starting at "1").
pub fn next_request_id() -> String {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// Fresh application id, persisted by the client on first start.
pub fn new_app_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
