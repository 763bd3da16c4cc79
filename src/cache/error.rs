use thiserror::Error;

/// Errors from the KV backend.
///
/// The response cache treats every one of these as a miss; they exist so
/// the backend can be traced and tested, not so callers can fail.
#[derive(Debug, Error)]
pub enum KvError {
    /// Backend unavailable or rejected the operation.
    #[error("kv backend error: {0}")]
    Backend(String),
}
