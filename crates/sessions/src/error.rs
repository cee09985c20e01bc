/// Crate-wide result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed session-registry errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The registry is at its session cap and the message came from a user
    /// with no live session. Recoverable: the transport should answer the
    /// platform with a transient-failure signal so it retries later.
    #[error("session capacity reached ({max} sessions)")]
    CapacityExceeded { max: usize },
}
