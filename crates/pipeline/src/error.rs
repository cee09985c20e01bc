/// Failures that retain the session queue for a retry on the next pass.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("model call failed: {source}")]
    Model {
        #[source]
        source: anyhow::Error,
    },

    /// Every segment failed to send. A partial delivery (at least one segment
    /// out) is not an error; redelivering the whole turn would duplicate the
    /// segments that did arrive.
    #[error("delivery failed for all {attempted} segments")]
    DeliveryFailed { attempted: usize },
}

impl ProcessError {
    pub fn model(source: anyhow::Error) -> Self {
        Self::Model { source }
    }
}
