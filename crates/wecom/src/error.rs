use huddle_common::FromMessage;

/// Crate-wide result type for WeCom operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    /// The callback body was not a well-formed envelope.
    #[error("invalid callback envelope: {source}")]
    Envelope {
        #[from]
        source: quick_xml::DeError,
    },

    /// The platform API answered with a non-zero error code.
    #[error("wecom api error {errcode}: {errmsg}")]
    Api { errcode: i64, errmsg: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("wecom credentials not configured: {missing}")]
    MissingCredentials { missing: &'static str },
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

huddle_common::impl_context!();
