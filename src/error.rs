use thiserror::Error;

/// Errors that can occur during publish/subscribe operations
#[derive(Error, Debug)]
pub enum Error {
    /// A point-to-point operation was attempted on a facade with no bound
    /// direct client
    #[error("no underlying direct client bound to this facade")]
    NoUnderlyingClient,

    /// Construction was given a direct client that holds no raw connection
    #[error("direct client has no underlying connection")]
    EmptyConnection,

    /// Payload marshalling failed
    #[error("encoding error: {0}")]
    Encoding(Box<dyn std::error::Error + Send + Sync>),

    /// Payload unmarshalling failed
    #[error("decoding error: {0}")]
    Decoding(Box<dyn std::error::Error + Send + Sync>),

    /// Opaque error surfaced verbatim from a transport collaborator
    #[error("transport error: {0}")]
    Transport(String),

    /// Request or probe timed out waiting for a reply
    #[error("request timed out")]
    Timeout,

    /// Subject failed boundary validation (e.g. empty string)
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    /// Both the durable layer and the direct layer failed to close.
    ///
    /// Both underlying messages are preserved; neither failure masks
    /// the other.
    #[error("close failed: durable layer: {durable}; direct layer: {direct}")]
    CombinedClose {
        durable: Box<Error>,
        direct: Box<Error>,
    },
}

impl Error {
    /// Wrap a marshalling failure.
    pub fn encoding(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Encoding(Box::new(err))
    }

    /// Wrap an unmarshalling failure.
    pub fn decoding(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Decoding(Box::new(err))
    }

    /// Wrap an opaque transport failure.
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }
}

/// Result type alias for facade operations
pub type Result<T> = std::result::Result<T, Error>;
