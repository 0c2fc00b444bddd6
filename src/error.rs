/// Errors produced while building or reading the header payload.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("failed to serialize log payload: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("header value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("header payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("unsupported payload version {0}")]
    Version(u32),
}

/// A wrapped handler or service failed.
///
/// Records logged before the failure are still flushed: `log_header`
/// holds the encoded `X-ChromeLogger-Data` value so the host's error
/// response can carry it.
#[derive(thiserror::Error, Debug)]
#[error("request handler failed: {error}")]
pub struct HandlerFailed<E> {
    pub error: E,
    pub log_header: String,
}

impl<E> HandlerFailed<E> {
    /// Drop the captured records and keep the handler's own error.
    pub fn into_inner(self) -> E {
        self.error
    }
}

/// Failure of a request wrapped by [`crate::middleware::CaptureMiddleware`].
#[derive(thiserror::Error, Debug)]
pub enum CaptureError<E> {
    /// The wrapped handler failed; its error comes back with the flushed
    /// log header.
    #[error("{0}")]
    Handler(HandlerFailed<E>),
    /// Body bytes written before the response started could not be
    /// replayed to the transport.
    #[error("failed to replay buffered body bytes: {0}")]
    Replay(#[from] std::io::Error),
}

/// Error type returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}
