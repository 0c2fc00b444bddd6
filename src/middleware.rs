//! Capture for handlers written against a start-response callback.
//!
//! The handler announces its status and headers through
//! [`DeferredStart::start`] and may write body bytes right away. Nothing
//! reaches the transport until the handler has returned: only then is
//! the log header known, appended to the announced headers, and the
//! response started for real. Early body bytes are replayed afterwards.

use crate::context::ThreadScope;
use crate::encode::WireEncoder;
use crate::error::{CaptureError, HandlerFailed};
use crate::init::CaptureConfig;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use std::io::Write;

/// Lower-cased name of the header carrying the payload.
pub const CHROMELOGGER_DATA: HeaderName = HeaderName::from_static("x-chromelogger-data");

/// The real transport's response-start operation.
pub trait StartResponse {
    /// Write surface for the response body.
    type Writer: Write;

    /// Send the status line and headers, returning the body writer.
    fn start(self, status: StatusCode, headers: HeaderMap) -> Self::Writer;
}

/// Capturing stand-in for [`StartResponse`] handed to the wrapped handler.
#[derive(Debug)]
pub struct DeferredStart {
    status: StatusCode,
    headers: HeaderMap,
    pending: Vec<u8>,
}

impl Default for DeferredStart {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            pending: Vec::new(),
        }
    }
}

impl DeferredStart {
    /// Record the response intent. The returned writer buffers body bytes
    /// until the real response has started. Calling it again replaces
    /// the recorded status and headers.
    pub fn start(&mut self, status: StatusCode, headers: HeaderMap) -> &mut Vec<u8> {
        self.status = status;
        self.headers = headers;
        &mut self.pending
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body bytes written so far.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

/// A request handler using the start-response contract.
pub trait Handler<Req> {
    type Body;
    type Error;

    fn call(&self, request: Req, start: &mut DeferredStart) -> Result<Self::Body, Self::Error>;
}

impl<Req, B, E, F> Handler<Req> for F
where
    F: Fn(Req, &mut DeferredStart) -> Result<B, E>,
{
    type Body = B;
    type Error = E;

    fn call(&self, request: Req, start: &mut DeferredStart) -> Result<B, E> {
        self(request, start)
    }
}

/// Wraps a [`Handler`] and attaches the records it logged to its response.
///
/// Each call runs on the caller's thread inside a fresh [`ThreadScope`].
/// The [`crate::layer::ChromeLoggerLayer`] must be part of the active
/// subscriber for records to be captured.
pub struct CaptureMiddleware<H> {
    handler: H,
    encoder: WireEncoder,
}

impl<H> CaptureMiddleware<H> {
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, &CaptureConfig::default())
    }

    pub fn with_config(handler: H, config: &CaptureConfig) -> Self {
        Self {
            handler,
            encoder: config.encoder(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Serve one request.
    ///
    /// **Returns** the handler's body unchanged. If the handler fails, the
    /// transport is left untouched and the handler's error is returned as
    /// [`CaptureError::Handler`] together with the encoded records, so the
    /// host can put them on its error response.
    pub fn call<Req, T>(&self, request: Req, transport: T) -> Result<H::Body, CaptureError<H::Error>>
    where
        H: Handler<Req>,
        T: StartResponse,
    {
        let scope = ThreadScope::enter();
        let mut deferred = DeferredStart::default();
        let result = self.handler.call(request, &mut deferred);
        let header_value = scope.finish(&self.encoder);
        let body = match result {
            Ok(body) => body,
            Err(error) => {
                return Err(CaptureError::Handler(HandlerFailed {
                    error,
                    log_header: header_value,
                }))
            }
        };

        let DeferredStart {
            status,
            mut headers,
            pending,
        } = deferred;
        append_log_header(&mut headers, &header_value);

        let mut writer = transport.start(status, headers);
        if !pending.is_empty() {
            writer.write_all(&pending)?;
        }
        Ok(body)
    }
}

/// Append the encoded payload under [`CHROMELOGGER_DATA`].
pub fn append_log_header(headers: &mut HeaderMap, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.append(CHROMELOGGER_DATA, value);
        }
        Err(e) => {
            tracing::debug!(target: "chromelogger", error = %e, "encoded log payload is not a valid header value");
        }
    }
}
