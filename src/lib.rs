pub mod record;
pub mod format;
pub mod buffer;
pub mod context;
pub mod layer;
pub mod encode;
pub mod middleware;
pub mod error;

#[cfg(feature = "tower")]
pub mod service;

pub mod init;
pub mod env;

pub use encode::{decode_header, WireEncoder, HEADER_NAME};
pub use init::{init_tracing, init_tracing_with_config, CaptureConfig};
pub use error::{CaptureError, HandlerFailed};
pub use layer::ChromeLoggerLayer;
pub use middleware::{CaptureMiddleware, DeferredStart, StartResponse};
