//! `tower` middleware attaching captured records to `http` responses.

use crate::context;
use crate::encode::WireEncoder;
use crate::error::HandlerFailed;
use crate::init::CaptureConfig;
use crate::middleware::append_log_header;
use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer wrapping services with [`CaptureService`].
#[derive(Clone, Debug, Default)]
pub struct CaptureLayer {
    encoder: WireEncoder,
}

impl CaptureLayer {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            encoder: config.encoder(),
        }
    }
}

impl<S> Layer<S> for CaptureLayer {
    type Service = CaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureService {
            inner,
            encoder: self.encoder.clone(),
        }
    }
}

/// Runs each request inside its own task-local capture scope and appends
/// an `X-ChromeLogger-Data` header to the response.
///
/// The inner service's `call` runs inside the scope too, so records
/// logged before its future is first polled are kept. The response body
/// is passed through untouched. On error the records are still encoded
/// and returned next to the inner error in [`HandlerFailed`].
#[derive(Clone, Debug)]
pub struct CaptureService<S> {
    inner: S,
    encoder: WireEncoder,
}

pub type CaptureFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CaptureService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: 'static,
{
    type Response = Response<ResBody>;
    type Error = HandlerFailed<S::Error>;
    type Future = CaptureFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(|error| HandlerFailed {
            error,
            log_header: crate::encode::empty_header_value(),
        })
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Keep the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let encoder = self.encoder.clone();

        Box::pin(context::scope(async move {
            let result = inner.call(req).await;
            let header_value = context::encode_current(&encoder);
            match result {
                Ok(mut response) => {
                    append_log_header(response.headers_mut(), &header_value);
                    Ok(response)
                }
                Err(error) => Err(HandlerFailed {
                    error,
                    log_header: header_value,
                }),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::decode_header;
    use crate::layer::ChromeLoggerLayer;
    use crate::middleware::CHROMELOGGER_DATA;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn install() -> tracing::subscriber::DefaultGuard {
        let subscriber = Registry::default().with(ChromeLoggerLayer::default());
        tracing::subscriber::set_default(subscriber)
    }

    fn decoded<B>(response: &Response<B>) -> crate::encode::DecodedPayload {
        let value = response.headers().get(CHROMELOGGER_DATA).unwrap();
        decode_header(value.to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn response_carries_records_of_its_request() {
        let _guard = install();
        let svc = CaptureLayer::default().layer(service_fn(|req: Request<()>| async move {
            let path = req.uri().path().to_string();
            tracing::info!(path, "serving %s");
            tokio::task::yield_now().await;
            tracing::warn!("slow");
            Ok::<_, Infallible>(Response::new("body"))
        }));

        let req = Request::get("/users").body(()).unwrap();
        let response = svc.oneshot(req).await.unwrap();

        assert_eq!(*response.body(), "body");
        let payload = decoded(&response);
        assert_eq!(payload.rows.len(), 2);
        assert_eq!(
            payload.rows[0].0,
            vec![
                serde_json::json!("serving "),
                serde_json::json!("/users"),
                serde_json::json!("")
            ]
        );
        assert_eq!(payload.rows[1].2, "warn");
    }

    #[tokio::test]
    async fn existing_headers_are_kept() {
        let _guard = install();
        let svc = CaptureLayer::default().layer(service_fn(|_: Request<()>| async {
            let response = Response::builder()
                .header("content-type", "application/json")
                .body("{}")
                .unwrap();
            Ok::<_, Infallible>(response)
        }));

        let response = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(response.headers()["content-type"], "application/json");
        assert!(decoded(&response).rows.is_empty());
    }

    #[tokio::test]
    async fn interleaved_requests_do_not_share_rows() {
        let _guard = install();
        let svc = CaptureLayer::default().layer(service_fn(|req: Request<&'static str>| async move {
            let who = *req.body();
            for _ in 0..3 {
                tracing::info!(who, "from %s");
                tokio::task::yield_now().await;
            }
            Ok::<_, Infallible>(Response::new(who))
        }));

        let (a, b) = tokio::join!(
            svc.clone().oneshot(Request::new("a")),
            svc.clone().oneshot(Request::new("b")),
        );
        for response in [a.unwrap(), b.unwrap()] {
            let who = *response.body();
            let payload = decoded(&response);
            assert_eq!(payload.rows.len(), 3);
            assert!(payload.rows.iter().all(|row| row.0[1] == serde_json::json!(who)));
            assert!(payload.rows[0].1.is_some());
            assert!(payload.rows[1..].iter().all(|row| row.1.is_none()));
        }
    }

    #[tokio::test]
    async fn inner_error_carries_its_records() {
        let _guard = install();
        let svc = CaptureLayer::default().layer(service_fn(|_: Request<()>| async {
            tracing::error!("about to fail");
            Err::<Response<()>, _>("upstream refused")
        }));

        let err = svc.oneshot(Request::new(())).await.unwrap_err();
        assert_eq!(err.error, "upstream refused");
        assert!(!context::is_capturing());

        let flushed = decode_header(&err.log_header).unwrap();
        assert_eq!(flushed.rows.len(), 1);
        assert_eq!(flushed.rows[0].0, vec![serde_json::json!("about to fail")]);
        assert_eq!(flushed.rows[0].2, "error");
    }
}
