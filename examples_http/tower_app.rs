use std::convert::Infallible;

use chromelogger::decode_header;
use chromelogger::init::{init_tracing_with_config, CaptureConfig};
use chromelogger::middleware::CHROMELOGGER_DATA;
use chromelogger::service::CaptureLayer;
use http::{Request, Response};
use tower::{service_fn, Layer, ServiceExt};
use tracing::{error, info};

async fn handler(req: Request<()>) -> Result<Response<&'static str>, Infallible> {
    let path = req.uri().path().to_string();
    info!(path, "GET %s");
    error!(code = 503u64, "backend %s unavailable");
    Ok(Response::new("ok"))
}

#[tokio::main]
async fn main() {
    let config = CaptureConfig::from_env().expect("read CHROMELOGGER_* variables");
    init_tracing_with_config(&config).expect("install subscriber");

    let svc = CaptureLayer::new(&config).layer(service_fn(handler));
    let response = svc
        .oneshot(Request::get("/orders/42").body(()).expect("request"))
        .await
        .expect("infallible");

    let value = response.headers().get(CHROMELOGGER_DATA).expect("log header");
    println!("{}: {}", CHROMELOGGER_DATA, value.to_str().unwrap_or_default());
    println!("{:#?}", decode_header(value.to_str().unwrap_or_default()));
}
