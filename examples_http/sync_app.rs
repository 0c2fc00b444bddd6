use std::io::{self, Write};

use chromelogger::middleware::{DeferredStart, StartResponse};
use chromelogger::{init_tracing, CaptureMiddleware};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{info, warn};

/// Writes the response to stdout the way a plain HTTP/1.1 server would.
struct Stdout;

impl StartResponse for Stdout {
    type Writer = io::Stdout;

    fn start(self, status: StatusCode, headers: HeaderMap) -> io::Stdout {
        let mut out = io::stdout();
        let _ = writeln!(out, "HTTP/1.1 {}", status);
        for (name, value) in &headers {
            let _ = writeln!(out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
        let _ = writeln!(out);
        out
    }
}

fn app(user: &str, start: &mut DeferredStart) -> io::Result<&'static str> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    let body = start.start(StatusCode::OK, headers);
    body.write_all(b"hello, ")?;

    info!(user, "User %s logged in");
    warn!(kw.user = user, kw.quota = 3u64, "quota low for %s");
    Ok("world\n")
}

fn main() -> io::Result<()> {
    init_tracing().expect("install subscriber");

    let middleware = CaptureMiddleware::new(app);
    let rest = middleware.call("alice", Stdout).expect("request failed");
    io::stdout().write_all(rest.as_bytes())
}
