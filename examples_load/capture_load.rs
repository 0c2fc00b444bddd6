use std::time::Instant;
use tracing::info;

use chromelogger::context::capture_sync;
use chromelogger::env::env_or;
use chromelogger::init::{init_tracing_with_config, CaptureConfig};

fn main() {
    let config = CaptureConfig {
        enable_stdout: false,
        ..CaptureConfig::default()
    };
    let layer = init_tracing_with_config(&config).expect("install subscriber");
    let encoder = config.encoder();

    let requests: u64 = env_or("CAPTURE_LOAD_REQUESTS", "1000").parse().unwrap_or(1000);
    let per_request: u64 = env_or("CAPTURE_LOAD_EVENTS", "100").parse().unwrap_or(100);

    let start = Instant::now();
    let mut header_bytes = 0usize;
    for r in 0..requests {
        let (_, header) = capture_sync(&encoder, || {
            for i in 0..per_request {
                info!(r, i, "request %s event %s");
            }
        });
        header_bytes += header.len();
    }

    let elapsed = start.elapsed();
    let events = requests * per_request;
    println!(
        "captured {} events over {} requests in {:?} (~{:.0} ev/s, avg header {} bytes, failures {})",
        events,
        requests,
        elapsed,
        events as f64 / elapsed.as_secs_f64(),
        header_bytes / requests.max(1) as usize,
        layer.failed_events.load(std::sync::atomic::Ordering::Relaxed),
    );
}
