use crate::buffer::RequestLogBuffer;
use crate::error::EncodeError;
use crate::record::{LogRow, LogValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Response header carrying the encoded payload.
pub const HEADER_NAME: &str = "X-ChromeLogger-Data";

/// Wire format version understood by the browser extension.
pub const VERSION: u32 = 1;

pub const COLUMNS: [&str; 3] = ["log", "backtrace", "type"];

/// Default cap on the header value, in bytes.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 240 * 1024;

const EMPTY_PAYLOAD: &str = r#"{"version":1,"columns":["log","backtrace","type"],"rows":[]}"#;

/// Versioned structure serialized into the header.
#[derive(Debug, Serialize)]
pub struct EncodedPayload<'a> {
    pub version: u32,
    pub columns: [&'static str; 3],
    pub rows: &'a [LogRow],
}

/// Payload read back from a header value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecodedPayload {
    pub version: u32,
    pub columns: Vec<String>,
    pub rows: Vec<(Vec<serde_json::Value>, Option<String>, String)>,
}

/// Turns captured rows into a header value.
///
/// **Size policy**
///
/// When the encoded value would be longer than `max_header_bytes`, the
/// newest rows are dropped and a single `warn` row reporting how many
/// were omitted is appended in their place. A cap of `0` disables the
/// limit.
#[derive(Debug, Clone)]
pub struct WireEncoder {
    pub max_header_bytes: usize,
}

impl Default for WireEncoder {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl WireEncoder {
    pub fn new(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }

    /// Encode the buffer's rows and clear it. Never fails: on a
    /// serialization error the empty payload is returned instead.
    pub fn encode(&self, buffer: &mut RequestLogBuffer) -> String {
        let rows = buffer.take_rows();
        match self.encode_rows(&rows) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(target: "chromelogger", error = %e, "falling back to empty log payload");
                empty_header_value()
            }
        }
    }

    /// Encode `rows`, applying the size policy.
    pub fn encode_rows(&self, rows: &[LogRow]) -> Result<String, EncodeError> {
        let json = serialize(rows)?;
        if self.max_header_bytes == 0 || base64_len(json.len()) <= self.max_header_bytes {
            return Ok(to_header_value(&json));
        }
        self.encode_truncated(rows)
    }

    fn encode_truncated(&self, rows: &[LogRow]) -> Result<String, EncodeError> {
        let empty_len = EMPTY_PAYLOAD.len();
        let row_lens = rows
            .iter()
            .map(|row| serde_json::to_vec(row).map(|v| v.len()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(EncodeError::Serialize)?;

        // prefix[k] = bytes taken by the first k rows, separators included.
        let mut prefix = Vec::with_capacity(rows.len() + 1);
        prefix.push(0usize);
        for (i, len) in row_lens.iter().enumerate() {
            let sep = usize::from(i > 0);
            prefix.push(prefix[i] + len + sep);
        }

        for kept in (0..rows.len()).rev() {
            let marker = omitted_row(rows.len() - kept, self.max_header_bytes);
            let marker_len = serde_json::to_vec(&marker)
                .map_err(EncodeError::Serialize)?
                .len();
            let total = empty_len + prefix[kept] + usize::from(kept > 0) + marker_len;
            if base64_len(total) <= self.max_header_bytes {
                let mut out = rows[..kept].to_vec();
                out.push(marker);
                let json = serialize(&out)?;
                return Ok(to_header_value(&json));
            }
        }

        Ok(empty_header_value())
    }
}

/// Header value for a payload with no rows.
pub fn empty_header_value() -> String {
    to_header_value(EMPTY_PAYLOAD.as_bytes())
}

/// Decode a header value back into its payload.
pub fn decode_header(value: &str) -> Result<DecodedPayload, EncodeError> {
    let bytes = STANDARD.decode(value.trim())?;
    let payload: DecodedPayload = serde_json::from_slice(&bytes).map_err(EncodeError::Json)?;
    if payload.version != VERSION {
        return Err(EncodeError::Version(payload.version));
    }
    Ok(payload)
}

fn serialize(rows: &[LogRow]) -> Result<Vec<u8>, EncodeError> {
    let payload = EncodedPayload {
        version: VERSION,
        columns: COLUMNS,
        rows,
    };
    serde_json::to_vec(&payload).map_err(EncodeError::Serialize)
}

fn to_header_value(json: &[u8]) -> String {
    let mut value = STANDARD.encode(json);
    // Header values must stay on one line.
    value.retain(|c| c != '\n' && c != '\r');
    value
}

fn base64_len(n: usize) -> usize {
    n.div_ceil(3) * 4
}

fn omitted_row(omitted: usize, limit: usize) -> LogRow {
    LogRow {
        entry: vec![LogValue::Str(format!(
            "chromelogger: {} rows omitted, header limit {} bytes",
            omitted, limit
        ))],
        backtrace: None,
        label: "warn",
    }
}
