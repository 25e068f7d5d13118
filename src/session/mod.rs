use anyhow::Result;
use std::io::{self, BufRead, Write};

use crate::error::ErrorBody;
use crate::models::request::RadarRequest;

/// Maximum line size for session input: 100 MB.
const MAX_LINE_SIZE: usize = 100 * 1024 * 1024;

/// Run an NDJSON streaming session: read requests from stdin, process, write responses to stdout.
pub fn run_session(handler: impl Fn(RadarRequest) -> Result<serde_json::Value>) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_session_with(stdin.lock(), stdout.lock(), handler)
}

/// Session loop over arbitrary streams. One response line per request line,
/// in request order; a failing request never ends the session.
pub fn run_session_with<R, W>(
    input: R,
    output: W,
    handler: impl Fn(RadarRequest) -> Result<serde_json::Value>,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut out = io::BufWriter::new(output);

    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let value = if trimmed.len() > MAX_LINE_SIZE {
            error_value(
                "INVALID_REQUEST",
                &format!(
                    "Input line exceeds maximum size ({} bytes > {} bytes)",
                    trimmed.len(),
                    MAX_LINE_SIZE
                ),
            )
        } else {
            match serde_json::from_str::<RadarRequest>(trimmed) {
                Ok(req) => handler(req).unwrap_or_else(|e| {
                    let body = ErrorBody::from(&e);
                    error_value(&body.code, &body.message)
                }),
                Err(e) => error_value("INVALID_REQUEST", &format!("Invalid JSON request: {e}")),
            }
        };

        serde_json::to_writer(&mut out, &value)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }

    Ok(())
}

pub fn error_value(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "error": { "code": code, "message": message } })
}
