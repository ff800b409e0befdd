//! Blocking Server-Sent Events reader
//!
//! Both vendor dialects stream over HTTP SSE. The reader runs on the bridge
//! worker thread, pulls one line at a time from the response body and yields
//! the JSON payload of every `data:` line.

use serde_json::Value;
use std::io::BufRead;
use tracing::warn;

use crate::Result;

/// Iterator over the JSON payloads of an SSE body
pub struct SseEvents<R> {
    reader: R,
    provider: String,
    line: String,
}

impl<R: BufRead> SseEvents<R> {
    pub fn new(reader: R, provider: impl Into<String>) -> Self {
        Self {
            reader,
            provider: provider.into(),
            line: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for SseEvents<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }

            let Some(data) = extract_sse_data(&self.line) else {
                continue;
            };

            match serde_json::from_str(data) {
                Ok(value) => return Some(Ok(value)),
                Err(e) => {
                    warn!(
                        provider = %self.provider,
                        error = %e,
                        data_preview = %data.chars().take(100).collect::<String>(),
                        "Failed to parse SSE data"
                    );
                }
            }
        }
    }
}

/// Payload of a `data:` line; `None` for comments, other fields, empty data
/// and the `[DONE]` marker
fn extract_sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data:")
        .map(str::trim)
        .filter(|d| !d.is_empty() && *d != "[DONE]")?;
    Some(data)
}
