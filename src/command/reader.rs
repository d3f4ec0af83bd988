use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::buffer::{OutputBuffer, OutputLine, Severity};

/// Longest line kept from a stream; longer runs are split into several lines
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Which child stream a reader drains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    /// Severity attached to every line read from this stream
    pub fn severity(self) -> Severity {
        match self {
            StreamKind::Stdout => Severity::Normal,
            StreamKind::Stderr => Severity::Error,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Drains one process stream line by line into the output buffer
pub struct StreamReader<R> {
    kind: StreamKind,
    reader: BufReader<R>,
    buffer: Arc<OutputBuffer>,
}

impl<R> StreamReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(kind: StreamKind, stream: R, buffer: Arc<OutputBuffer>) -> Self {
        Self {
            kind,
            reader: BufReader::new(stream),
            buffer,
        }
    }

    /// Read until end-of-stream or the first read error
    ///
    /// Returns the number of lines appended. Lines longer than
    /// [`MAX_LINE_BYTES`] are split. A read error is reported as a single
    /// error line and ends the reader.
    pub async fn run(mut self) -> usize {
        let severity = self.kind.severity();
        let mut raw = Vec::new();
        let mut count = 0;
        loop {
            raw.clear();
            let mut limited = (&mut self.reader).take(MAX_LINE_BYTES as u64);
            match limited.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    self.buffer.append(OutputLine::new(severity, decode_line(&raw)));
                    count += 1;
                }
                Err(e) => {
                    warn!(stream = %self.kind, error = %e, "stream read failed");
                    self.buffer
                        .push_error(format!("Error reading {}: {}", self.kind, e));
                    break;
                }
            }
        }
        debug!(stream = %self.kind, lines = count, "stream closed");
        count
    }
}

/// Strip the line terminator and decode, replacing invalid UTF-8
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
