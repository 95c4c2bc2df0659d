//! Newline framing for worker output.

use tracing::warn;

const FRAMING_TARGET: &str = "fleet_packages::protocol";

/// Longest line accepted from a worker, newline excluded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reassembles newline-terminated lines from arbitrarily split reads.
///
/// Carriage returns before the newline are dropped, invalid UTF-8 is
/// replaced and blank lines are skipped. Bytes after the last newline stay
/// buffered until the rest of the line arrives. A line growing past
/// [`MAX_LINE_BYTES`] is dropped whole, up to and including its newline.
///
/// Each pushed byte is examined once, however the line is split.
///
/// # Example
///
/// ```
/// use fleet_packages::protocol::LineDecoder;
///
/// let mut decoder = LineDecoder::new();
/// assert!(decoder.push(b"{\"id\":").is_empty());
/// assert_eq!(decoder.push(b"1}\r\n{\"id\":2}\n"), ["{\"id\":1}", "{\"id\":2}"]);
/// ```
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Set while the remainder of an oversized line is skipped.
    discarding: bool,
}

impl LineDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    /// Appends `chunk` and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for piece in chunk.split_inclusive(|byte| *byte == b'\n') {
            let Some(content) = piece.strip_suffix(b"\n") else {
                self.append(piece);
                continue;
            };
            self.append(content);
            if let Some(line) = self.take_line() {
                lines.push(line);
            }
        }
        lines
    }

    /// Returns the number of bytes waiting for a newline.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.discarding {
            return;
        }
        if self.buffer.len().saturating_add(bytes.len()) > MAX_LINE_BYTES {
            warn!(
                target: FRAMING_TARGET,
                limit = MAX_LINE_BYTES,
                "worker output line too long, discarding it"
            );
            self.buffer.clear();
            self.discarding = true;
            return;
        }
        self.buffer.extend_from_slice(bytes);
    }

    fn take_line(&mut self) -> Option<String> {
        let keep = !std::mem::replace(&mut self.discarding, false);
        let line = keep.then(|| decode(&self.buffer)).flatten();
        self.buffer.clear();
        line
    }
}

fn decode(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches('\r');
    (!line.trim().is_empty()).then(|| line.to_owned())
}
