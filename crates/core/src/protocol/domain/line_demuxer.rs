/// Splits a raw byte stream into newline-terminated lines.
///
/// Bytes after the last newline are carried over to the next `feed`, so a
/// message split across reads comes out whole. Buffering happens on bytes,
/// not text, which keeps multi-byte UTF-8 sequences intact across chunks.
#[derive(Debug, Default)]
pub struct LineDemuxer {
    carry: Vec<u8>,
    max_line_len: Option<usize>,
}

impl LineDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the carry-over buffer. A partial line growing past `max` bytes
    /// is discarded rather than buffered without bound.
    pub fn with_max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = Some(max.max(1));
        self
    }

    /// Appends `chunk` and returns every line it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.carry[start..end]));
            start = end + 1;
        }
        self.carry.drain(..start);

        if let Some(max) = self.max_line_len {
            if self.carry.len() > max {
                log::warn!(
                    "Discarding {} buffered bytes: line exceeds {max} bytes",
                    self.carry.len()
                );
                self.carry.clear();
            }
        }

        lines
    }

    /// Number of bytes waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    /// Drops any partial line.
    pub fn reset(&mut self) {
        self.carry.clear();
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
