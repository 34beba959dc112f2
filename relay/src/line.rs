use tracing::warn;

/// Reassembles newline-delimited frames from arbitrarily split byte chunks.
///
/// Lines longer than the configured limit are discarded whole; the buffer then
/// resynchronises on the next newline.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
            overflowed: false,
        }
    }

    /// Feed one chunk and return every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.append(&rest[..pos]);
            if let Some(line) = self.take() {
                lines.push(line);
            }
            rest = &rest[pos + 1..];
        }
        self.append(rest);
        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() && !self.overflowed {
            return None;
        }
        self.take()
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.overflowed {
            return;
        }
        if self.pending.len() + bytes.len() > self.max_line {
            warn!(limit = self.max_line, "discarding oversized upstream line");
            self.pending.clear();
            self.overflowed = true;
            return;
        }
        self.pending.extend_from_slice(bytes);
    }

    fn take(&mut self) -> Option<Vec<u8>> {
        if std::mem::take(&mut self.overflowed) {
            self.pending.clear();
            return None;
        }
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }
}
