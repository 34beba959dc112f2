/// Why a relay session stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Termination {
    Completed,
    UpstreamError,
    ClientCancelled,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::UpstreamError => "upstream-error",
            Self::ClientCancelled => "client-cancelled",
        }
    }
}

/// Bookkeeping for one in-flight relay call.
///
/// Owned by the task pumping the upstream; dropped when that task returns.
#[derive(Debug, Default)]
pub struct RelaySession {
    bytes_received: usize,
    frames: usize,
    deltas_emitted: usize,
    termination: Option<Termination>,
}

impl RelaySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bytes(&mut self, n: usize) {
        self.bytes_received += n;
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    pub fn record_delta(&mut self) {
        self.deltas_emitted += 1;
    }

    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn deltas_emitted(&self) -> usize {
        self.deltas_emitted
    }

    pub fn is_open(&self) -> bool {
        self.termination.is_none()
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Record the terminal state. Only the first call has any effect; the
    /// stored reason is returned either way.
    pub fn finalize(&mut self, reason: Termination) -> Termination {
        *self.termination.get_or_insert(reason)
    }
}
