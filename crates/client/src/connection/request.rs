use std::cell::Cell;
use std::time::Duration;

use tokio::time::Instant;

use crate::connection::RequestProgress;

/// Records data-received notifications of a request.
///
/// Keeps the number of delivered chunks and the instant of the last one, which is
/// what a request-level idle timer needs to decide whether the exchange stalled.
#[derive(Debug, Default)]
pub struct RequestActivity {
    received_chunks: Cell<u64>,
    last_activity: Cell<Option<Instant>>,
}

impl RequestActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received_chunks(&self) -> u64 {
        self.received_chunks.get()
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity.get()
    }

    /// Time since the last chunk, `None` if nothing was received yet.
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_activity.get().map(|last| last.elapsed())
    }
}

impl RequestProgress for RequestActivity {
    fn data_received(&self) {
        self.received_chunks.set(self.received_chunks.get() + 1);
        self.last_activity.set(Some(Instant::now()));
    }
}
