//! Suppression of the upstream's copies of our own image uploads.
//!
//! Skype delivers an image we uploaded back to us as an ordinary inbound
//! image event. The only thing correlating the two is the file name, so
//! every outbound upload records its name here before the transfer starts
//! and the first inbound image with that name is swallowed.
//!
//! Names form a multiset: two uploads of `cat.png` need two echoes to drain.
//! Entries whose echo never arrives stay until the process exits.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Pending self-sent file names.
#[derive(Debug, Default)]
pub struct EchoSuppressor {
    pending: Mutex<Vec<String>>,
}

impl EchoSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upload that is about to be issued.
    pub fn register(&self, filename: &str) {
        let mut pending = self.lock();
        pending.push(filename.to_string());
        debug!(filename, pending = pending.len(), "Registered outbound image");
    }

    /// Consume one pending entry for `filename`.
    ///
    /// Returns `true` if the inbound image is our own echo.
    pub fn try_consume(&self, filename: &str) -> bool {
        let mut pending = self.lock();
        match pending.iter().position(|f| f == filename) {
            Some(index) => {
                pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Undo a registration whose upload failed and will never be echoed.
    pub fn rollback(&self, filename: &str) {
        if self.try_consume(filename) {
            debug!(filename, "Rolled back outbound image registration");
        }
    }

    /// Number of pending entries for `filename`.
    pub fn pending_count(&self, filename: &str) -> usize {
        self.lock().iter().filter(|f| *f == filename).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
