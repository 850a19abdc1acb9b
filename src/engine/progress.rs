// src/engine/progress.rs

use std::sync::atomic::{AtomicUsize, Ordering};

/// Processed/total account counter shared by the tasks of one pass.
#[derive(Debug, Default)]
pub struct Progress {
    processed: AtomicUsize,
    total: AtomicUsize,
}

impl Progress {
    pub fn reset(&self, total: usize) {
        self.processed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    /// Count one more processed account and return the new value.
    pub fn increment(&self) -> usize {
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}
