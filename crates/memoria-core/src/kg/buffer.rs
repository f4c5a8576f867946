//! Write-behind buffer for high-frequency knowledge-graph mutations (node
//! upserts, edge upserts, action-effectiveness upserts). Production mode
//! batches and flushes on an interval; test mode flushes every push so
//! assertions can run immediately after a call returns.

use std::sync::Mutex;

pub struct WriteBuffer<T> {
    items: Mutex<Vec<T>>,
    test_mode: bool,
}

impl<T> WriteBuffer<T> {
    pub fn new(test_mode: bool) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            test_mode,
        }
    }

    /// Appends `item`. Returns `true` when the caller should flush
    /// immediately (test mode), `false` when it's safe to let the item sit
    /// until the next interval flush.
    pub fn push(&self, item: T) -> bool {
        self.items.lock().unwrap().push(item);
        self.test_mode
    }

    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut self.items.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }
}
