//! Write-serialization queue — single-writer admission control.
//!
//! Every writer (block processing, cementing, pruning, test harnesses)
//! acquires the queue before opening a write transaction and releases it on
//! scope exit. Waiters are served FIFO, so cementing and rollback/process
//! can never interleave within the same account at the storage layer.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Named writer roles, one slot each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Writer {
    /// Ordinary block processing (validate + apply).
    ProcessBatch,
    /// Confirmation-height cementing.
    ConfirmationHeight,
    Pruning,
    /// Test harnesses driving the ledger directly.
    Testing,
}

/// FIFO admission gate over the single storage writer.
pub struct WriteQueue {
    waiting: Mutex<VecDeque<Writer>>,
    condvar: Condvar,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self {
            waiting: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        }
    }

    /// Block until `writer` holds the writer slot. A role may only wait once
    /// at a time.
    pub fn wait(&self, writer: Writer) -> WriteGuard<'_> {
        let mut waiting = self.waiting.lock().expect("write queue lock poisoned");
        debug_assert!(!waiting.contains(&writer), "{writer:?} is already queued");
        waiting.push_back(writer);
        while waiting.front() != Some(&writer) {
            waiting = self
                .condvar
                .wait(waiting)
                .expect("write queue lock poisoned");
        }
        WriteGuard {
            queue: self,
            writer,
        }
    }

    /// Whether `writer` currently holds or awaits the writer slot.
    pub fn contains(&self, writer: Writer) -> bool {
        self.waiting
            .lock()
            .expect("write queue lock poisoned")
            .contains(&writer)
    }

    fn release(&self, writer: Writer) {
        let mut waiting = self.waiting.lock().expect("write queue lock poisoned");
        debug_assert_eq!(waiting.front(), Some(&writer), "released out of order");
        waiting.retain(|w| *w != writer);
        self.condvar.notify_all();
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the writer slot; released on drop.
pub struct WriteGuard<'a> {
    queue: &'a WriteQueue,
    writer: Writer,
}

impl WriteGuard<'_> {
    pub fn writer(&self) -> Writer {
        self.writer
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.queue.release(self.writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_is_released_on_drop() {
        let queue = WriteQueue::new();
        {
            let guard = queue.wait(Writer::Testing);
            assert_eq!(guard.writer(), Writer::Testing);
            assert!(queue.contains(Writer::Testing));
        }
        assert!(!queue.contains(Writer::Testing));
    }

    #[test]
    fn contains_reports_waiters() {
        let queue = Arc::new(WriteQueue::new());
        let _guard = queue.wait(Writer::ProcessBatch);

        let queue2 = Arc::clone(&queue);
        let waiter = thread::spawn(move || {
            let _guard = queue2.wait(Writer::ConfirmationHeight);
        });
        // Give the second thread time to enqueue behind us.
        for _ in 0..100 {
            if queue.contains(Writer::ConfirmationHeight) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(queue.contains(Writer::ConfirmationHeight));
        drop(_guard);
        waiter.join().unwrap();
        assert!(!queue.contains(Writer::ConfirmationHeight));
    }

    #[test]
    fn writers_are_serialized_fifo() {
        let queue = Arc::new(WriteQueue::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for writer in [Writer::ProcessBatch, Writer::ConfirmationHeight, Writer::Pruning] {
            let queue = Arc::clone(&queue);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                for _ in 0..20 {
                    let _guard = queue.wait(writer);
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_micros(200));
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1, "two writers were active at once");
    }
}
