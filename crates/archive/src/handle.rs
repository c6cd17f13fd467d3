//! ArchiveHandle - runs a sink on its own thread behind a bounded queue
//!
//! Producers call [`ArchiveHandle::try_send`], which never blocks: when the
//! queue is full the record is dropped and counted. A stalled disk can
//! therefore never slow down acquisition.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use async_channel::{bounded, Receiver, Sender, TrySendError};
use observability::{record_archive_dropped, record_archive_write};
use tracing::{debug, error, instrument, trace, warn};

use crate::metrics::ArchiveMetrics;
use crate::sink::ArchiveSink;
use crate::ArchiveError;

/// Handle to a running archive writer
pub struct ArchiveHandle<R> {
    name: String,
    tx: Sender<R>,
    metrics: Arc<ArchiveMetrics>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Send + 'static> ArchiveHandle<R> {
    /// Start the writer thread for `sink`
    pub fn spawn<S>(sink: S, queue_capacity: usize) -> Result<Self, ArchiveError>
    where
        S: ArchiveSink<Record = R>,
    {
        let name = sink.name().to_string();
        let (tx, rx) = bounded(queue_capacity.max(1));
        let metrics = Arc::new(ArchiveMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker = thread::Builder::new()
            .name(format!("archive-{name}"))
            .spawn(move || writer_loop(sink, rx, worker_metrics))
            .map_err(|e| ArchiveError::Spawn {
                sink: name.clone(),
                message: e.to_string(),
            })?;

        debug!(sink = %name, capacity = queue_capacity, "archive writer started");

        Ok(Self {
            name,
            tx,
            metrics,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared counters
    pub fn metrics(&self) -> &Arc<ArchiveMetrics> {
        &self.metrics
    }

    /// Queue a record without blocking
    ///
    /// Returns `false` if the record was dropped (queue full or closed).
    pub fn try_send(&self, record: R) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.metrics.set_queue_len(self.tx.len());
                true
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.inc_dropped_count();
                record_archive_dropped(&self.name);
                trace!(sink = %self.name, "archive queue full, record dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(sink = %self.name, "archive writer closed, record dropped");
                false
            }
        }
    }

    /// Close the queue, let the writer drain it and join the thread
    #[instrument(name = "archive_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub fn shutdown(&self) {
        self.tx.close();

        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!(sink = %self.name, "archive writer panicked");
            }
        }
        debug!(sink = %self.name, "archive writer stopped");
    }
}

impl<R> Drop for ArchiveHandle<R> {
    fn drop(&mut self) {
        // The writer drains what is queued and exits on its own
        self.tx.close();
    }
}

fn writer_loop<S: ArchiveSink>(mut sink: S, rx: Receiver<S::Record>, metrics: Arc<ArchiveMetrics>) {
    let name = sink.name().to_string();
    debug!(sink = %name, "archive writer loop started");

    while let Ok(record) = rx.recv_blocking() {
        metrics.set_queue_len(rx.len());

        match sink.write(&record) {
            Ok(true) => {
                metrics.inc_write_count();
                record_archive_write(&name, true);
            }
            Ok(false) => {
                metrics.inc_failure_count();
                record_archive_write(&name, false);
            }
            Err(e) => {
                metrics.inc_failure_count();
                record_archive_write(&name, false);
                error!(sink = %name, error = %e, "archive write failed");
            }
        }
    }

    if let Err(e) = sink.flush() {
        error!(sink = %name, error = %e, "archive flush failed on shutdown");
    }
    debug!(sink = %name, "archive writer loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct CountingSink {
        written: Arc<AtomicU64>,
        delay: Duration,
        fail: bool,
    }

    impl ArchiveSink for CountingSink {
        type Record = u32;

        fn name(&self) -> &str {
            "counting"
        }

        fn write(&mut self, _record: &u32) -> Result<bool, ArchiveError> {
            thread::sleep(self.delay);
            if self.fail {
                return Err(ArchiveError::write("counting", "disk full"));
            }
            self.written.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        }

        fn flush(&mut self) -> Result<(), ArchiveError> {
            Ok(())
        }
    }

    fn sink(delay_ms: u64, fail: bool) -> (CountingSink, Arc<AtomicU64>) {
        let written = Arc::new(AtomicU64::new(0));
        let sink = CountingSink {
            written: Arc::clone(&written),
            delay: Duration::from_millis(delay_ms),
            fail,
        };
        (sink, written)
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let (sink, written) = sink(0, false);
        let handle = ArchiveHandle::spawn(sink, 16).unwrap();

        for i in 0..10 {
            assert!(handle.try_send(i));
        }
        handle.shutdown();

        assert_eq!(written.load(Ordering::Relaxed), 10);
        assert_eq!(handle.metrics().write_count(), 10);
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (sink, _written) = sink(50, false);
        let handle = ArchiveHandle::spawn(sink, 2).unwrap();

        let accepted = (0..20).filter(|i| handle.try_send(*i)).count();

        assert!(accepted < 20);
        assert_eq!(handle.metrics().dropped_count(), (20 - accepted) as u64);
        handle.shutdown();
    }

    #[test]
    fn test_write_failures_are_isolated() {
        let (sink, _written) = sink(0, true);
        let handle = ArchiveHandle::spawn(sink, 8).unwrap();

        for i in 0..3 {
            handle.try_send(i);
        }
        handle.shutdown();

        assert_eq!(handle.metrics().failure_count(), 3);
    }

    #[test]
    fn test_send_after_shutdown_is_rejected() {
        let (sink, _written) = sink(0, false);
        let handle = ArchiveHandle::spawn(sink, 8).unwrap();
        handle.shutdown();

        assert!(!handle.try_send(1));
    }
}
