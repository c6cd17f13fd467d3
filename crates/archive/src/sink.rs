//! ArchiveSink trait - a blocking record writer run on its own thread

use crate::ArchiveError;

/// Writer driven by an [`ArchiveHandle`](crate::ArchiveHandle)
///
/// Calls happen on the handle's dedicated thread only, so implementations
/// may block on disk I/O freely.
pub trait ArchiveSink: Send + 'static {
    /// Record type accepted by this sink
    type Record: Send + 'static;

    /// Sink name (logs and metric labels)
    fn name(&self) -> &str;

    /// Persist one record
    ///
    /// `Ok(false)` means the record was deliberately skipped.
    fn write(&mut self, record: &Self::Record) -> Result<bool, ArchiveError>;

    /// Flush buffered data to disk
    fn flush(&mut self) -> Result<(), ArchiveError>;
}
