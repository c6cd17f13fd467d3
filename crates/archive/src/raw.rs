//! Raw packet archive
//!
//! Append-only binary file:
//!
//! ```text
//! magic   "L2RAW01\0"                      8 bytes
//! record  type u8 | reserved [u8; 3] | mono_ts_ns u64 | payload_size u32   (16 bytes, LE, packed)
//!         payload                                                         payload_size bytes
//! ```
//!
//! A logger that cannot open its file is disabled: every write becomes a
//! silent no-op so acquisition keeps running without an archive.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Local};
use contracts::{RawPacket, RawRecordType};
use tracing::{debug, info, warn};

use crate::sink::ArchiveSink;
use crate::ArchiveError;

/// File magic, including the trailing NUL
pub const RAW_MAGIC: [u8; 8] = *b"L2RAW01\0";

/// Size of the packed record header
pub const RECORD_HEADER_LEN: usize = 16;

/// One packet queued for the raw archive
#[derive(Debug, Clone)]
pub struct RawLogEntry {
    pub record_type: RawRecordType,
    /// Host monotonic receive time (ns)
    pub mono_ts_ns: u64,
    /// Size the packet claims for itself
    pub declared_size: u32,
    /// Bytes actually received
    pub payload: Bytes,
}

impl RawLogEntry {
    /// Entry whose declared size is the payload length
    pub fn new(record_type: RawRecordType, mono_ts_ns: u64, payload: Bytes) -> Self {
        Self {
            record_type,
            mono_ts_ns,
            declared_size: payload.len() as u32,
            payload,
        }
    }

    /// Entry keeping the size the packet header declared
    pub fn from_packet(record_type: RawRecordType, mono_ts_ns: u64, packet: RawPacket) -> Self {
        Self {
            record_type,
            mono_ts_ns,
            declared_size: packet.declared_size,
            payload: packet.bytes,
        }
    }

    /// Whether the declared size is usable (non-zero, within the payload)
    pub fn is_well_formed(&self) -> bool {
        self.declared_size != 0 && self.declared_size as usize <= self.payload.len()
    }
}

/// Encode the record header followed by the declared payload bytes
pub fn encode_record(entry: &RawLogEntry, dst: &mut BytesMut) {
    let size = entry.declared_size as usize;
    dst.reserve(RECORD_HEADER_LEN + size);
    dst.put_u8(entry.record_type.tag());
    dst.put_bytes(0, 3);
    dst.put_u64_le(entry.mono_ts_ns);
    dst.put_u32_le(entry.declared_size);
    dst.put_slice(&entry.payload[..size]);
}

/// `<base>/<YYYY-MM-DD>/raw-<HH-MM-SS>.dat`
pub fn raw_log_path(base_dir: &Path, at: &DateTime<Local>) -> PathBuf {
    base_dir
        .join(at.format("%Y-%m-%d").to_string())
        .join(format!("raw-{}.dat", at.format("%H-%M-%S")))
}

/// Writer of the raw packet archive
pub struct RawLogger {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    scratch: BytesMut,
    written: u64,
    skipped: u64,
}

impl RawLogger {
    /// Open a new archive file under `base_dir` named after the local time
    ///
    /// Never fails: on error the logger is returned disabled.
    pub fn create(base_dir: &Path) -> Self {
        let path = raw_log_path(base_dir, &Local::now());
        Self::open_at(path)
    }

    /// Open an archive at an explicit path
    pub fn open_at(path: PathBuf) -> Self {
        match Self::open_file(&path) {
            Ok(file) => {
                info!(path = %path.display(), "raw archive opened");
                Self {
                    path,
                    file: Some(file),
                    scratch: BytesMut::with_capacity(4096),
                    written: 0,
                    skipped: 0,
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "raw archive disabled");
                Self::disabled(path)
            }
        }
    }

    /// Logger that discards everything
    pub fn disabled(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            scratch: BytesMut::new(),
            written: 0,
            skipped: 0,
        }
    }

    fn open_file(path: &Path) -> Result<BufWriter<File>, ArchiveError> {
        let display = path.display().to_string();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| ArchiveError::open(&display, e.to_string()))?;
        }
        let file = File::create(path).map_err(|e| ArchiveError::open(&display, e.to_string()))?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(&RAW_MAGIC)
            .map_err(|e| ArchiveError::open(&display, e.to_string()))?;
        Ok(writer)
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Records skipped for an unusable declared size
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Append one record
    ///
    /// Returns `Ok(false)` when the logger is disabled or the record was
    /// skipped. A write error disables the logger.
    pub fn append(&mut self, entry: &RawLogEntry) -> Result<bool, ArchiveError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(false);
        };

        if !entry.is_well_formed() {
            self.skipped += 1;
            debug!(
                record_type = ?entry.record_type,
                declared = entry.declared_size,
                available = entry.payload.len(),
                "raw record skipped"
            );
            return Ok(false);
        }

        self.scratch.clear();
        encode_record(entry, &mut self.scratch);

        if let Err(e) = file.write_all(&self.scratch) {
            self.file = None;
            warn!(path = %self.path.display(), error = %e, "raw archive disabled after write error");
            return Err(ArchiveError::write("raw", e.to_string()));
        }

        self.written += 1;
        Ok(true)
    }
}

impl ArchiveSink for RawLogger {
    type Record = RawLogEntry;

    fn name(&self) -> &str {
        "raw"
    }

    fn write(&mut self, record: &RawLogEntry) -> Result<bool, ArchiveError> {
        self.append(record)
    }

    fn flush(&mut self) -> Result<(), ArchiveError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for RawLogger {
    fn drop(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_header_layout() {
        let entry = RawLogEntry::new(
            RawRecordType::Imu,
            0x0102_0304_0506_0708,
            Bytes::from_static(b"abc"),
        );
        let mut buf = BytesMut::new();
        encode_record(&entry, &mut buf);

        assert_eq!(buf.len(), RECORD_HEADER_LEN + 3);
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[1..4], &[0, 0, 0]);
        assert_eq!(&buf[4..12], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&buf[12..16], &3u32.to_le_bytes());
        assert_eq!(&buf[16..], b"abc");
    }

    #[test]
    fn test_path_layout() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        let path = raw_log_path(Path::new("/data/robot/lidar"), &at);
        assert_eq!(
            path,
            PathBuf::from("/data/robot/lidar/2024-03-09/raw-07-05-02.dat")
        );
    }

    #[test]
    fn test_file_starts_with_magic() {
        let dir = tempdir().unwrap();
        let mut logger = RawLogger::create(dir.path());
        assert!(logger.is_open());

        let entry = RawLogEntry::new(RawRecordType::Point, 7, Bytes::from_static(&[1, 2, 3, 4]));
        assert!(logger.append(&entry).unwrap());
        ArchiveSink::flush(&mut logger).unwrap();

        let content = fs::read(logger.path()).unwrap();
        assert_eq!(&content[..8], &RAW_MAGIC);
        assert_eq!(content.len(), 8 + RECORD_HEADER_LEN + 4);
    }

    #[test]
    fn test_malformed_sizes_skipped() {
        let dir = tempdir().unwrap();
        let mut logger = RawLogger::open_at(dir.path().join("raw.dat"));

        let zero = RawLogEntry::new(RawRecordType::Point, 1, Bytes::new());
        let oversized = RawLogEntry {
            declared_size: 64,
            ..RawLogEntry::new(RawRecordType::Imu, 2, Bytes::from_static(&[0; 8]))
        };
        assert!(!logger.append(&zero).unwrap());
        assert!(!logger.append(&oversized).unwrap());
        assert_eq!(logger.skipped(), 2);
        assert_eq!(logger.written(), 0);

        ArchiveSink::flush(&mut logger).unwrap();
        assert_eq!(fs::read(logger.path()).unwrap().len(), 8);
    }

    #[test]
    fn test_declared_size_truncates_payload() {
        let dir = tempdir().unwrap();
        let mut logger = RawLogger::open_at(dir.path().join("raw.dat"));

        let entry = RawLogEntry {
            declared_size: 2,
            ..RawLogEntry::new(RawRecordType::Version, 3, Bytes::from_static(&[9, 8, 7, 6]))
        };
        assert!(logger.append(&entry).unwrap());
        ArchiveSink::flush(&mut logger).unwrap();

        let content = fs::read(logger.path()).unwrap();
        assert_eq!(&content[8 + RECORD_HEADER_LEN..], &[9, 8]);
    }

    #[test]
    fn test_open_failure_disables_logger() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();

        let mut logger = RawLogger::create(&blocker);
        assert!(!logger.is_open());

        let entry = RawLogEntry::new(RawRecordType::Point, 1, Bytes::from_static(&[1]));
        assert!(!logger.append(&entry).unwrap());
    }
}
