//! Offline reader of the raw packet archive

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes};
use contracts::RawRecordType;

use crate::raw::{RAW_MAGIC, RECORD_HEADER_LEN};
use crate::ArchiveError;

/// One record read back from an archive
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Raw type tag, kept as-is so unknown tags survive
    pub tag: u8,
    pub mono_ts_ns: u64,
    pub payload: Bytes,
}

impl RawRecord {
    /// Decoded record type, `None` for unknown tags
    pub fn record_type(&self) -> Option<RawRecordType> {
        RawRecordType::from_tag(self.tag)
    }
}

/// Sequential record iterator over an archive file
pub struct RawLogReader<R = BufReader<File>> {
    inner: R,
    offset: u64,
    done: bool,
}

impl RawLogReader<BufReader<File>> {
    /// Open an archive and check its magic
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)
            .map_err(|e| ArchiveError::open(path.display().to_string(), e.to_string()))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> RawLogReader<R> {
    /// Wrap any byte source positioned at the file start
    pub fn new(mut inner: R) -> Result<Self, ArchiveError> {
        let mut magic = [0u8; 8];
        inner
            .read_exact(&mut magic)
            .map_err(|_| ArchiveError::format("file shorter than magic"))?;
        if magic != RAW_MAGIC {
            return Err(ArchiveError::format(format!("bad magic {magic:02x?}")));
        }

        Ok(Self {
            inner,
            offset: RAW_MAGIC.len() as u64,
            done: false,
        })
    }

    /// Byte offset of the next record
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_record(&mut self) -> Result<Option<RawRecord>, ArchiveError> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        match read_full(&mut self.inner, &mut header)? {
            0 => return Ok(None),
            n if n < RECORD_HEADER_LEN => {
                return Err(ArchiveError::format(format!(
                    "truncated header at offset {}",
                    self.offset
                )))
            }
            _ => {}
        }

        let mut cursor = &header[..];
        let tag = cursor.get_u8();
        cursor.advance(3);
        let mono_ts_ns = cursor.get_u64_le();
        let size = cursor.get_u32_le() as usize;

        let mut payload = vec![0u8; size];
        if read_full(&mut self.inner, &mut payload)? < size {
            return Err(ArchiveError::format(format!(
                "truncated payload at offset {} ({} bytes declared)",
                self.offset, size
            )));
        }

        self.offset += (RECORD_HEADER_LEN + size) as u64;
        Ok(Some(RawRecord {
            tag,
            mono_ts_ns,
            payload: Bytes::from(payload),
        }))
    }
}

impl<R: Read> Iterator for RawLogReader<R> {
    type Item = Result<RawRecord, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF, returning the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Aggregate view of an archive, as printed by `inspect`
#[derive(Debug, Clone, Default)]
pub struct RawLogSummary {
    pub path: PathBuf,
    /// Record count per raw tag
    pub counts: BTreeMap<u8, u64>,
    pub payload_bytes: u64,
    pub first_ts_ns: Option<u64>,
    pub last_ts_ns: Option<u64>,
    /// Error that ended the scan early (truncated tail)
    pub trailing_error: Option<String>,
}

impl RawLogSummary {
    /// Scan a whole archive
    pub fn scan(path: &Path) -> Result<Self, ArchiveError> {
        let reader = RawLogReader::open(path)?;
        let mut summary = Self {
            path: path.to_path_buf(),
            ..Default::default()
        };

        for record in reader {
            match record {
                Ok(record) => summary.add(&record),
                Err(e) => summary.trailing_error = Some(e.to_string()),
            }
        }
        Ok(summary)
    }

    fn add(&mut self, record: &RawRecord) {
        *self.counts.entry(record.tag).or_default() += 1;
        self.payload_bytes += record.payload.len() as u64;
        self.first_ts_ns.get_or_insert(record.mono_ts_ns);
        self.last_ts_ns = Some(record.mono_ts_ns);
    }

    /// Total number of records
    pub fn records(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Records of one type
    pub fn count_of(&self, record_type: RawRecordType) -> u64 {
        self.counts.get(&record_type.tag()).copied().unwrap_or(0)
    }

    /// Host-time span between first and last record (s)
    pub fn span_s(&self) -> f64 {
        match (self.first_ts_ns, self.last_ts_ns) {
            (Some(first), Some(last)) => last.saturating_sub(first) as f64 / 1e9,
            _ => 0.0,
        }
    }
}

impl fmt::Display for RawLogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Archive: {}", self.path.display())?;
        writeln!(f, "  records: {}", self.records())?;
        for (tag, count) in &self.counts {
            let label = match RawRecordType::from_tag(*tag) {
                Some(RawRecordType::Point) => "point".to_string(),
                Some(RawRecordType::Imu) => "imu".to_string(),
                Some(RawRecordType::Version) => "version".to_string(),
                None => format!("unknown({tag})"),
            };
            writeln!(f, "    {label:<12} {count}")?;
        }
        writeln!(f, "  payload bytes: {}", self.payload_bytes)?;
        write!(f, "  span: {:.3}s", self.span_s())?;
        if let Some(err) = &self.trailing_error {
            write!(f, "\n  warning: {err}")?;
        }
        Ok(())
    }
}
