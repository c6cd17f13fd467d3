//! Point-cloud snapshots as ASCII PLY
//!
//! One file per ring buffer revolution:
//! `<base>/snapshots/<YYYY-MM-DD>/<HH>/cloud_<HHMMSS>_<n>.ply`, where `n`
//! counts snapshots written by this writer.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use contracts::Point;
use tracing::{debug, instrument};

use crate::sink::ArchiveSink;
use crate::ArchiveError;

/// Robot-frame points captured at one instant
#[derive(Debug, Clone)]
pub struct PointSnapshot {
    pub taken_at: DateTime<Local>,
    pub points: Vec<Point>,
}

impl PointSnapshot {
    /// Snapshot stamped with the current local time
    pub fn now(points: Vec<Point>) -> Self {
        Self {
            taken_at: Local::now(),
            points,
        }
    }
}

/// Writer of PLY snapshots
pub struct SnapshotWriter {
    root: PathBuf,
    sequence: u64,
    created_dirs: HashSet<PathBuf>,
}

impl SnapshotWriter {
    /// Snapshots go to `<base_dir>/snapshots`
    pub fn new(base_dir: &Path) -> Self {
        Self {
            root: base_dir.join("snapshots"),
            sequence: 0,
            created_dirs: HashSet::new(),
        }
    }

    /// Directory holding all snapshots
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the next snapshot taken at `at`
    pub fn path_for(&self, at: &DateTime<Local>, n: u64) -> PathBuf {
        self.root
            .join(at.format("%Y-%m-%d").to_string())
            .join(at.format("%H").to_string())
            .join(format!("cloud_{}_{}.ply", at.format("%H%M%S"), n))
    }

    #[instrument(
        name = "snapshot_write",
        skip(self, snapshot),
        fields(points = snapshot.points.len())
    )]
    fn write_snapshot(&mut self, snapshot: &PointSnapshot) -> Result<PathBuf, ArchiveError> {
        let path = self.path_for(&snapshot.taken_at, self.sequence);
        if let Some(dir) = path.parent() {
            if !self.created_dirs.contains(dir) {
                fs::create_dir_all(dir)?;
                self.created_dirs.insert(dir.to_path_buf());
            }
        }

        let mut out = BufWriter::new(File::create(&path)?);
        write_ply(&mut out, &snapshot.points)?;
        out.flush()?;

        self.sequence += 1;
        debug!(path = %path.display(), "snapshot written");
        Ok(path)
    }
}

/// ASCII PLY with `x y z intensity ring` vertices
pub fn write_ply<W: Write>(out: &mut W, points: &[Point]) -> std::io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", points.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    writeln!(out, "property float intensity")?;
    writeln!(out, "property uint ring")?;
    writeln!(out, "end_header")?;
    for p in points {
        writeln!(
            out,
            "{:.6} {:.6} {:.6} {:.6} {}",
            p.x, p.y, p.z, p.intensity, p.ring
        )?;
    }
    Ok(())
}

impl ArchiveSink for SnapshotWriter {
    type Record = PointSnapshot;

    fn name(&self) -> &str {
        "snapshots"
    }

    fn write(&mut self, record: &PointSnapshot) -> Result<bool, ArchiveError> {
        if record.points.is_empty() {
            return Ok(false);
        }
        self.write_snapshot(record)
            .map(|_| true)
            .map_err(|e| ArchiveError::write("snapshots", e.to_string()))
    }

    fn flush(&mut self) -> Result<(), ArchiveError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn point(x: f32, ring: u32) -> Point {
        Point {
            x,
            y: -1.5,
            z: 20.0,
            intensity: 3.0,
            ring,
            time_offset: 0.0,
        }
    }

    #[test]
    fn test_path_layout() {
        let writer = SnapshotWriter::new(Path::new("/data/robot/lidar"));
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 2).unwrap();
        assert_eq!(
            writer.path_for(&at, 4),
            PathBuf::from("/data/robot/lidar/snapshots/2024-03-09/14/cloud_140502_4.ply")
        );
    }

    #[test]
    fn test_ply_content() {
        let mut buf = Vec::new();
        write_ply(&mut buf, &[point(1.0, 7), point(2.5, 8)]).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("ply\nformat ascii 1.0\nelement vertex 2\n"));
        assert!(text.contains("property uint ring\nend_header\n"));
        assert!(text.ends_with("2.500000 -1.500000 20.000000 3.000000 8\n"));
    }

    #[test]
    fn test_writes_numbered_files() {
        let dir = tempdir().unwrap();
        let mut writer = SnapshotWriter::new(dir.path());
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 2).unwrap();

        for _ in 0..2 {
            let snapshot = PointSnapshot {
                taken_at: at,
                points: vec![point(1.0, 0)],
            };
            assert!(writer.write(&snapshot).unwrap());
        }

        assert!(writer.path_for(&at, 0).exists());
        assert!(writer.path_for(&at, 1).exists());
    }

    #[test]
    fn test_empty_snapshot_skipped() {
        let dir = tempdir().unwrap();
        let mut writer = SnapshotWriter::new(dir.path());
        assert!(!writer.write(&PointSnapshot::now(Vec::new())).unwrap());
        assert!(!writer.root().exists());
    }
}
