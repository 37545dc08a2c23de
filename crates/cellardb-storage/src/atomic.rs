//! Atomic file replacement.
//!
//! Data is written to a temporary file in the target's directory, flushed and
//! synced, then renamed over the target. A crash mid-write leaves the target
//! untouched; the temporary file is removed when writing fails.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::codec::{SnapshotFormat, SnapshotReader, SnapshotWriter};
use crate::error::{StorageError, StorageResult};
use crate::types::BackupStatistics;
use crate::SnapshotContents;

/// Writes `path` atomically using `write` to produce its content.
///
/// Returns whatever `write` returns once the file is durably in place.
pub fn write_atomic<T, F>(path: &Path, write: F) -> StorageResult<T>
where
    F: FnOnce(&mut BufWriter<&File>) -> StorageResult<T>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp = tempfile::Builder::new().prefix(".cellardb-").suffix(".tmp").tempfile_in(dir)?;

    let value = {
        let mut writer = BufWriter::new(temp.as_file());
        let value = write(&mut writer)?;
        writer.flush()?;
        value
    };
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StorageError::Io(e.error))?;

    sync_dir(dir);
    Ok(value)
}

/// Makes the rename itself durable. Not every platform can open a directory,
/// so failures are only logged.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %e, "directory sync failed");
    }
    #[cfg(not(unix))]
    let _ = dir;
}

/// Writes a snapshot file atomically.
///
/// `body` receives a writer whose metadata has already been written and
/// fills in the table headers and changes; the end marker is added after.
pub fn write_snapshot_file<F>(
    path: &Path,
    format: SnapshotFormat,
    metadata: &crate::BackupMetadata,
    body: F,
) -> StorageResult<BackupStatistics>
where
    F: FnOnce(&mut SnapshotWriter<&mut BufWriter<&File>>) -> StorageResult<()>,
{
    write_atomic(path, |out| {
        let mut writer = SnapshotWriter::new(out, format)?;
        writer.write_metadata(metadata)?;
        body(&mut writer)?;
        writer.finish()
    })
}

/// Reads a whole snapshot file, choosing the format by extension.
pub fn read_snapshot_file(path: &Path) -> StorageResult<SnapshotContents> {
    let format = SnapshotFormat::from_path(path).ok_or_else(|| {
        StorageError::InvalidFormat(format!("unknown snapshot extension: {}", path.display()))
    })?;
    let file = File::open(path)?;
    SnapshotReader::new(file, format)?.read_to_end()
}
