//! Backup file names.
//!
//! Names have the form `backup-<stamp>-<kind>.<ext>`, where `<stamp>` is the
//! capture time in microseconds since the Unix epoch, zero-padded to 20
//! digits. Sorting names lexicographically therefore sorts backups by time.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::SnapshotFormat;
use crate::error::StorageResult;
use crate::types::SnapshotKind;

const PREFIX: &str = "backup-";

/// A parsed backup file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackupFileName {
    /// Capture time in microseconds since the Unix epoch.
    pub stamp: u64,
    /// Full or delta.
    pub kind: SnapshotKind,
    /// The file format.
    pub format: SnapshotFormat,
}

impl BackupFileName {
    /// Creates a file name.
    #[must_use]
    pub const fn new(stamp: u64, kind: SnapshotKind, format: SnapshotFormat) -> Self {
        Self { stamp, kind, format }
    }

    /// Parses a file name, returning `None` for anything that is not a backup.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(PREFIX)?;
        let (stem, ext) = rest.rsplit_once('.')?;
        let (stamp, kind) = stem.split_once('-')?;
        if stamp.len() != 20 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let kind = match kind {
            "full" => SnapshotKind::Full,
            "delta" => SnapshotKind::Delta,
            _ => return None,
        };
        Some(Self { stamp: stamp.parse().ok()?, kind, format: SnapshotFormat::from_extension(ext)? })
    }

    /// The path of this file within `dir`.
    #[must_use]
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.to_string())
    }
}

impl fmt::Display for BackupFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{:020}-{}.{}", self.stamp, self.kind, self.format.extension())
    }
}

/// Lists the backup files in a directory, oldest first.
///
/// Files whose names do not parse are ignored, including temporary files of
/// in-flight writes.
pub fn list_backup_files(dir: &Path) -> StorageResult<Vec<(PathBuf, BackupFileName)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().and_then(BackupFileName::parse) else {
            continue;
        };
        files.push((entry.path(), name));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}
