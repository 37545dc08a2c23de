//! Streaming snapshot writer and reader.
//!
//! Two on-disk formats are supported:
//!
//! - [`SnapshotFormat::JsonLines`]: one JSON object per line. Values render as
//!   natural JSON, and integers and floats stay distinct (`30` vs `30.0`).
//! - [`SnapshotFormat::Binary`]: an 8-byte magic and a `u32` version, then
//!   frames of `[4-byte length][bincode payload][4-byte CRC32]`.
//!
//! Both formats decode only the known [`BackupRecord`] variants.

use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;

use cellardb_core::{PrimaryKey, Record};

use crate::error::{StorageError, StorageResult};
use crate::types::{
    BackupMetadata, BackupRecord, BackupStatistics, DeleteEntry, TableHeader, UpsertEntry,
    SNAPSHOT_FORMAT_VERSION,
};

/// Magic bytes opening a binary snapshot.
pub const BINARY_MAGIC: &[u8; 8] = b"CELLARDB";

/// Frames larger than this are treated as corruption rather than allocated.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// The on-disk representation of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SnapshotFormat {
    /// JSON lines (`.jsonl`).
    #[default]
    JsonLines,
    /// Framed bincode (`.bin`).
    Binary,
}

impl SnapshotFormat {
    /// The file extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::JsonLines => "jsonl",
            Self::Binary => "bin",
        }
    }

    /// The format for a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jsonl" | "json" => Some(Self::JsonLines),
            "bin" => Some(Self::Binary),
            _ => None,
        }
    }

    /// The format implied by a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A snapshot writer that streams records to an output.
///
/// The metadata must be written first and [`SnapshotWriter::finish`] must be
/// called last; a reader rejects a file without its end marker.
pub struct SnapshotWriter<W: Write> {
    writer: W,
    format: SnapshotFormat,
    statistics: BackupStatistics,
    wrote_metadata: bool,
}

impl<W: Write> SnapshotWriter<W> {
    /// Creates a writer, emitting the binary header if needed.
    pub fn new(mut writer: W, format: SnapshotFormat) -> StorageResult<Self> {
        if format == SnapshotFormat::Binary {
            writer.write_all(BINARY_MAGIC)?;
            writer.write_all(&SNAPSHOT_FORMAT_VERSION.to_le_bytes())?;
        }
        Ok(Self { writer, format, statistics: BackupStatistics::default(), wrote_metadata: false })
    }

    /// Write the snapshot metadata.
    ///
    /// This must be the first record written.
    pub fn write_metadata(&mut self, metadata: &BackupMetadata) -> StorageResult<()> {
        if self.wrote_metadata {
            return Err(StorageError::InvalidFormat("metadata written twice".into()));
        }
        self.write_record(&BackupRecord::Metadata(metadata.clone()))?;
        self.wrote_metadata = true;
        Ok(())
    }

    /// Write a table header.
    pub fn write_table(&mut self, header: &TableHeader) -> StorageResult<()> {
        self.write_body(&BackupRecord::Table(header.clone()))?;
        self.statistics.tables += 1;
        Ok(())
    }

    /// Write a live record.
    pub fn write_upsert(
        &mut self,
        table: &str,
        seq: u64,
        key: &PrimaryKey,
        record: &Record,
    ) -> StorageResult<()> {
        let entry = UpsertEntry {
            table: table.to_owned(),
            seq,
            key: key.clone(),
            record: record.clone(),
        };
        self.write_body(&BackupRecord::Upsert(entry))?;
        self.statistics.upserts += 1;
        Ok(())
    }

    /// Write a deleted key.
    pub fn write_delete(&mut self, table: &str, seq: u64, key: &PrimaryKey) -> StorageResult<()> {
        let entry = DeleteEntry { table: table.to_owned(), seq, key: key.clone() };
        self.write_body(&BackupRecord::Delete(entry))?;
        self.statistics.deletes += 1;
        Ok(())
    }

    /// Write a dropped-table marker.
    pub fn write_drop(&mut self, table: &str) -> StorageResult<()> {
        self.write_body(&BackupRecord::DropTable(table.to_owned()))?;
        self.statistics.dropped_tables += 1;
        Ok(())
    }

    /// Statistics for what has been written so far.
    pub fn statistics(&self) -> &BackupStatistics {
        &self.statistics
    }

    /// Write the end marker and flush.
    pub fn finish(mut self) -> StorageResult<BackupStatistics> {
        if !self.wrote_metadata {
            return Err(StorageError::InvalidFormat("snapshot has no metadata".into()));
        }
        self.write_record(&BackupRecord::End(self.statistics))?;
        self.writer.flush()?;
        Ok(self.statistics)
    }

    fn write_body(&mut self, record: &BackupRecord) -> StorageResult<()> {
        if !self.wrote_metadata {
            return Err(StorageError::InvalidFormat("metadata must be written first".into()));
        }
        self.write_record(record)
    }

    fn write_record(&mut self, record: &BackupRecord) -> StorageResult<()> {
        match self.format {
            SnapshotFormat::JsonLines => {
                let json = serde_json::to_string(record)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                writeln!(self.writer, "{json}")?;
            }
            SnapshotFormat::Binary => {
                let data = bincode::serde::encode_to_vec(record, bincode::config::standard())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let len = u32::try_from(data.len())
                    .ok()
                    .filter(|len| *len <= MAX_FRAME_LEN)
                    .ok_or_else(|| {
                        StorageError::Serialization(format!("record of {} bytes", data.len()))
                    })?;

                // Write: [length: u32][data: bytes][crc: u32]
                self.writer.write_all(&len.to_le_bytes())?;
                self.writer.write_all(&data)?;
                self.writer.write_all(&crc32_checksum(&data).to_le_bytes())?;
            }
        }
        Ok(())
    }
}

/// The decoded contents of a whole snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotContents {
    /// The snapshot metadata.
    pub metadata: BackupMetadata,
    /// Table headers in file order.
    pub tables: Vec<TableHeader>,
    /// Upserted records in file order.
    pub upserts: Vec<UpsertEntry>,
    /// Deleted keys in file order.
    pub deletes: Vec<DeleteEntry>,
    /// Dropped tables in file order.
    pub dropped_tables: Vec<String>,
    /// Statistics from the end marker.
    pub statistics: BackupStatistics,
}

/// A snapshot reader that decodes records from an input.
pub struct SnapshotReader<R: Read> {
    reader: BufReader<R>,
    format: SnapshotFormat,
    position: u64,
    metadata: Option<BackupMetadata>,
    finished: bool,
}

impl<R: Read> SnapshotReader<R> {
    /// Creates a reader, validating the binary header if needed.
    pub fn new(reader: R, format: SnapshotFormat) -> StorageResult<Self> {
        let mut reader = BufReader::new(reader);
        if format == SnapshotFormat::Binary {
            let mut header = [0u8; 12];
            reader.read_exact(&mut header).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => StorageError::incomplete("missing binary header"),
                _ => StorageError::Io(e),
            })?;
            if &header[..8] != BINARY_MAGIC {
                return Err(StorageError::InvalidFormat("bad magic bytes".into()));
            }
            let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
            if version > SNAPSHOT_FORMAT_VERSION {
                return Err(StorageError::UnsupportedVersion(version));
            }
        }
        Ok(Self { reader, format, position: 0, metadata: None, finished: false })
    }

    /// Read and validate the snapshot metadata.
    ///
    /// This must be called before reading body records.
    pub fn read_metadata(&mut self) -> StorageResult<&BackupMetadata> {
        if self.metadata.is_some() {
            return self.metadata.as_ref().ok_or_else(|| StorageError::incomplete("no metadata"));
        }

        let record =
            self.read_raw()?.ok_or_else(|| StorageError::incomplete("empty snapshot file"))?;

        match record {
            BackupRecord::Metadata(meta) => {
                if meta.version > SNAPSHOT_FORMAT_VERSION {
                    return Err(StorageError::UnsupportedVersion(meta.version));
                }
                Ok(self.metadata.insert(meta))
            }
            other => Err(StorageError::malformed_record(
                self.position,
                format!("first record must be metadata, found {}", other.type_name()),
            )),
        }
    }

    /// The metadata, once read.
    pub fn metadata(&self) -> Option<&BackupMetadata> {
        self.metadata.as_ref()
    }

    /// Read the next body record, or `None` after the end marker.
    ///
    /// Reaching the end of input before the end marker is an error.
    pub fn read_record(&mut self) -> StorageResult<Option<BackupRecord>> {
        if self.metadata.is_none() {
            self.read_metadata()?;
        }
        if self.finished {
            return Ok(None);
        }
        match self.read_raw()? {
            None => Err(StorageError::incomplete(format!(
                "no end marker after record {}",
                self.position
            ))),
            Some(BackupRecord::Metadata(_)) => {
                Err(StorageError::malformed_record(self.position, "duplicate metadata record"))
            }
            Some(record @ BackupRecord::End(_)) => {
                self.finished = true;
                Ok(Some(record))
            }
            Some(record) => Ok(Some(record)),
        }
    }

    /// Reads the whole snapshot.
    pub fn read_to_end(mut self) -> StorageResult<SnapshotContents> {
        let metadata = self.read_metadata()?.clone();
        let mut contents = SnapshotContents {
            metadata,
            tables: Vec::new(),
            upserts: Vec::new(),
            deletes: Vec::new(),
            dropped_tables: Vec::new(),
            statistics: BackupStatistics::default(),
        };

        while let Some(record) = self.read_record()? {
            match record {
                BackupRecord::Table(header) => contents.tables.push(header),
                BackupRecord::Upsert(entry) => contents.upserts.push(entry),
                BackupRecord::Delete(entry) => contents.deletes.push(entry),
                BackupRecord::DropTable(name) => contents.dropped_tables.push(name),
                BackupRecord::End(statistics) => contents.statistics = statistics,
                BackupRecord::Metadata(_) => {}
            }
        }

        let counted = contents.upserts.len() as u64 + contents.deletes.len() as u64;
        if counted != contents.statistics.upserts + contents.statistics.deletes {
            return Err(StorageError::InvalidFormat(format!(
                "end marker counts {} changes, file holds {counted}",
                contents.statistics.upserts + contents.statistics.deletes
            )));
        }
        Ok(contents)
    }

    fn read_raw(&mut self) -> StorageResult<Option<BackupRecord>> {
        match self.format {
            SnapshotFormat::JsonLines => self.read_line(),
            SnapshotFormat::Binary => self.read_frame(),
        }
    }

    fn read_line(&mut self) -> StorageResult<Option<BackupRecord>> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.position += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str(line).map(Some).map_err(|e| {
                StorageError::Deserialization(format!("line {}: {e}", self.position))
            });
        }
    }

    fn read_frame(&mut self) -> StorageResult<Option<BackupRecord>> {
        let mut len_bytes = [0u8; 4];
        match self.reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        self.position += 1;

        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FRAME_LEN {
            return Err(StorageError::InvalidFormat(format!(
                "frame {} claims {len} bytes",
                self.position
            )));
        }

        let mut data = vec![0u8; len as usize];
        let mut crc_bytes = [0u8; 4];
        self.reader
            .read_exact(&mut data)
            .and_then(|()| self.reader.read_exact(&mut crc_bytes))
            .map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => {
                    StorageError::incomplete(format!("frame {} is truncated", self.position))
                }
                _ => StorageError::Io(e),
            })?;

        let expected = u32::from_le_bytes(crc_bytes);
        let actual = crc32_checksum(&data);
        if expected != actual {
            return Err(StorageError::Checksum { frame: self.position, expected, actual });
        }

        let (record, _) = bincode::serde::decode_from_slice(&data, bincode::config::standard())
            .map_err(|e| {
                StorageError::Deserialization(format!("frame {}: {e}", self.position))
            })?;
        Ok(Some(record))
    }
}

impl<R: Read> Iterator for SnapshotReader<R> {
    type Item = StorageResult<BackupRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Calculate CRC32 checksum using the IEEE polynomial
fn crc32_checksum(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = !0u32;

    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }

    !crc
}
