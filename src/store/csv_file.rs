//! Append-only CSV record store.
//!
//! Every upsert appends rows and syncs the file. Reading the file back
//! applies later-row-wins per id, so appending the same record twice leaves
//! the logical contents unchanged. A row cut short by an abrupt stop is
//! ignored on read and truncated away before the next append.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use super::{RecordStore, StoreError, with_write_retry};
use crate::record::Record;

/// Record store backed by a CSV file with an `id,display_name` header.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl CsvStore {
    /// Creates a store for `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file into an id-ordered map, later rows overwriting earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Corrupt`] for rows that do not parse.
    pub async fn load(&self) -> Result<BTreeMap<i64, Record>, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_records(&path)).await?
    }

    async fn append(&self, records: Vec<Record>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_records(&path, &records)).await?
    }
}

fn read_records(path: &Path) -> Result<BTreeMap<i64, Record>, StoreError> {
    let mut records = BTreeMap::new();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let complete = complete_rows(&bytes);
    if complete.len() < bytes.len() {
        warn!(
            path = %path.display(),
            torn_bytes = bytes.len() - complete.len(),
            "ignoring incomplete trailing row"
        );
    }

    let mut reader = csv::Reader::from_reader(complete);
    for row in reader.deserialize::<Record>() {
        let record = row.map_err(|e| csv_error(path, e))?;
        records.insert(record.id, record);
    }
    Ok(records)
}

/// Prefix of `bytes` up to and including the last row terminator.
///
/// Every successful append ends in `\n`; anything after the last one was
/// left by an interrupted write and was never committed.
fn complete_rows(bytes: &[u8]) -> &[u8] {
    match bytes.iter().rposition(|&b| b == b'\n') {
        Some(last) => &bytes[..=last],
        None => &[],
    }
}

/// Cuts an interrupted write off the end of the file so the next append
/// starts on a fresh row.
fn truncate_torn_row(path: &Path, file: &mut File) -> Result<(), StoreError> {
    let len = file.metadata().map_err(|e| StoreError::io(path, e))?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|e| StoreError::io(path, e))?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut bytes))
        .map_err(|e| StoreError::io(path, e))?;
    let keep = complete_rows(&bytes).len();
    warn!(
        path = %path.display(),
        torn_bytes = bytes.len() - keep,
        "truncating incomplete trailing row before append"
    );
    file.set_len(keep as u64).map_err(|e| StoreError::io(path, e))
}

fn append_records(path: &Path, records: &[Record]) -> Result<(), StoreError> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    truncate_torn_row(path, &mut file)?;
    let needs_header = file.metadata().map_err(|e| StoreError::io(path, e))?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    for record in records {
        writer.serialize(record).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| StoreError::io(path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| StoreError::io(path, e))
}

fn csv_error(path: &Path, error: csv::Error) -> StoreError {
    if error.is_io_error() {
        match error.into_kind() {
            csv::ErrorKind::Io(source) => StoreError::io(path, source),
            other => StoreError::corrupt(path, format!("{other:?}")),
        }
    } else {
        StoreError::corrupt(path, error.to_string())
    }
}

#[async_trait]
impl RecordStore for CsvStore {
    #[instrument(level = "debug", skip(self, records), fields(path = %self.path.display(), count = records.len()))]
    async fn upsert(&self, records: &[Record]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        with_write_retry(|| self.append(records.to_vec())).await?;
        Ok(records.len())
    }

    async fn last_committed_id(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.load().await?.keys().next_back().copied())
    }

    async fn record_count(&self) -> Result<u64, StoreError> {
        Ok(self.load().await?.len() as u64)
    }
}
