//! Append-only message log.
//!
//! ## フォーマット
//!
//! ヘッダーも長さプレフィックスも持たない単一のフラットファイルです。
//! 1 レコードは `author US to US content RS` の順に書き込まれます。
//!
//! - `US` (0x1F): フィールドの区切り
//! - `RS` (0x1E): レコードの終端
//!
//! 末尾から逆方向に読むと `content`, `to`, `author` の順にフィールドが現れるため、
//! 前方インデックスなしで最新のレコードから復元できます。
//! 区切りバイトはメッセージの検証で禁止されているため、フィールド内には現れません。

use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

use crate::domain::Message;

/// Terminates a record.
pub const RECORD_SEPARATOR: u8 = 30;
/// Terminates a field within a record.
pub const UNIT_SEPARATOR: u8 = 31;

/// Size of the blocks read while scanning backward.
const CHUNK_SIZE: u64 = 8 * 1024;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Message log '{0}' is a directory")]
    IsDirectory(PathBuf),

    #[error("Failed to open message log '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Message log I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Handle to the on-disk message log.
///
/// Callers serialize access (the message store keeps it behind one lock);
/// every mutating method takes `&mut self`.
#[derive(Debug)]
pub struct DurableLog {
    file: File,
    path: PathBuf,
}

impl DurableLog {
    /// Open the log for appending, creating it if absent.
    ///
    /// A partial record left at the end of the file by an interrupted write is
    /// cut off.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        ensure_not_directory(&path).await?;

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;

        let mut log = Self { file, path };
        log.repair_torn_tail().await?;

        tracing::info!(path = %log.path.display(), "Message log opened");
        Ok(log)
    }

    /// Open an existing log without write access, so every append fails.
    #[cfg(test)]
    pub(crate) async fn open_read_only(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.unwrap();
        Self { file, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the file in bytes.
    pub async fn len(&self) -> Result<u64, LogError> {
        Ok(self.file.metadata().await?.len())
    }

    /// Recover the newest `limit` records (all of them for `None`) in
    /// chronological order. A missing file is an empty history.
    pub async fn load_recent(
        path: impl AsRef<Path>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, LogError> {
        let path = path.as_ref();
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LogError::Open {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(LogError::IsDirectory(path.to_path_buf()));
        }

        let records = read_backward(&mut file, metadata.len(), limit).await?;
        tracing::debug!(
            path = %path.display(),
            count = records.len(),
            "Recovered messages from log"
        );
        Ok(records)
    }

    /// Append `records` with a single write.
    ///
    /// On failure the file is cut back to its previous length so that a retry
    /// never lands after a half-written record.
    pub async fn append(&mut self, records: &[Message]) -> Result<(), LogError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for record in records {
            encode_record(record, &mut buf);
        }

        let len_before = self.len().await?;
        if let Err(e) = self.write_all(&buf).await {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Append failed, rolling back"
            );
            if let Err(rollback) = self.file.set_len(len_before).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Failed to roll back partial append"
                );
            }
            return Err(e.into());
        }

        tracing::debug!(count = records.len(), bytes = buf.len(), "Appended records");
        Ok(())
    }

    /// Remove the newest record without rewriting the file.
    ///
    /// Returns `false` when the file was already empty.
    pub async fn truncate_last(&mut self) -> Result<bool, LogError> {
        let size = self.len().await?;
        if size == 0 {
            return Ok(false);
        }

        // The final byte terminates the newest record; the separator before it
        // terminates the record that becomes the new tail.
        let mut reader = ReverseReader::new(&mut self.file, size - 1);
        let mut new_len = 0;
        while let Some((offset, byte)) = reader.prev().await? {
            if byte == RECORD_SEPARATOR {
                new_len = offset + 1;
                break;
            }
        }

        self.file.set_len(new_len).await?;
        tracing::debug!(from = size, to = new_len, "Truncated newest record");
        Ok(true)
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf).await?;
        self.file.flush().await
    }

    async fn repair_torn_tail(&mut self) -> Result<(), LogError> {
        let size = self.len().await?;
        if size == 0 {
            return Ok(());
        }

        let mut reader = ReverseReader::new(&mut self.file, size);
        let mut keep = 0;
        while let Some((offset, byte)) = reader.prev().await? {
            if byte == RECORD_SEPARATOR {
                keep = offset + 1;
                break;
            }
        }

        if keep != size {
            tracing::warn!(
                path = %self.path.display(),
                dropped_bytes = size - keep,
                "Message log ends with a partial record, cutting it off"
            );
            self.file.set_len(keep).await?;
        }
        Ok(())
    }
}

async fn ensure_not_directory(path: &Path) -> Result<(), LogError> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Err(LogError::IsDirectory(path.to_path_buf())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LogError::Open {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn encode_record(msg: &Message, buf: &mut Vec<u8>) {
    buf.extend_from_slice(msg.author.as_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(msg.to.as_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(msg.content.as_bytes());
    buf.push(RECORD_SEPARATOR);
}

/// Reads a file one byte at a time from a given offset toward the start,
/// fetching `CHUNK_SIZE` blocks under the hood.
struct ReverseReader<'a> {
    file: &'a mut File,
    buf: Vec<u8>,
    /// File offset of `buf[0]`.
    start: u64,
    /// Number of unread bytes left in `buf`.
    idx: usize,
}

impl<'a> ReverseReader<'a> {
    fn new(file: &'a mut File, end: u64) -> Self {
        Self {
            file,
            buf: Vec::new(),
            start: end,
            idx: 0,
        }
    }

    /// The previous byte and its offset, or `None` at the start of the file.
    async fn prev(&mut self) -> io::Result<Option<(u64, u8)>> {
        if self.idx == 0 {
            if self.start == 0 {
                return Ok(None);
            }
            let len = self.start.min(CHUNK_SIZE);
            self.start -= len;
            self.buf.resize(len as usize, 0);
            self.file.seek(SeekFrom::Start(self.start)).await?;
            self.file.read_exact(&mut self.buf).await?;
            self.idx = self.buf.len();
        }

        self.idx -= 1;
        Ok(Some((self.start + self.idx as u64, self.buf[self.idx])))
    }
}

/// Collects the fields of one record as they are discovered back to front.
#[derive(Default)]
struct RecordBuilder {
    field: Vec<u8>,
    /// Completed fields in discovery order: content, to, author.
    fields: Vec<String>,
}

impl RecordBuilder {
    fn push_byte(&mut self, byte: u8) {
        self.field.push(byte);
    }

    fn end_field(&mut self) {
        self.field.reverse();
        self.fields
            .push(String::from_utf8_lossy(&self.field).into_owned());
        self.field.clear();
    }

    fn is_empty(&self) -> bool {
        self.field.is_empty() && self.fields.is_empty()
    }

    /// Close the record. Malformed records are logged and dropped.
    fn finish(&mut self) -> Option<Message> {
        self.end_field();
        let fields = std::mem::take(&mut self.fields);

        match <[String; 3]>::try_from(fields) {
            Ok([content, to, author]) => Some(Message {
                content,
                to,
                author,
            }),
            Err(fields) => {
                tracing::warn!(
                    field_count = fields.len(),
                    "Skipping malformed record in message log"
                );
                None
            }
        }
    }
}

async fn read_backward(
    file: &mut File,
    size: u64,
    limit: Option<usize>,
) -> io::Result<Vec<Message>> {
    let mut reader = ReverseReader::new(file, size);
    let mut records = Vec::new();
    let mut record = RecordBuilder::default();
    // Bytes seen before the first separator belong to a torn write.
    let mut in_record = false;
    let mut torn_bytes = 0usize;

    while limit.is_none_or(|limit| records.len() < limit) {
        let Some((_, byte)) = reader.prev().await? else {
            if in_record && !record.is_empty() {
                records.extend(record.finish());
            }
            break;
        };

        match byte {
            RECORD_SEPARATOR => {
                if in_record {
                    records.extend(record.finish());
                }
                in_record = true;
            }
            _ if !in_record => torn_bytes += 1,
            UNIT_SEPARATOR => record.end_field(),
            _ => record.push_byte(byte),
        }
    }

    if torn_bytes > 0 {
        tracing::warn!(torn_bytes, "Ignored partial record at end of message log");
    }

    records.reverse();
    Ok(records)
}
