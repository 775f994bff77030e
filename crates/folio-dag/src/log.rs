//! Append-only, crash-recoverable commit log.
//!
//! Each page persists its commits to one log file. Records are framed the
//! same way for every page:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized commit record)]
//! ```
//!
//! Commits are appended parent-before-child, so replaying the log in file
//! order rebuilds the DAG without forward references.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::commit::{Commit, CommitRecord, CommitRecordRef};
use crate::error::{DagError, DagResult};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct LogWriter {
    writer: BufWriter<File>,
    /// Current write offset in the log file.
    offset: u64,
}

/// Per-page commit log file.
pub struct CommitLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
}

impl CommitLog {
    /// Open (or create) the log file at the given path.
    pub fn open(path: &Path) -> DagResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset,
            }),
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("commit log lock poisoned").offset
    }

    /// Durably append one commit. Returns the byte offset of the record.
    pub fn append(&self, commit: &Commit) -> DagResult<u64> {
        let payload = encode(commit)?;
        let mut w = self.writer.lock().expect("commit log lock poisoned");
        let record_offset = w.offset;

        write_frame(&mut w.writer, &payload)?;
        w.writer.flush()?;
        w.writer.get_ref().sync_data()?;
        w.offset += (HEADER_SIZE + payload.len()) as u64;

        debug!(
            offset = record_offset,
            len = payload.len(),
            commit = %commit.id().short_hex(),
            "commit log append"
        );
        Ok(record_offset)
    }

    /// Read back every intact record in file order.
    ///
    /// A record whose CRC does not match is skipped; a truncated tail (a torn
    /// write from a crash) ends recovery. Both are logged.
    pub fn recover(&self) -> DagResult<Vec<CommitRecord>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(
                    path = %self.path.display(),
                    offset,
                    length,
                    file_len,
                    "torn commit log record; stopping recovery"
                );
                break;
            }

            let mut payload = vec![0u8; length as usize];
            file.read_exact(&mut payload)?;
            let next = offset + HEADER_SIZE as u64 + length as u64;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    path = %self.path.display(),
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch in commit log; skipping record"
                );
                offset = next;
                continue;
            }

            match bincode::deserialize::<CommitRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(offset, error = %e, "undecodable commit log record; skipping");
                }
            }
            offset = next;
        }

        debug!(path = %self.path.display(), recovered = records.len(), "commit log recovery complete");
        Ok(records)
    }

    /// Atomically replace the log contents with the given commits.
    ///
    /// The new log is written to a temporary file beside the old one and
    /// renamed over it, so a crash leaves either the old or the new log.
    pub fn rewrite<'a>(&self, commits: impl IntoIterator<Item = &'a Commit>) -> DagResult<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = NamedTempFile::new_in(&dir)?;
        let mut written: u64 = 0;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for commit in commits {
                let payload = encode(commit)?;
                write_frame(&mut out, &payload)?;
                written += (HEADER_SIZE + payload.len()) as u64;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;

        let mut w = self.writer.lock().expect("commit log lock poisoned");
        tmp.persist(&self.path).map_err(|e| DagError::Io(e.error))?;
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = written;

        debug!(path = %self.path.display(), bytes = written, "commit log rewritten");
        Ok(())
    }

    /// Delete the log file.
    pub fn remove(self) -> DagResult<()> {
        let CommitLog { path, writer } = self;
        drop(writer);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog").field("path", &self.path).finish()
    }
}

fn encode(commit: &Commit) -> DagResult<Vec<u8>> {
    bincode::serialize(&CommitRecordRef::from(commit))
        .map_err(|e| DagError::Serialization(e.to_string()))
}

fn write_frame<W: Write>(out: &mut W, payload: &[u8]) -> io::Result<()> {
    let length = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    out.write_all(&length.to_le_bytes())?;
    out.write_all(&crc.to_le_bytes())?;
    out.write_all(payload)
}
