//! Append-only, hash-chained JSON-lines logs.
//!
//! Every record is wrapped in an [`Envelope`] carrying its sequence number, the
//! hash of the previous envelope and its own hash. The file is opened in
//! append mode and never rewritten, so editing, deleting or reordering a line
//! breaks the chain and is caught by [`AppendLog::verify`].
//!
//! # Hash input
//!
//! ```text
//! sha256( prev "\n" seq "\n" recorded_at(rfc3339, nanos) "\n" canonical_json(record) )
//! ```
//!
//! `canonical_json` serializes through `serde_json::Value`, whose maps are
//! key-sorted, so a parsed record re-hashes to the same digest.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use provenance_types::Timestamp;

use crate::digest::sha256_hex;

/// `prev` value of the first envelope in every log.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log io failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize log record: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("line {line} is not a valid log envelope: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("hash chain broken at seq {seq}: {reason}")]
    ChainBroken { seq: u64, reason: String },
}

/// One line of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<R> {
    pub seq: u64,
    pub prev: String,
    pub hash: String,
    pub recorded_at: Timestamp,
    pub record: R,
}

#[derive(Debug)]
enum Backend {
    File { path: PathBuf, file: File },
    Memory { lines: Vec<String> },
}

/// Append-only log of `R` records.
#[derive(Debug)]
pub struct AppendLog<R> {
    backend: Backend,
    next_seq: u64,
    head_hash: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> AppendLog<R>
where
    R: Serialize + DeserializeOwned,
{
    /// Open or create a log file, verifying the existing chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| LogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|source| LogError::Io {
                path: path.clone(),
                source,
            })?;

        let mut log = Self {
            backend: Backend::File { path, file },
            next_seq: 0,
            head_hash: GENESIS_HASH.to_string(),
            _record: PhantomData,
        };
        let entries = log.read_all()?;
        if let Some(last) = entries.last() {
            log.next_seq = last.seq + 1;
            log.head_hash = last.hash.clone();
        }
        tracing::debug!(entries = entries.len(), "Opened append log");
        Ok(log)
    }

    /// Open an existing log for reading and verification only. Appends fail.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| LogError::Io {
            path: path.clone(),
            source,
        })?;
        let mut log = Self {
            backend: Backend::File { path, file },
            next_seq: 0,
            head_hash: GENESIS_HASH.to_string(),
            _record: PhantomData,
        };
        if let Some(last) = log.read_all()?.last() {
            log.next_seq = last.seq + 1;
            log.head_hash = last.hash.clone();
        }
        Ok(log)
    }

    /// Open an in-memory log (for testing and ephemeral runs).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory { lines: Vec::new() },
            next_seq: 0,
            head_hash: GENESIS_HASH.to_string(),
            _record: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.backend {
            Backend::File { path, .. } => Some(path),
            Backend::Memory { .. } => None,
        }
    }

    /// Number of records appended so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.next_seq
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next_seq == 0
    }

    /// Hash of the most recent envelope.
    #[must_use]
    pub fn head_hash(&self) -> &str {
        &self.head_hash
    }

    /// Append one record. The line is synced to disk before returning.
    pub fn append(&mut self, record: &R) -> Result<u64, LogError> {
        self.append_all(std::slice::from_ref(record))
    }

    /// Append several records with a single write. Either every line lands or
    /// the file is cut back to its previous length and the chain head is
    /// unchanged. Returns the sequence number of the first record.
    pub fn append_all(&mut self, records: &[R]) -> Result<u64, LogError> {
        let first = self.next_seq;
        let mut seq = first;
        let mut head = self.head_hash.clone();
        let mut buf = String::new();
        let mut lines = Vec::with_capacity(records.len());

        for record in records {
            let recorded_at = Utc::now();
            let canonical = canonical_json(record)?;
            let hash = chain_hash(&head, seq, &recorded_at, &canonical);
            let envelope = Envelope {
                seq,
                prev: head,
                hash: hash.clone(),
                recorded_at,
                record,
            };
            let line = serde_json::to_string(&envelope).map_err(LogError::Serialize)?;
            buf.push_str(&line);
            buf.push('\n');
            lines.push(line);
            head = hash;
            seq += 1;
        }
        if lines.is_empty() {
            return Ok(first);
        }

        match &mut self.backend {
            Backend::File { path, file } => {
                commit(file, buf.as_bytes()).map_err(|source| LogError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            Backend::Memory { lines: stored } => stored.extend(lines),
        }

        self.next_seq = seq;
        self.head_hash = head;
        Ok(first)
    }

    /// Read and verify every envelope in order.
    pub fn read_all(&self) -> Result<Vec<Envelope<R>>, LogError> {
        let lines = self.raw_lines()?;
        let mut entries = Vec::with_capacity(lines.len());
        let mut prev = GENESIS_HASH.to_string();

        for (index, line) in lines.iter().enumerate() {
            let envelope: Envelope<serde_json::Value> =
                serde_json::from_str(line).map_err(|source| LogError::Parse {
                    line: index + 1,
                    source,
                })?;
            let expected_seq = index as u64;
            if envelope.seq != expected_seq {
                return Err(LogError::ChainBroken {
                    seq: envelope.seq,
                    reason: format!("expected seq {expected_seq}"),
                });
            }
            if envelope.prev != prev {
                return Err(LogError::ChainBroken {
                    seq: envelope.seq,
                    reason: "previous hash does not match".to_string(),
                });
            }
            let canonical =
                serde_json::to_string(&envelope.record).map_err(LogError::Serialize)?;
            let recomputed = chain_hash(&prev, envelope.seq, &envelope.recorded_at, &canonical);
            if recomputed != envelope.hash {
                return Err(LogError::ChainBroken {
                    seq: envelope.seq,
                    reason: "record hash does not match contents".to_string(),
                });
            }

            let record: R =
                serde_json::from_value(envelope.record).map_err(|source| LogError::Parse {
                    line: index + 1,
                    source,
                })?;
            prev = envelope.hash.clone();
            entries.push(Envelope {
                seq: envelope.seq,
                prev: envelope.prev,
                hash: envelope.hash,
                recorded_at: envelope.recorded_at,
                record,
            });
        }

        Ok(entries)
    }

    /// Records only, in append order.
    pub fn records(&self) -> Result<Vec<R>, LogError> {
        Ok(self.read_all()?.into_iter().map(|e| e.record).collect())
    }

    /// Verify the whole chain and return the number of intact records.
    pub fn verify(&self) -> Result<u64, LogError> {
        let entries = self.read_all()?;
        let count = entries.len() as u64;
        if count != self.next_seq {
            return Err(LogError::ChainBroken {
                seq: count,
                reason: format!("log holds {count} records but {} were appended", self.next_seq),
            });
        }
        Ok(count)
    }

    fn raw_lines(&self) -> Result<Vec<String>, LogError> {
        match &self.backend {
            Backend::Memory { lines } => Ok(lines.clone()),
            Backend::File { path, .. } => {
                let file = File::open(path).map_err(|source| LogError::Io {
                    path: path.clone(),
                    source,
                })?;
                let mut lines = Vec::new();
                for line in BufReader::new(file).lines() {
                    let line = line.map_err(|source| LogError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    if !line.trim().is_empty() {
                        lines.push(line);
                    }
                }
                Ok(lines)
            }
        }
    }

    #[cfg(test)]
    fn memory_lines_mut(&mut self) -> &mut Vec<String> {
        match &mut self.backend {
            Backend::Memory { lines } => lines,
            Backend::File { .. } => panic!("not an in-memory log"),
        }
    }
}

/// Destination of log bytes that can be cut back after a failed write.
trait Sink: Write {
    fn len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl Sink for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write `bytes` in one call and sync. On failure the sink is truncated to
/// its length before the write so no partial line is left behind.
fn commit<S: Sink>(sink: &mut S, bytes: &[u8]) -> io::Result<()> {
    let before = sink.len()?;
    let written = sink.write_all(bytes).and_then(|()| sink.sync());
    if let Err(err) = written {
        if let Err(cut) = sink.truncate(before) {
            tracing::error!(len = before, "Failed to truncate torn log write: {cut}");
        }
        return Err(err);
    }
    Ok(())
}

fn canonical_json<R: Serialize>(record: &R) -> Result<String, LogError> {
    let value = serde_json::to_value(record).map_err(LogError::Serialize)?;
    serde_json::to_string(&value).map_err(LogError::Serialize)
}

fn chain_hash(prev: &str, seq: u64, recorded_at: &Timestamp, canonical: &str) -> String {
    let stamp = recorded_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
    sha256_hex(format!("{prev}\n{seq}\n{stamp}\n{canonical}").as_bytes())
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use serde::{Deserialize, Serialize};

    use super::{AppendLog, GENESIS_HASH, LogError, Sink, commit};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
        value: f64,
    }

    fn entry(name: &str, value: f64) -> Entry {
        Entry {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn append_and_read_back_in_order() {
        let mut log = AppendLog::in_memory();
        assert_eq!(log.append(&entry("a", 1.0)).unwrap(), 0);
        assert_eq!(log.append(&entry("b", 137.035_999_084)).unwrap(), 1);

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].prev, GENESIS_HASH);
        assert_eq!(entries[1].prev, entries[0].hash);
        assert_eq!(entries[1].record, entry("b", 137.035_999_084));
        assert_eq!(log.verify().unwrap(), 2);
    }

    #[test]
    fn edited_line_breaks_chain() {
        let mut log = AppendLog::in_memory();
        log.append(&entry("a", 1.0)).unwrap();
        log.append(&entry("b", 2.0)).unwrap();

        let lines = log.memory_lines_mut();
        lines[0] = lines[0].replace("\"value\":1.0", "\"value\":1.5");

        let err = log.verify().unwrap_err();
        assert!(matches!(err, LogError::ChainBroken { seq: 0, .. }));
    }

    #[test]
    fn removed_line_breaks_chain() {
        let mut log = AppendLog::in_memory();
        log.append(&entry("a", 1.0)).unwrap();
        log.append(&entry("b", 2.0)).unwrap();
        log.append(&entry("c", 3.0)).unwrap();

        log.memory_lines_mut().remove(1);

        assert!(matches!(
            log.verify().unwrap_err(),
            LogError::ChainBroken { .. }
        ));
    }

    #[test]
    fn reopen_continues_chain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");

        {
            let mut log = AppendLog::open(&path).unwrap();
            log.append(&entry("a", 1.0)).unwrap();
        }
        let mut log: AppendLog<Entry> = AppendLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.append(&entry("b", 2.0)).unwrap(), 1);
        assert_eq!(log.records().unwrap(), vec![entry("a", 1.0), entry("b", 2.0)]);
    }

    #[test]
    fn tampered_file_fails_to_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");
        {
            let mut log = AppendLog::open(&path).unwrap();
            log.append(&entry("a", 1.0)).unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("\"a\"", "\"z\"")).unwrap();

        let result: Result<AppendLog<Entry>, _> = AppendLog::open(&path);
        assert!(matches!(result, Err(LogError::ChainBroken { .. })));
    }

    /// Accepts `budget` bytes, then fails every write.
    struct ShortSink {
        bytes: Vec<u8>,
        budget: usize,
    }

    impl Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("no space left"));
            }
            let n = buf.len().min(self.budget);
            self.bytes.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Sink for ShortSink {
        fn len(&self) -> io::Result<u64> {
            Ok(self.bytes.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.bytes.truncate(usize::try_from(len).unwrap());
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_write_leaves_no_torn_line() {
        let mut sink = ShortSink {
            bytes: b"{\"seq\":0}\n".to_vec(),
            budget: 5,
        };
        let err = commit(&mut sink, b"{\"seq\":1}\n").unwrap_err();
        assert_eq!(err.to_string(), "no space left");
        assert_eq!(sink.bytes, b"{\"seq\":0}\n");

        sink.budget = 64;
        commit(&mut sink, b"{\"seq\":1}\n").unwrap();
        assert_eq!(sink.bytes, b"{\"seq\":0}\n{\"seq\":1}\n");
    }

    #[test]
    fn batch_append_chains_every_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");
        let mut log = AppendLog::open(&path).unwrap();
        log.append(&entry("a", 1.0)).unwrap();
        assert_eq!(log.append_all(&[entry("b", 2.0), entry("c", 3.0)]).unwrap(), 1);
        assert_eq!(log.append_all(&[]).unwrap(), 3);

        let reopened: AppendLog<Entry> = AppendLog::open(&path).unwrap();
        assert_eq!(reopened.verify().unwrap(), 3);
        assert_eq!(reopened.head_hash(), log.head_hash());
    }

    #[test]
    fn read_only_log_rejects_appends_and_keeps_head() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");
        {
            let mut log = AppendLog::open(&path).unwrap();
            log.append(&entry("a", 1.0)).unwrap();
        }
        let mut log: AppendLog<Entry> = AppendLog::open_read_only(&path).unwrap();
        let head = log.head_hash().to_string();
        assert!(matches!(
            log.append(&entry("b", 2.0)),
            Err(LogError::Io { .. })
        ));
        assert_eq!(log.len(), 1);
        assert_eq!(log.head_hash(), head);
        assert_eq!(log.verify().unwrap(), 1);

        assert!(matches!(
            AppendLog::<Entry>::open_read_only(dir.path().join("missing.jsonl")),
            Err(LogError::Io { .. })
        ));
    }
}
