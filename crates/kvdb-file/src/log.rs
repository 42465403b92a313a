//! Append-only data log.
//!
//! On-disk format, one frame per committed batch:
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized LogRecord)]
//! ```
//! A batch is one frame, so it is applied entirely or not at all on replay.

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};

use kvdb_store::batch::apply_ops;
use kvdb_store::{BatchOp, KeyMap, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SyncMode;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Puts per frame when rewriting the log during compaction.
const COMPACT_CHUNK: usize = 1024;

/// Capacity of the append buffer. Every frame is flushed on commit, so this
/// only needs to hold one typical frame.
const WRITE_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
enum LogRecord<'a> {
    Batch(Cow<'a, [BatchOp]>),
}

/// What [`DataLog::replay`] found on disk.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    pub map: KeyMap,
    /// Bytes of well-formed frames; anything after is a torn tail.
    pub valid_len: u64,
    pub records: usize,
    pub skipped: usize,
}

/// Writer half of the data log.
pub(crate) struct DataLog {
    path: PathBuf,
    writer: BufWriter<File>,
    offset: u64,
    sync_mode: SyncMode,
    /// Set when a failed append could not be rolled back; the file may hold a
    /// partial frame, so every later append is refused.
    failed: bool,
}

impl DataLog {
    /// Replay the log at `path` into a map. A missing file is an empty log.
    ///
    /// Frames failing the CRC check are skipped; replay stops at the first
    /// frame whose length runs past the end of the file.
    pub fn replay(path: &Path) -> StoreResult<Replay> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            let mut header = [0u8; HEADER_SIZE];
            reader.read_exact(&mut header)?;
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            let end = offset + HEADER_SIZE as u64 + length as u64;
            if length == 0 || end > file_len {
                warn!(offset, length, file_len, "torn log frame; stopping replay");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            reader.read_exact(&mut payload)?;
            offset = end;
            replay.valid_len = end;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping frame"
                );
                replay.skipped += 1;
                continue;
            }

            match bincode::deserialize::<LogRecord<'_>>(&payload) {
                Ok(LogRecord::Batch(ops)) => {
                    apply_ops(&mut replay.map, &ops);
                    replay.records += 1;
                }
                Err(e) => {
                    warn!(offset, error = %e, "undecodable log frame; skipping");
                    replay.skipped += 1;
                }
            }
        }

        debug!(
            records = replay.records,
            skipped = replay.skipped,
            entries = replay.map.len(),
            "log replay complete"
        );
        Ok(replay)
    }

    /// Open the log for appending, cutting it back to `valid_len` first.
    pub fn open(path: &Path, valid_len: u64, sync_mode: SyncMode) -> StoreResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            warn!(
                path = %path.display(),
                dropped = file_len - valid_len,
                "truncating torn tail of data log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(WRITE_BUFFER_BYTES, file),
            offset: valid_len,
            sync_mode,
            failed: false,
        })
    }

    /// Append one batch as a single frame. Returns the frame's offset.
    ///
    /// On a write or sync error the log is cut back to the last complete
    /// frame. If that fails too, the log refuses further appends.
    pub fn append(&mut self, ops: &[BatchOp]) -> StoreResult<u64> {
        if self.failed {
            return Err(StoreError::Io(io::Error::other(
                "data log is unusable after a failed append",
            )));
        }
        let payload = encode(ops)?;
        let entry_offset = self.offset;
        let written = write_frame(&mut self.writer, &payload).and_then(|()| self.sync());
        if let Err(e) = written {
            warn!(offset = entry_offset, error = %e, "log append failed; rolling back");
            if let Err(rollback) = self.rollback() {
                warn!(error = %rollback, "log rollback failed; refusing further appends");
                self.failed = true;
            }
            return Err(e.into());
        }
        self.offset += (HEADER_SIZE + payload.len()) as u64;

        debug!(offset = entry_offset, ops = ops.len(), len = payload.len(), "log append");
        Ok(entry_offset)
    }

    /// Replace the log with one holding only the live entries of `map`.
    ///
    /// The new log is written beside the old one and renamed over it.
    pub fn rewrite(&mut self, map: &KeyMap) -> StoreResult<()> {
        self.writer.flush()?;
        let tmp_path = self.path.with_extension("log.tmp");
        {
            let mut tmp = BufWriter::with_capacity(WRITE_BUFFER_BYTES, File::create(&tmp_path)?);
            let entries: Vec<(&Vec<u8>, &Vec<u8>)> = map.iter().collect();
            for chunk in entries.chunks(COMPACT_CHUNK) {
                let ops: Vec<BatchOp> = chunk
                    .iter()
                    .map(|(k, v)| BatchOp::Put {
                        key: (*k).clone(),
                        value: (*v).clone(),
                    })
                    .collect();
                write_frame(&mut tmp, &encode(&ops)?)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.offset = file.metadata()?.len();
        self.writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        self.failed = false;
        Ok(())
    }

    /// Flush buffered frames to the OS.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Current size of the log in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            self.writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Drop buffered bytes of a half-written frame and cut the file back to
    /// the end of the last complete frame.
    fn rollback(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = mem::replace(
            &mut self.writer,
            BufWriter::with_capacity(WRITE_BUFFER_BYTES, file),
        );
        let (_, _discarded) = stale.into_parts();
        let file = self.writer.get_mut();
        file.set_len(self.offset)?;
        file.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }
}

fn encode(ops: &[BatchOp]) -> StoreResult<Vec<u8>> {
    bincode::serialize(&LogRecord::Batch(Cow::Borrowed(ops)))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let length = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    w.write_all(&length.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, value: &str) -> BatchOp {
        BatchOp::Put {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    fn open_fresh(path: &Path) -> DataLog {
        DataLog::open(path, 0, SyncMode::OsDefault).unwrap()
    }

    #[test]
    fn append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = open_fresh(&path);
        log.append(&[put("a", "1"), put("b", "2")]).unwrap();
        log.append(&[BatchOp::Delete { key: b"a".to_vec() }]).unwrap();
        drop(log);

        let replay = DataLog::replay(&path).unwrap();
        assert_eq!(replay.records, 2);
        assert_eq!(replay.skipped, 0);
        assert_eq!(replay.map.len(), 1);
        assert_eq!(replay.map.get(&b"b"[..]), Some(&b"2".to_vec()));
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let replay = DataLog::replay(&dir.path().join("absent.log")).unwrap();
        assert!(replay.map.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn offsets_increase() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open_fresh(&dir.path().join("data.log"));
        let off1 = log.append(&[put("a", "1")]).unwrap();
        let off2 = log.append(&[put("b", "2")]).unwrap();
        assert_eq!(off1, 0);
        assert!(off2 > off1);
        assert!(log.offset() > off2);
    }

    #[test]
    fn crc_mismatch_skips_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = open_fresh(&path);
        log.append(&[put("a", "1")]).unwrap();
        log.append(&[put("b", "2")]).unwrap();
        drop(log);

        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
        }

        let replay = DataLog::replay(&path).unwrap();
        assert_eq!(replay.skipped, 1);
        assert!(!replay.map.contains_key(&b"a"[..]));
        assert!(replay.map.contains_key(&b"b"[..]));
    }

    #[test]
    fn torn_tail_drops_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = open_fresh(&path);
        log.append(&[put("a", "1")]).unwrap();
        let first_len = log.offset();
        log.append(&[put("b", "2"), put("c", "3")]).unwrap();
        let total = log.offset();
        drop(log);

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(total - 3).unwrap();
        drop(file);

        let replay = DataLog::replay(&path).unwrap();
        assert_eq!(replay.valid_len, first_len);
        assert_eq!(replay.map.len(), 1);
        assert!(!replay.map.contains_key(&b"b"[..]));
    }

    #[test]
    fn reopen_truncates_torn_tail_before_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = open_fresh(&path);
        log.append(&[put("a", "1")]).unwrap();
        log.append(&[put("b", "2")]).unwrap();
        let total = log.offset();
        drop(log);
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(total - 1)
            .unwrap();

        let replay = DataLog::replay(&path).unwrap();
        let mut log = DataLog::open(&path, replay.valid_len, SyncMode::EveryWrite).unwrap();
        log.append(&[put("c", "3")]).unwrap();
        drop(log);

        let replay = DataLog::replay(&path).unwrap();
        assert_eq!(replay.skipped, 0);
        assert!(replay.map.contains_key(&b"a"[..]));
        assert!(!replay.map.contains_key(&b"b"[..]));
        assert!(replay.map.contains_key(&b"c"[..]));
    }

    #[test]
    fn rewrite_keeps_only_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = open_fresh(&path);
        for i in 0..50 {
            log.append(&[put("hot", &i.to_string())]).unwrap();
        }
        log.append(&[put("cold", "x")]).unwrap();
        let before = log.offset();

        let live = DataLog::replay(&path).unwrap().map;
        log.rewrite(&live).unwrap();
        assert!(log.offset() < before);

        log.append(&[put("after", "y")]).unwrap();
        drop(log);

        let replay = DataLog::replay(&path).unwrap();
        assert_eq!(replay.map.len(), 3);
        assert_eq!(replay.map.get(&b"hot"[..]), Some(&b"49".to_vec()));
        assert!(!path.with_extension("log.tmp").exists());
    }

    #[test]
    fn rollback_discards_half_written_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = open_fresh(&path);
        log.append(&[put("a", "1")]).unwrap();

        // Part of a frame reached the file, the rest is still buffered.
        log.writer.write_all(&[0xAB; 6]).unwrap();
        log.writer.flush().unwrap();
        log.writer.write_all(&[0xCD; 3]).unwrap();
        log.rollback().unwrap();

        log.append(&[put("b", "2")]).unwrap();
        let end = log.offset();
        drop(log);

        let replay = DataLog::replay(&path).unwrap();
        assert_eq!(replay.records, 2);
        assert_eq!(replay.skipped, 0);
        assert_eq!(replay.valid_len, end);
        assert_eq!(fs::metadata(&path).unwrap().len(), end);
        assert!(replay.map.contains_key(&b"b"[..]));
    }

    #[test]
    fn append_failure_fences_log_when_rollback_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let mut log = open_fresh(&path);
        log.append(&[put("a", "1")]).unwrap();
        drop(log);

        // A read-only handle makes both the flush and the truncate fail.
        let file = File::open(&path).unwrap();
        let offset = file.metadata().unwrap().len();
        let mut log = DataLog {
            path: path.clone(),
            writer: BufWriter::new(file),
            offset,
            sync_mode: SyncMode::OsDefault,
            failed: false,
        };

        assert!(log.append(&[put("b", "2")]).is_err());
        assert!(log.failed);
        assert_eq!(log.offset(), offset);
        assert!(log.append(&[put("c", "3")]).is_err());
        drop(log);

        let replay = DataLog::replay(&path).unwrap();
        assert_eq!(replay.records, 1);
        assert_eq!(replay.valid_len, offset);
    }
}
