//! Append-only uptime log file.
//!
//! [`LogStore`] owns every access to the log file. All operations take the
//! same in-process mutex, so concurrent trackers never interleave a
//! read-modify-write with an append. Nothing here protects against a second
//! process touching the file.

use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};
use uptime_core::error::{MonitorError, Result};

/// Serialized access to the line-oriented uptime log.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LogStore {
    /// Create a store for `path`. The file and its parent directory are
    /// created lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn io_err(&self, source: std::io::Error) -> MonitorError {
        MonitorError::log_io(&self.path, source)
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Append one line and flush.
    pub fn append(&self, line: &str) -> Result<()> {
        let _guard = self.guard();
        self.append_locked(line)
    }

    /// Remove the last line satisfying `predicate`, rewriting the file.
    ///
    /// Returns `true` when a line was removed. A missing file or no match is
    /// a no-op returning `false`.
    pub fn remove_last_matching(&self, predicate: impl Fn(&str) -> bool) -> Result<bool> {
        let _guard = self.guard();
        self.remove_last_matching_locked(&predicate)
    }

    /// Remove the last line satisfying `predicate` (if any) and append
    /// `line`, as one step under the lock.
    ///
    /// Returns whether a line was removed.
    pub fn replace_last_matching(
        &self,
        predicate: impl Fn(&str) -> bool,
        line: &str,
    ) -> Result<bool> {
        let _guard = self.guard();
        let removed = self.remove_last_matching_locked(&predicate)?;
        self.append_locked(line)?;
        Ok(removed)
    }

    /// All lines in file order, without line terminators. A missing file
    /// reads as empty.
    ///
    /// Bytes that are not valid UTF-8 (older logs written in a legacy
    /// encoding, hand edits) are replaced with U+FFFD and the line is kept.
    pub fn read_all(&self) -> Result<Vec<String>> {
        let _guard = self.guard();
        let Some(content) = self.read_raw_locked()? else {
            return Ok(Vec::new());
        };
        Ok(split_lines(&content)
            .enumerate()
            .map(|(index, raw)| {
                let line = String::from_utf8_lossy(raw);
                if matches!(line, Cow::Owned(_)) {
                    warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        "log line is not valid UTF-8"
                    );
                }
                line.into_owned()
            })
            .collect())
    }

    // ── Private helpers (caller holds the lock) ───────────────────────────

    fn read_raw_locked(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn append_locked(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        // A hand-edited file may lack a final newline; never glue onto it.
        let mut record = String::with_capacity(line.len() + 2);
        if ends_without_newline(&mut file).map_err(|e| self.io_err(e))? {
            record.push('\n');
        }
        record.push_str(line);
        record.push('\n');

        file.write_all(record.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), "appended log line");
        Ok(())
    }

    fn remove_last_matching_locked(&self, predicate: &dyn Fn(&str) -> bool) -> Result<bool> {
        let Some(content) = self.read_raw_locked()? else {
            return Ok(false);
        };

        let segments: Vec<&[u8]> = content.split_inclusive(|b| *b == b'\n').collect();
        let Some(index) = segments
            .iter()
            .rposition(|segment| predicate(&String::from_utf8_lossy(trim_terminator(segment))))
        else {
            return Ok(false);
        };

        // Every other line keeps its exact bytes, whatever their encoding.
        let mut rewritten = Vec::with_capacity(content.len());
        for (i, segment) in segments.iter().enumerate() {
            if i != index {
                rewritten.extend_from_slice(segment);
            }
        }

        // Write to a temp file then rename so a crash never truncates the log.
        let tmp = self.path.with_extension("log.tmp");
        fs::write(&tmp, &rewritten).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), line = index, "removed log line");
        Ok(true)
    }
}

/// Lines of `content` without their `\n` / `\r\n` terminators.
fn split_lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content
        .split_inclusive(|b| *b == b'\n')
        .map(trim_terminator)
}

fn trim_terminator(segment: &[u8]) -> &[u8] {
    let segment = segment.strip_suffix(b"\n").unwrap_or(segment);
    segment.strip_suffix(b"\r").unwrap_or(segment)
}

fn ends_without_newline(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

// ── Tests ─────────────────────────────────────────────────────────────────────
