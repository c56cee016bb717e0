//! The public [`Journal`] handle: orchestrates the codec, recovery, append,
//! read, and truncation modules behind the two-lock concurrency discipline,
//! closing its files and releasing the advisory lock on [`Drop`].

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tracing::instrument;

use crate::append::{self, AppendEntry};
use crate::config::JournalOptions;
use crate::error::{AppendError, JournalError, ReadClosedSnafu, TruncateClosedSnafu};
use crate::lock::JournalLock;
use crate::read::{self, Entry, EntryRef, SearchMode, Stats};
use crate::recovery;
use crate::state::JournalState;
use crate::truncate;

struct JournalFiles {
    dat: File,
    idx: File,
}

/// An open, crash-safe append-only journal.
///
/// Cloning is not supported; share a `Journal` across threads behind an
/// `Arc` the way a single writer thread and any number of reader threads
/// would in the concurrency model this crate implements: one thread
/// calls [`Journal::append`]/[`Journal::rollback`]/[`Journal::purge`], any
/// number of others call [`Journal::read`]/[`Journal::stats`]/[`Journal::search`].
pub struct Journal {
    opts: JournalOptions,
    files: RwLock<JournalFiles>,
    state: Mutex<JournalState>,
    lock: Mutex<Option<JournalLock>>,
    closed: AtomicBool,
    fsync: AtomicBool,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Journal {
    /// Opens (creating if necessary) the journal named `name` in `path`,
    /// with default options (shallow open, no fsync).
    pub fn open(
        path: impl AsRef<std::path::Path>,
        name: impl Into<String>,
    ) -> Result<Journal, JournalError> {
        JournalOptions::new(path, name).open()
    }

    pub(crate) fn open_with_options(opts: JournalOptions) -> Result<Journal, JournalError> {
        opts.validate()?;
        let opened = recovery::open(&opts)?;
        let fsync = opts.fsync_enabled();
        Ok(Journal {
            opts,
            files: RwLock::new(JournalFiles {
                dat: opened.dat,
                idx: opened.idx,
            }),
            state: Mutex::new(opened.state),
            lock: Mutex::new(Some(opened.lock)),
            closed: AtomicBool::new(false),
            fsync: AtomicBool::new(fsync),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Releases the files and the advisory lock. Idempotent: calling this
    /// more than once, or letting `Journal` drop afterward, is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut lock) = self.lock.lock().take() {
            lock.release();
        }
    }

    /// Whether fsync is enabled for subsequent appends and truncations.
    pub fn fsync_enabled(&self) -> bool {
        self.fsync.load(Ordering::Acquire)
    }

    /// Toggles fsync mode on this already-open journal, matching
    /// `ldb_set_fsync`: subsequent appends and truncations honor the new
    /// setting immediately, with no effect on data already flushed.
    pub fn set_fsync(&self, enabled: bool) {
        self.fsync.store(enabled, Ordering::Release);
    }

    /// Snapshot of the current in-memory bounds.
    pub fn state(&self) -> JournalState {
        *self.state.lock()
    }

    /// Appends a batch of entries. Returns the number of entries actually
    /// written and flushed, which can be less than `entries.len()` if the
    /// batch stopped early on a validation or I/O failure -- see
    /// [`crate::error::JournalError::Append`].
    ///
    /// This does not take the wide files lock: it relies on the
    /// data file only growing during append and on `state` being published
    /// only after the batch's writes are flushed, so concurrent readers
    /// never observe a torn record.
    #[instrument(skip(self, entries))]
    pub fn append(&self, entries: &[AppendEntry<'_>]) -> Result<usize, JournalError> {
        if self.is_closed() {
            return Err(JournalError::Append {
                written: 0,
                source: AppendError::Closed,
            });
        }
        let current = self.state();
        let files = self.files.read();
        let (outcome, cause) = append::append(
            &files.dat,
            &files.idx,
            current,
            entries,
            self.fsync_enabled(),
            now_millis,
        );
        *self.state.lock() = outcome.state;
        match cause {
            None => Ok(outcome.written),
            Some(source) => Err(JournalError::Append {
                written: outcome.written,
                source,
            }),
        }
    }

    /// Reads starting at `start_seqnum` into `buf`, producing at most
    /// `max_entries` entries whose payloads borrow from `buf`.
    #[instrument(skip(self, buf))]
    pub fn read<'buf>(
        &self,
        start_seqnum: u64,
        max_entries: usize,
        buf: &'buf mut [u8],
    ) -> Result<Vec<EntryRef<'buf>>, JournalError> {
        if self.is_closed() {
            return ReadClosedSnafu.fail().map_err(Into::into);
        }
        let state = self.state();
        let files = self.files.read();
        Ok(read::read(&files.dat, &files.idx, &state, start_seqnum, max_entries, buf)?)
    }

    /// Like [`Journal::read`], but allocates owned copies of each entry's
    /// payload instead of borrowing from a caller buffer.
    pub fn read_owned(&self, start_seqnum: u64, max_entries: usize) -> Result<Vec<Entry>, JournalError> {
        let state = self.state();
        if !state.contains(start_seqnum) {
            return Err(JournalError::Read {
                source: crate::error::ReadError::NotFound {
                    seqnum: start_seqnum,
                },
            });
        }
        let remaining = (state.seqnum2 - start_seqnum + 1).min(max_entries as u64);
        let mut buf = vec![0u8; (remaining as usize) * 4096];
        loop {
            let refs = self.read(start_seqnum, max_entries, &mut buf)?;
            let complete = refs.iter().all(|e| e.data.is_some());
            if complete || buf.len() > 64 * 1024 * 1024 {
                return Ok(refs
                    .into_iter()
                    .filter_map(|e| {
                        e.data.map(|d| Entry {
                            seqnum: e.seqnum,
                            timestamp: e.timestamp,
                            data: d.to_vec(),
                        })
                    })
                    .collect());
            }
            buf.resize(buf.len() * 2, 0);
        }
    }

    /// Aggregate stats over `[seqnum_lo, seqnum_hi]`, clamped to the
    /// journal's actual bounds.
    pub fn stats(&self, seqnum_lo: u64, seqnum_hi: u64) -> Result<Stats, JournalError> {
        if self.is_closed() {
            return ReadClosedSnafu.fail().map_err(Into::into);
        }
        let state = self.state();
        let files = self.files.read();
        Ok(read::stats(&files.dat, &files.idx, &state, seqnum_lo, seqnum_hi)?)
    }

    /// Binary search over the index by timestamp.
    pub fn search(&self, timestamp: u64, mode: SearchMode) -> Result<u64, JournalError> {
        if self.is_closed() {
            return ReadClosedSnafu.fail().map_err(Into::into);
        }
        let state = self.state();
        let files = self.files.read();
        Ok(read::search(&files.idx, &state, timestamp, mode)?)
    }

    /// Drops every entry with `seqnum' > seqnum`. Returns the number of
    /// entries removed; a no-op returns `0`.
    #[instrument(skip(self))]
    pub fn rollback(&self, seqnum: u64) -> Result<u64, JournalError> {
        if self.is_closed() {
            return TruncateClosedSnafu.fail().map_err(Into::into);
        }
        let state = self.state();
        let files = self.files.write();
        let (removed, new_state) =
            truncate::rollback(&files.dat, &files.idx, &state, seqnum, self.fsync_enabled())?;
        *self.state.lock() = new_state;
        Ok(removed)
    }

    /// Drops every entry with `seqnum' < seqnum` by rewriting the data file.
    /// Returns the number of entries removed; a no-op returns `0`.
    #[instrument(skip(self))]
    pub fn purge(&self, seqnum: u64) -> Result<u64, JournalError> {
        if self.is_closed() {
            return TruncateClosedSnafu.fail().map_err(Into::into);
        }
        let state = self.state();
        let mut files = self.files.write();
        let (removed, new_state) = truncate::purge(
            &mut files.dat,
            &mut files.idx,
            &self.opts.dat_path(),
            &self.opts.idx_path(),
            &self.opts.tmp_path(),
            &state,
            seqnum,
        )?;
        *self.state.lock() = new_state;
        Ok(removed)
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        self.close();
    }
}

/// Semantic version of this crate, as a stable, human-readable string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
