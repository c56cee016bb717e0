//! The append pipeline: validate, write, and advance a working copy of
//! [`JournalState`]. Nothing in here touches any lock — the caller
//! ([`crate::journal::Journal::append`]) snapshots the starting state before
//! calling in and publishes the returned state under the narrow state lock
//! afterward, so append never needs the wide files lock.

use std::fs::File;

use tracing::instrument;

use crate::error::AppendError;
use crate::format::{checksum, pad_len, record_span, DatRecordHeader, IdxRecord, HEADER_LEN};
use crate::pio::PositionalIo;
use crate::state::JournalState;

/// One entry supplied to [`crate::journal::Journal::append`]. `seqnum == 0`
/// means "assign the next available seqnum"; `timestamp == 0` means "assign
/// the current wall-clock time, clamped to be non-decreasing".
#[derive(Debug, Clone, Copy)]
pub struct AppendEntry<'a> {
    pub seqnum: u64,
    pub timestamp: u64,
    pub data: &'a [u8],
}

impl<'a> AppendEntry<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        AppendEntry {
            seqnum: 0,
            timestamp: 0,
            data,
        }
    }

    pub fn with_seqnum(mut self, seqnum: u64) -> Self {
        self.seqnum = seqnum;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

pub(crate) struct AppendOutcome {
    pub state: JournalState,
    pub written: usize,
}

/// Runs the batch. Returns the new state (which reflects however many
/// entries were actually written and flushed) alongside an optional cause if
/// the batch stopped early. The caller publishes `state` regardless of
/// whether a cause is present, since entries written before a failure are
/// still durable.
#[instrument(skip_all, fields(batch_len = entries.len()))]
pub(crate) fn append(
    dat: &File,
    idx: &File,
    current: JournalState,
    entries: &[AppendEntry<'_>],
    fsync: bool,
    now_millis: impl Fn() -> u64,
) -> (AppendOutcome, Option<AppendError>) {
    let mut working = current;
    let mut written = 0usize;
    let mut cause = None;

    for entry in entries {
        let seqnum = if entry.seqnum == 0 {
            if working.is_empty() {
                1
            } else {
                working.seqnum2 + 1
            }
        } else {
            entry.seqnum
        };

        if !working.is_empty() && seqnum != working.seqnum2 + 1 {
            cause = Some(AppendError::BrokenSequence {
                expected: working.seqnum2 + 1,
                actual: seqnum,
            });
            break;
        }

        let timestamp = if entry.timestamp == 0 {
            now_millis().max(working.timestamp2)
        } else {
            entry.timestamp
        };
        if !working.is_empty() && timestamp < working.timestamp2 {
            cause = Some(AppendError::TimestampRegression {
                timestamp,
                last: working.timestamp2,
            });
            break;
        }

        let data_len = entry.data.len() as u32;
        let pos = working.dat_end;
        let sum = checksum(seqnum, timestamp, data_len, entry.data);
        let header = DatRecordHeader {
            seqnum,
            timestamp,
            data_len,
            checksum: sum,
        };

        let mut record = Vec::with_capacity(record_span(data_len) as usize);
        record.extend_from_slice(&header.encode());
        record.extend_from_slice(entry.data);
        record.resize(record.len() + pad_len(data_len) as usize, 0);

        if let Err(source) = dat.pwrite_all(&record, pos) {
            cause = Some(AppendError::WriteDat { source });
            break;
        }

        let idx_pos = if working.is_empty() {
            HEADER_LEN as u64
        } else {
            IdxRecord::offset_for(working.seqnum1, seqnum)
        };
        let idx_record = IdxRecord {
            seqnum,
            timestamp,
            pos,
        }
        .encode();
        if let Err(source) = idx.pwrite_all(&idx_record, idx_pos) {
            cause = Some(AppendError::WriteIdx { source });
            break;
        }

        if working.is_empty() {
            working.seqnum1 = seqnum;
            working.timestamp1 = timestamp;
        }
        working.seqnum2 = seqnum;
        working.timestamp2 = timestamp;
        working.dat_end = pos + record_span(data_len);
        written += 1;
    }

    if written > 0 && fsync && cause.is_none() {
        if let Err(source) = dat.sync_data() {
            cause = Some(AppendError::FlushDat { source });
        }
    }

    (AppendOutcome { state: working, written }, cause)
}
