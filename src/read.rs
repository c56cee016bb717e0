//! Positional read, stats, and timestamp search. None of these operations
//! take the narrow state lock for longer than a snapshot copy, and all of
//! them read via [`crate::pio::PositionalIo`] so they never disturb the
//! writer's notion of file position.

use std::fs::File;

use snafu::ResultExt;
use tracing::instrument;

use crate::error::read::{
    CorruptIdxSnafu, NotFoundSnafu, ReadDatSnafu, ReadIdxSnafu, TimestampNotFoundSnafu,
};
use crate::error::ReadError;
use crate::format::{record_span, DatRecordHeader, IdxRecord, DAT_HEADER_LEN, IDX_RECORD_LEN};
use crate::pio::{pread_best_effort, PositionalIo};
use crate::state::JournalState;

/// One of the possibly-multiple entries produced by [`read`]. Its `data`
/// field borrows from the caller-supplied buffer; `data == None` with
/// `data_len > 0` signals a partial trailing entry whose payload didn't fit
/// in the buffer (the caller should retry with a buffer at least `data_len`
/// bytes larger).
#[derive(Debug, Clone, Copy)]
pub struct EntryRef<'buf> {
    pub seqnum: u64,
    pub timestamp: u64,
    pub data_len: u32,
    pub data: Option<&'buf [u8]>,
}

/// An owned entry, as produced by [`crate::journal::Journal::read_owned`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub seqnum: u64,
    pub timestamp: u64,
    pub data: Vec<u8>,
}

/// Aggregate statistics over a clamped seqnum range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub min_seqnum: u64,
    pub max_seqnum: u64,
    pub min_timestamp: u64,
    pub max_timestamp: u64,
    pub num_entries: u64,
    pub index_size: u64,
    pub data_size: u64,
}

/// Binary search direction for [`search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// First seqnum with `timestamp >= target`.
    Lower,
    /// First seqnum with `timestamp > target`.
    Upper,
}

fn read_idx_record_at(file: &File, pos: u64) -> std::io::Result<IdxRecord> {
    let mut buf = [0u8; IDX_RECORD_LEN];
    file.pread_exact(&mut buf, pos)?;
    Ok(IdxRecord::decode(&buf))
}

#[instrument(skip(dat, idx, buf), fields(start_seqnum))]
pub(crate) fn read<'buf>(
    dat: &File,
    idx: &File,
    state: &JournalState,
    start_seqnum: u64,
    max_entries: usize,
    buf: &'buf mut [u8],
) -> Result<Vec<EntryRef<'buf>>, ReadError> {
    if !state.contains(start_seqnum) {
        return NotFoundSnafu {
            seqnum: start_seqnum,
        }
        .fail();
    }

    let start_rec =
        read_idx_record_at(idx, IdxRecord::offset_for(state.seqnum1, start_seqnum)).context(ReadIdxSnafu)?;
    if start_rec.seqnum != start_seqnum {
        return CorruptIdxSnafu {
            reason: format!(
                "index slot for seqnum {start_seqnum} holds seqnum {}",
                start_rec.seqnum
            ),
        }
        .fail();
    }
    let start_pos = start_rec.pos;

    let read_len = if max_entries > 0 {
        let requested_end = start_seqnum + max_entries as u64 - 1;
        if requested_end <= state.seqnum2 {
            let end_bound = if requested_end == state.seqnum2 {
                state.dat_end
            } else {
                read_idx_record_at(idx, IdxRecord::offset_for(state.seqnum1, requested_end + 1))
                    .context(ReadIdxSnafu)?
                    .pos
            };
            ((end_bound - start_pos) as usize).min(buf.len())
        } else {
            buf.len()
        }
    } else {
        buf.len()
    };
    let available = (state.dat_end - start_pos) as usize;
    let read_len = read_len.min(available);

    let actual_len = pread_best_effort(dat, &mut buf[..read_len], start_pos).context(ReadDatSnafu)?;

    let mut out = Vec::new();
    let mut offset = 0usize;
    loop {
        if offset + DAT_HEADER_LEN > actual_len {
            // The buffer ran out mid-header: we can't even learn this
            // record's `data_len`, so there's nothing to report for it.
            // Invalidate the last entry we *did* fully parse instead of
            // returning it, so a retry starting from that same seqnum
            // re-fetches it (and whatever follows) rather than the caller
            // silently moving past a record it never actually saw in full.
            out.pop();
            break;
        }
        let mut hbuf = [0u8; DAT_HEADER_LEN];
        hbuf.copy_from_slice(&buf[offset..offset + DAT_HEADER_LEN]);
        let header = DatRecordHeader::decode(&hbuf);
        if !header.is_live() {
            break;
        }

        let data_len = header.data_len as usize;
        if offset + DAT_HEADER_LEN + data_len > actual_len {
            out.push(EntryRef {
                seqnum: header.seqnum,
                timestamp: header.timestamp,
                data_len: header.data_len,
                data: None,
            });
            break;
        }

        out.push(EntryRef {
            seqnum: header.seqnum,
            timestamp: header.timestamp,
            data_len: header.data_len,
            data: Some(&buf[offset + DAT_HEADER_LEN..offset + DAT_HEADER_LEN + data_len]),
        });
        offset += record_span(header.data_len) as usize;

        if out.len() >= max_entries {
            break;
        }
    }

    Ok(out)
}

#[instrument(skip(dat, idx))]
pub(crate) fn stats(
    dat: &File,
    idx: &File,
    state: &JournalState,
    seqnum_lo: u64,
    seqnum_hi: u64,
) -> Result<Stats, ReadError> {
    if state.is_empty() {
        return Ok(Stats::default());
    }
    let lo = seqnum_lo.max(state.seqnum1);
    let hi = seqnum_hi.min(state.seqnum2);
    if lo > hi {
        return Ok(Stats::default());
    }

    let rec_lo = read_idx_record_at(idx, IdxRecord::offset_for(state.seqnum1, lo)).context(ReadIdxSnafu)?;
    let rec_hi = read_idx_record_at(idx, IdxRecord::offset_for(state.seqnum1, hi)).context(ReadIdxSnafu)?;

    let mut hbuf = [0u8; DAT_HEADER_LEN];
    dat.pread_exact(&mut hbuf, rec_hi.pos).context(ReadDatSnafu)?;
    let last_header = DatRecordHeader::decode(&hbuf);

    let num_entries = hi - lo + 1;
    Ok(Stats {
        min_seqnum: lo,
        max_seqnum: hi,
        min_timestamp: rec_lo.timestamp,
        max_timestamp: rec_hi.timestamp,
        num_entries,
        index_size: num_entries * IDX_RECORD_LEN as u64,
        data_size: (rec_hi.pos + record_span(last_header.data_len)) - rec_lo.pos,
    })
}

#[instrument(skip(idx))]
pub(crate) fn search(
    idx: &File,
    state: &JournalState,
    timestamp: u64,
    mode: SearchMode,
) -> Result<u64, ReadError> {
    if state.is_empty() {
        return TimestampNotFoundSnafu.fail();
    }

    match mode {
        SearchMode::Lower => {
            if timestamp <= state.timestamp1 {
                return Ok(state.seqnum1);
            }
            if timestamp > state.timestamp2 {
                return TimestampNotFoundSnafu.fail();
            }
        }
        SearchMode::Upper => {
            if timestamp < state.timestamp1 {
                return Ok(state.seqnum1);
            }
            if timestamp >= state.timestamp2 {
                return TimestampNotFoundSnafu.fail();
            }
        }
    }

    // Invariant maintained through the loop: predicate(lo) == false,
    // predicate(hi) == true, where predicate(r) is "timestamp at rank r
    // satisfies the search mode". Both hold on entry because of the edge
    // checks above, so the loop always terminates with `hi` at the lowest
    // rank satisfying the predicate -- which, since timestamps are
    // non-decreasing, is also the lowest seqnum in an equal-timestamp run.
    let mut lo = 0u64;
    let mut hi = state.seqnum2 - state.seqnum1;
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let rec = read_idx_record_at(idx, IdxRecord::offset_for(state.seqnum1, state.seqnum1 + mid))
            .context(ReadIdxSnafu)?;
        let satisfies = match mode {
            SearchMode::Lower => rec.timestamp >= timestamp,
            SearchMode::Upper => rec.timestamp > timestamp,
        };
        if satisfies {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Ok(state.seqnum1 + hi)
}

