//! Rollback (suffix truncation) and purge (prefix truncation via rewrite).
//!
//! Both operations run under the exclusive wide files lock in
//! [`crate::journal::Journal`] -- they are the "destructive writes" that
//! lock exists to keep from racing concurrent readers.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use snafu::ResultExt;
use tracing::{instrument, warn};

use crate::error::truncate::{
    FlushDatSnafu, FlushIdxSnafu, ReadDatSnafu, ReadIdxSnafu, RebuildSnafu, RenameSnafu,
    TempFileSnafu, WriteDatSnafu, WriteIdxSnafu,
};
use crate::error::TruncateError;
use crate::format::{record_span, DatRecordHeader, FileHeader, IdxRecord, DAT_BANNER, DAT_HEADER_LEN, HEADER_LEN, IDX_RECORD_LEN};
use crate::pio::PositionalIo;
use crate::recovery;
use crate::state::JournalState;

fn read_idx_record_at(file: &File, pos: u64) -> std::io::Result<IdxRecord> {
    let mut buf = [0u8; IDX_RECORD_LEN];
    file.pread_exact(&mut buf, pos)?;
    Ok(IdxRecord::decode(&buf))
}

fn read_dat_header_at(file: &File, pos: u64) -> std::io::Result<DatRecordHeader> {
    let mut buf = [0u8; DAT_HEADER_LEN];
    file.pread_exact(&mut buf, pos)?;
    Ok(DatRecordHeader::decode(&buf))
}

fn zero_range(file: &File, from: u64, to: u64, backwards: bool) -> std::io::Result<()> {
    if from >= to {
        return Ok(());
    }
    const CHUNK: u64 = 64 * 1024;
    let zeros = vec![0u8; CHUNK as usize];
    if backwards {
        let mut end = to;
        while end > from {
            let n = (end - from).min(CHUNK);
            file.pwrite_all(&zeros[..n as usize], end - n)?;
            end -= n;
        }
    } else {
        let mut start = from;
        while start < to {
            let n = (to - start).min(CHUNK);
            file.pwrite_all(&zeros[..n as usize], start)?;
            start += n;
        }
    }
    Ok(())
}

/// Drops every entry with `seqnum' > seqnum`. No-op if `seqnum >= seqnum2`.
#[instrument(skip(dat, idx))]
pub(crate) fn rollback(
    dat: &File,
    idx: &File,
    state: &JournalState,
    seqnum: u64,
    fsync: bool,
) -> Result<(u64, JournalState), TruncateError> {
    if state.is_empty() || seqnum >= state.seqnum2 {
        return Ok((0, *state));
    }

    let removed = state.seqnum2 - seqnum;

    if seqnum < state.seqnum1 {
        idx.set_len(HEADER_LEN as u64).context(WriteIdxSnafu)?;
        zero_range(dat, HEADER_LEN as u64, state.dat_end, true).context(WriteDatSnafu)?;
        dat.set_len(HEADER_LEN as u64).context(WriteDatSnafu)?;
        if fsync {
            idx.sync_data().context(FlushIdxSnafu)?;
            dat.sync_data().context(FlushDatSnafu)?;
        }
        return Ok((state.len(), JournalState::empty(HEADER_LEN as u64)));
    }

    let new_last = read_idx_record_at(idx, IdxRecord::offset_for(state.seqnum1, seqnum)).context(ReadIdxSnafu)?;
    let new_last_header = read_dat_header_at(dat, new_last.pos).context(ReadDatSnafu)?;
    let new_dat_end = new_last.pos + record_span(new_last_header.data_len);

    // Zero index records top-down: at any crash point the index loses
    // evidence of a record before the data file does, so recovery always
    // sees a consistent tail or less.
    let mut s = state.seqnum2;
    while s > seqnum {
        idx.pwrite_all(&[0u8; IDX_RECORD_LEN], IdxRecord::offset_for(state.seqnum1, s))
            .context(WriteIdxSnafu)?;
        s -= 1;
    }
    if fsync {
        idx.sync_data().context(FlushIdxSnafu)?;
    }

    zero_range(dat, new_dat_end, state.dat_end, true).context(WriteDatSnafu)?;
    if fsync {
        dat.sync_data().context(FlushDatSnafu)?;
    }

    Ok((
        removed,
        JournalState {
            seqnum1: state.seqnum1,
            timestamp1: state.timestamp1,
            seqnum2: seqnum,
            timestamp2: new_last.timestamp,
            dat_end: new_dat_end,
        },
    ))
}

/// Drops every entry with `seqnum' < seqnum` by rewriting the data file
/// through a temp file and renaming it into place, then rebuilding the
/// index from the new data file. No-op if `seqnum <= seqnum1`.
#[instrument(skip(dat, idx))]
pub(crate) fn purge(
    dat: &mut File,
    idx: &mut File,
    dat_path: &Path,
    idx_path: &Path,
    tmp_path: &Path,
    state: &JournalState,
    seqnum: u64,
) -> Result<(u64, JournalState), TruncateError> {
    if state.is_empty() || seqnum <= state.seqnum1 {
        return Ok((0, *state));
    }

    if seqnum > state.seqnum2 {
        let removed = state.len();
        dat.set_len(HEADER_LEN as u64).context(WriteDatSnafu)?;
        idx.set_len(HEADER_LEN as u64).context(WriteIdxSnafu)?;
        return Ok((removed, JournalState::empty(HEADER_LEN as u64)));
    }

    let removed = seqnum - state.seqnum1;
    let keep_from = read_idx_record_at(idx, IdxRecord::offset_for(state.seqnum1, seqnum)).context(ReadIdxSnafu)?;

    {
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)
            .context(TempFileSnafu {
                path: tmp_path.to_path_buf(),
            })?;
        tmp.write_all(&FileHeader::new(DAT_BANNER).encode())
            .context(TempFileSnafu {
                path: tmp_path.to_path_buf(),
            })?;

        let mut remaining = state.dat_end - keep_from.pos;
        let mut src_offset = keep_from.pos;
        let mut dst_offset = HEADER_LEN as u64;
        const CHUNK: usize = 256 * 1024;
        let mut buf = vec![0u8; CHUNK];
        while remaining > 0 {
            let n = (remaining as usize).min(CHUNK);
            dat.pread_exact(&mut buf[..n], src_offset).context(ReadDatSnafu)?;
            tmp.pwrite_all(&buf[..n], dst_offset).context(TempFileSnafu {
                path: tmp_path.to_path_buf(),
            })?;
            src_offset += n as u64;
            dst_offset += n as u64;
            remaining -= n as u64;
        }
        tmp.sync_data().context(TempFileSnafu {
            path: tmp_path.to_path_buf(),
        })?;
    }

    fs::remove_file(idx_path).context(WriteIdxSnafu)?;
    fs::rename(tmp_path, dat_path).context(RenameSnafu)?;

    let new_dat = OpenOptions::new()
        .read(true)
        .write(true)
        .open(dat_path)
        .context(WriteDatSnafu)?;
    let new_idx = {
        let mut f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(idx_path)
            .context(WriteIdxSnafu)?;
        f.write_all(&FileHeader::new(crate::format::IDX_BANNER).encode())
            .context(WriteIdxSnafu)?;
        f
    };

    warn!(seqnum, "purge rewrote data file and rebuilt index");

    let new_state =
        recovery::rebuild_index_after_purge(&new_dat, &new_idx).context(RebuildSnafu)?;

    *dat = new_dat;
    *idx = new_idx;

    Ok((removed, new_state))
}
