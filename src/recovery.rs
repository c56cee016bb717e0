//! Lifecycle and recovery: bringing a journal's two files from whatever
//! state a crash or a fresh directory left them in to a pair of in-memory
//! handles plus a verified [`JournalState`].
//!
//! The core trick is that a single forward walk over the data file
//! (`full_dat_scan`) serves three purposes: deep-check verification, index
//! rebuild-from-scratch, and reconciliation of a data-file tail the index
//! never learned about. Everything else in this module is plumbing around
//! that one walk.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use snafu::ResultExt;
use tracing::{instrument, warn};

use crate::config::JournalOptions;
use crate::error::open::{
    BadFormatDatSnafu, BadFormatIdxSnafu, BadMagicDatSnafu, BadMagicIdxSnafu, CorruptDatSnafu,
    CreateDatSnafu, CreateIdxSnafu, FormatMismatchSnafu, OpenDatSnafu, OpenIdxSnafu, ReadDatSnafu,
    ReadIdxSnafu, WriteDatSnafu, WriteIdxSnafu,
};
use crate::error::OpenError;
use crate::format::{
    checksum, record_span, DatRecordHeader, FileHeader, IdxRecord, DAT_BANNER, DAT_HEADER_LEN,
    FORMAT_VERSION, HEADER_LEN, IDX_BANNER, IDX_RECORD_LEN, MAGIC,
};
use crate::lock::JournalLock;
use crate::pio::{pread_best_effort, PositionalIo};
use crate::state::JournalState;

pub(crate) struct Opened {
    pub dat: File,
    pub idx: File,
    pub lock: JournalLock,
    pub state: JournalState,
}

/// A single live record discovered by a forward data-file walk.
#[derive(Debug, Clone, Copy)]
struct LiveRecord {
    seqnum: u64,
    timestamp: u64,
    pos: u64,
    data_len: u32,
}

struct DatScan {
    records: Vec<LiveRecord>,
    dat_end: u64,
}

#[instrument(skip(opts), fields(name = opts.name()))]
pub(crate) fn open(opts: &JournalOptions) -> Result<Opened, OpenError> {
    let dat_path = opts.dat_path();
    let idx_path = opts.idx_path();

    let dat_existed = dat_path.exists();
    let idx_existed = idx_path.exists();
    let mut force_rebuild = false;

    if !dat_existed {
        create_fresh(&dat_path, DAT_BANNER).context(CreateDatSnafu)?;
        create_fresh(&idx_path, IDX_BANNER).context(CreateIdxSnafu)?;
    } else if !idx_existed {
        create_fresh(&idx_path, IDX_BANNER).context(CreateIdxSnafu)?;
        force_rebuild = true;
    }

    let dat = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&dat_path)
        .context(OpenDatSnafu)?;
    let idx = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&idx_path)
        .context(OpenIdxSnafu)?;

    let lock = JournalLock::acquire(&dat_path, &idx_path)?;

    let dat_len = dat.metadata().context(OpenDatSnafu)?.len();
    let idx_len = idx.metadata().context(OpenIdxSnafu)?.len();

    let dat_header = read_header(&dat).context(ReadDatSnafu)?;
    verify_header(&dat_header, true)?;
    let idx_header = read_header(&idx).context(ReadIdxSnafu)?;
    verify_header(&idx_header, false)?;
    if dat_header.format != idx_header.format {
        return FormatMismatchSnafu {
            dat: dat_header.format,
            idx: idx_header.format,
        }
        .fail();
    }

    if dat_len <= HEADER_LEN as u64 {
        if idx_len != HEADER_LEN as u64 {
            idx.set_len(HEADER_LEN as u64).context(WriteIdxSnafu)?;
        }
        return Ok(Opened {
            dat,
            idx,
            lock,
            state: JournalState::empty(HEADER_LEN as u64),
        });
    }

    let first = read_record_header_at(&dat, HEADER_LEN as u64).context(ReadDatSnafu)?;
    if !first.is_live() {
        // A zero-filled first slot is the on-disk signature of a journal that
        // was rolled back to empty (`rollback(0)`): the data file was zeroed
        // past the header but never shrunk, since the format is append-only.
        // This is a legitimate empty state, not corruption -- tidy both files
        // back down to just their headers and reopen as empty.
        dat.set_len(HEADER_LEN as u64).context(WriteDatSnafu)?;
        if idx_len != HEADER_LEN as u64 {
            idx.set_len(HEADER_LEN as u64).context(WriteIdxSnafu)?;
        }
        return Ok(Opened {
            dat,
            idx,
            lock,
            state: JournalState::empty(HEADER_LEN as u64),
        });
    }

    let state = if opts.deep_check_enabled() || force_rebuild {
        deep_open(&dat, &idx, dat_len, idx_len, force_rebuild)?
    } else {
        shallow_open(&dat, &idx, dat_len, idx_len, first)?
    };

    Ok(Opened {
        dat,
        idx,
        lock,
        state,
    })
}

fn verify_header(header: &FileHeader, is_dat: bool) -> Result<(), OpenError> {
    if header.magic != MAGIC {
        return if is_dat {
            BadMagicDatSnafu.fail()
        } else {
            BadMagicIdxSnafu.fail()
        };
    }
    if header.format != FORMAT_VERSION {
        return if is_dat {
            BadFormatDatSnafu {
                format: header.format,
            }
            .fail()
        } else {
            BadFormatIdxSnafu {
                format: header.format,
            }
            .fail()
        };
    }
    Ok(())
}

fn create_fresh(path: &Path, banner: &[u8]) -> std::io::Result<()> {
    let mut f = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    f.write_all(&FileHeader::new(banner).encode())
}

fn read_header(file: &File) -> std::io::Result<FileHeader> {
    let mut buf = [0u8; HEADER_LEN];
    file.pread_exact(&mut buf, 0)?;
    Ok(FileHeader::decode(&buf))
}

fn read_record_header_at(file: &File, pos: u64) -> std::io::Result<DatRecordHeader> {
    let mut buf = [0u8; DAT_HEADER_LEN];
    file.pread_exact(&mut buf, pos)?;
    Ok(DatRecordHeader::decode(&buf))
}

fn read_idx_record_at(file: &File, pos: u64) -> std::io::Result<IdxRecord> {
    let mut buf = [0u8; IDX_RECORD_LEN];
    file.pread_exact(&mut buf, pos)?;
    Ok(IdxRecord::decode(&buf))
}

/// Forward walk over the data file starting at `start_pos`, stopping at the
/// first soft anomaly (truncated header, truncated payload, zero marker, or
/// checksum mismatch — all indistinguishable from a crash-torn write) or at
/// a hard anomaly (valid checksum but broken density/monotonicity), which is
/// fatal.
fn scan_dat_from(
    dat: &File,
    dat_len: u64,
    start_pos: u64,
    mut prev: Option<(u64, u64)>,
) -> Result<DatScan, OpenError> {
    let mut pos = start_pos;
    let mut records = Vec::new();

    loop {
        if pos + DAT_HEADER_LEN as u64 > dat_len {
            break;
        }
        let mut hbuf = [0u8; DAT_HEADER_LEN];
        let n = pread_best_effort(dat, &mut hbuf, pos).context(ReadDatSnafu)?;
        if n < DAT_HEADER_LEN {
            break;
        }
        let header = DatRecordHeader::decode(&hbuf);
        if !header.is_live() {
            break;
        }
        let span = record_span(header.data_len);
        if pos + span > dat_len {
            break;
        }
        let mut payload = vec![0u8; header.data_len as usize];
        if !payload.is_empty() {
            dat.pread_exact(&mut payload, pos + DAT_HEADER_LEN as u64)
                .context(ReadDatSnafu)?;
        }
        if checksum(header.seqnum, header.timestamp, header.data_len, &payload) != header.checksum
        {
            break;
        }
        if let Some((pseq, pts)) = prev {
            if header.seqnum != pseq + 1 || header.timestamp < pts {
                return CorruptDatSnafu {
                    reason: format!(
                        "non-monotonic record at offset {pos}: seqnum {} after {pseq}, timestamp {} after {pts}",
                        header.seqnum, header.timestamp
                    ),
                }
                .fail();
            }
        }
        prev = Some((header.seqnum, header.timestamp));
        records.push(LiveRecord {
            seqnum: header.seqnum,
            timestamp: header.timestamp,
            pos,
            data_len: header.data_len,
        });
        pos += span;
    }

    Ok(DatScan {
        records,
        dat_end: pos,
    })
}

fn full_dat_scan(dat: &File, dat_len: u64) -> Result<DatScan, OpenError> {
    scan_dat_from(dat, dat_len, HEADER_LEN as u64, None)
}

fn zero_from(file: &File, from: u64, end: u64) -> std::io::Result<()> {
    if from >= end {
        return Ok(());
    }
    const CHUNK: usize = 64 * 1024;
    let zeros = vec![0u8; CHUNK];
    let mut offset = from;
    while offset < end {
        let n = ((end - offset) as usize).min(CHUNK);
        file.pwrite_all(&zeros[..n], offset)?;
        offset += n as u64;
    }
    Ok(())
}

fn rewrite_idx_from_records(idx: &File, records: &[LiveRecord]) -> Result<(), OpenError> {
    idx.set_len(HEADER_LEN as u64).context(WriteIdxSnafu)?;
    if records.is_empty() {
        return Ok(());
    }
    let mut buf = Vec::with_capacity(records.len() * IDX_RECORD_LEN);
    for r in records {
        buf.extend_from_slice(
            &IdxRecord {
                seqnum: r.seqnum,
                timestamp: r.timestamp,
                pos: r.pos,
            }
            .encode(),
        );
    }
    idx.pwrite_all(&buf, HEADER_LEN as u64)
        .context(WriteIdxSnafu)?;
    Ok(())
}

fn state_from_records(records: &[LiveRecord], dat_end: u64) -> JournalState {
    match (records.first(), records.last()) {
        (Some(first), Some(last)) => JournalState {
            seqnum1: first.seqnum,
            timestamp1: first.timestamp,
            seqnum2: last.seqnum,
            timestamp2: last.timestamp,
            dat_end,
        },
        _ => JournalState::empty(dat_end),
    }
}

fn rebuild_fully(dat: &File, idx: &File, dat_len: u64) -> Result<JournalState, OpenError> {
    warn!("rebuilding index file from data file");
    let scan = full_dat_scan(dat, dat_len)?;
    rewrite_idx_from_records(idx, &scan.records)?;
    zero_from(dat, scan.dat_end, dat_len).context(WriteDatSnafu)?;
    Ok(state_from_records(&scan.records, scan.dat_end))
}

fn deep_open(
    dat: &File,
    idx: &File,
    dat_len: u64,
    idx_len: u64,
    force_rebuild: bool,
) -> Result<JournalState, OpenError> {
    let scan = full_dat_scan(dat, dat_len)?;
    if scan.records.is_empty() {
        zero_from(dat, HEADER_LEN as u64, dat_len).context(WriteDatSnafu)?;
        return Ok(JournalState::empty(HEADER_LEN as u64));
    }

    let needs_rebuild = force_rebuild || !idx_matches(idx, idx_len, &scan.records)?;
    if needs_rebuild {
        rewrite_idx_from_records(idx, &scan.records)?;
        warn!(records = scan.records.len(), "index rebuilt during deep open");
    }
    zero_from(dat, scan.dat_end, dat_len).context(WriteDatSnafu)?;
    Ok(state_from_records(&scan.records, scan.dat_end))
}

fn idx_matches(idx: &File, idx_len: u64, records: &[LiveRecord]) -> Result<bool, OpenError> {
    let expected_len = HEADER_LEN as u64 + (records.len() * IDX_RECORD_LEN) as u64;
    if idx_len != expected_len {
        return Ok(false);
    }
    for (i, r) in records.iter().enumerate() {
        let pos = HEADER_LEN as u64 + (i * IDX_RECORD_LEN) as u64;
        let rec = read_idx_record_at(idx, pos).context(ReadIdxSnafu)?;
        if rec.seqnum != r.seqnum || rec.timestamp != r.timestamp || rec.pos != r.pos {
            return Ok(false);
        }
    }
    Ok(true)
}

fn shallow_idx_tail(idx: &File, idx_len: u64) -> Result<Option<(u64, IdxRecord)>, OpenError> {
    if idx_len <= HEADER_LEN as u64 {
        return Ok(None);
    }
    let n_slots = (idx_len - HEADER_LEN as u64) / IDX_RECORD_LEN as u64;
    let aligned_len = HEADER_LEN as u64 + n_slots * IDX_RECORD_LEN as u64;
    if aligned_len != idx_len {
        idx.set_len(aligned_len).context(WriteIdxSnafu)?;
    }

    let mut i = n_slots;
    while i > 0 {
        let pos = HEADER_LEN as u64 + (i - 1) * IDX_RECORD_LEN as u64;
        let rec = read_idx_record_at(idx, pos).context(ReadIdxSnafu)?;
        if rec.is_live() {
            return Ok(Some((pos, rec)));
        }
        i -= 1;
    }
    Ok(None)
}

fn shallow_open(
    dat: &File,
    idx: &File,
    dat_len: u64,
    idx_len: u64,
    first: DatRecordHeader,
) -> Result<JournalState, OpenError> {
    let tail = shallow_idx_tail(idx, idx_len)?;
    let Some((_, last_rec)) = tail else {
        return rebuild_fully(dat, idx, dat_len);
    };

    let rec0 = read_idx_record_at(idx, HEADER_LEN as u64).context(ReadIdxSnafu)?;
    if rec0.seqnum != first.seqnum || rec0.timestamp != first.timestamp || rec0.pos != HEADER_LEN as u64
    {
        return rebuild_fully(dat, idx, dat_len);
    }

    let last_dat_header = match read_record_header_at(dat, last_rec.pos) {
        Ok(h) => h,
        Err(_) => return rebuild_fully(dat, idx, dat_len),
    };
    if last_dat_header.seqnum != last_rec.seqnum || last_dat_header.timestamp != last_rec.timestamp {
        return rebuild_fully(dat, idx, dat_len);
    }

    let mut dat_end = last_rec.pos + record_span(last_dat_header.data_len);
    let mut seqnum2 = last_rec.seqnum;
    let mut timestamp2 = last_rec.timestamp;

    let recon = scan_dat_from(dat, dat_len, dat_end, Some((seqnum2, timestamp2)))?;
    if !recon.records.is_empty() {
        warn!(
            records = recon.records.len(),
            "reconciling data records the index never learned about"
        );
        let first_new_pos = HEADER_LEN as u64
            + (recon.records[0].seqnum - first.seqnum) * IDX_RECORD_LEN as u64;
        let mut buf = Vec::with_capacity(recon.records.len() * IDX_RECORD_LEN);
        for r in &recon.records {
            buf.extend_from_slice(
                &IdxRecord {
                    seqnum: r.seqnum,
                    timestamp: r.timestamp,
                    pos: r.pos,
                }
                .encode(),
            );
        }
        idx.pwrite_all(&buf, first_new_pos).context(WriteIdxSnafu)?;
        let last_new = recon.records.last().unwrap();
        seqnum2 = last_new.seqnum;
        timestamp2 = last_new.timestamp;
        dat_end = recon.dat_end;
    }

    zero_from(dat, dat_end, dat_len).context(WriteDatSnafu)?;

    Ok(JournalState {
        seqnum1: first.seqnum,
        timestamp1: first.timestamp,
        seqnum2,
        timestamp2,
        dat_end,
    })
}

/// Used by [`crate::truncate::purge`] after the rewritten data file is
/// renamed into place: the index is always dropped and rebuilt, since purge
/// is a full rewrite and the cheapest consistent path is a fresh index.
pub(crate) fn rebuild_index_after_purge(dat: &File, idx: &File) -> Result<JournalState, OpenError> {
    let dat_len = dat.metadata().context(OpenDatSnafu)?.len();
    if dat_len <= HEADER_LEN as u64 {
        idx.set_len(HEADER_LEN as u64).context(WriteIdxSnafu)?;
        return Ok(JournalState::empty(HEADER_LEN as u64));
    }
    rebuild_fully(dat, idx, dat_len)
}
