//! Open-time recovery scenarios: a crash-torn tail and an index/data
//! mismatch, both constructed by writing raw bytes with the codec directly
//! rather than going through the public API, since the point is to
//! simulate on-disk states the engine itself would never produce through
//! normal operation.

use std::fs;
use std::io::Write;

use crate::format::{
    checksum, pad_len, DatRecordHeader, FileHeader, IdxRecord, DAT_BANNER, DAT_HEADER_LEN,
    HEADER_LEN, IDX_BANNER,
};
use crate::{Journal, JournalOptions};

fn encode_record(seqnum: u64, timestamp: u64, payload: &[u8]) -> Vec<u8> {
    let header = DatRecordHeader {
        seqnum,
        timestamp,
        data_len: payload.len() as u32,
        checksum: checksum(seqnum, timestamp, payload.len() as u32, payload),
    };
    let mut buf = Vec::from(header.encode());
    buf.extend_from_slice(payload);
    buf.resize(buf.len() + pad_len(payload.len() as u32) as usize, 0);
    buf
}

#[test]
fn crash_torn_tail_is_zeroed_on_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dat_path = dir.path().join("test.dat");

    let mut raw = Vec::from(FileHeader::new(DAT_BANNER).encode());
    raw.extend_from_slice(&encode_record(10, 1000, &[7u8; 400]));

    // A partial second record: a full header claiming `data_len = 400`, but
    // only 390 payload bytes actually present -- exactly the "truncated
    // payload" soft anomaly that looks like an incomplete tail.
    let partial_header = DatRecordHeader {
        seqnum: 11,
        timestamp: 1000,
        data_len: 400,
        checksum: 0xDEAD_BEEF,
    };
    raw.extend_from_slice(&partial_header.encode());
    raw.extend_from_slice(&vec![9u8; 390]);

    fs::File::create(&dat_path)
        .expect("create dat")
        .write_all(&raw)
        .expect("write dat");
    // No index file: this alone forces a full rebuild, regardless of
    // `deep_check`.

    let journal = Journal::open(dir.path(), "test").expect("open should recover");
    let state = journal.state();
    assert_eq!(state.seqnum1, 10);
    assert_eq!(state.seqnum2, 10);
    assert_eq!(state.dat_end, HEADER_LEN as u64 + DAT_HEADER_LEN as u64 + 400);

    // Reading back the one surviving record should succeed.
    let mut buf = [0u8; 4096];
    let entries = journal.read(10, 1, &mut buf).expect("read should succeed");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data, Some(&[7u8; 400][..]));
}

#[test]
fn index_mismatch_triggers_rebuild_on_deep_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dat_path = dir.path().join("test.dat");
    let idx_path = dir.path().join("test.idx");

    let mut dat_raw = Vec::from(FileHeader::new(DAT_BANNER).encode());
    let records = [
        (10u64, 1010u64, b"alpha".as_slice()),
        (11, 1011, b"beta"),
        (12, 1012, b"gamma"),
        (13, 1013, b"delta"),
    ];
    let mut positions = Vec::new();
    for (seqnum, timestamp, payload) in records {
        positions.push(dat_raw.len() as u64);
        dat_raw.extend_from_slice(&encode_record(seqnum, timestamp, payload));
    }
    fs::File::create(&dat_path)
        .expect("create dat")
        .write_all(&dat_raw)
        .expect("write dat");

    let mut idx_raw = Vec::from(FileHeader::new(IDX_BANNER).encode());
    for (i, (seqnum, timestamp, _)) in records.iter().enumerate() {
        // Corrupt the third index slot's seqnum so it no longer matches the
        // data file.
        let seqnum = if i == 2 { 999 } else { *seqnum };
        idx_raw.extend_from_slice(
            &IdxRecord {
                seqnum,
                timestamp: *timestamp,
                pos: positions[i],
            }
            .encode(),
        );
    }
    fs::File::create(&idx_path)
        .expect("create idx")
        .write_all(&idx_raw)
        .expect("write idx");

    let journal = JournalOptions::new(dir.path(), "test")
        .deep_check(true)
        .open()
        .expect("deep open should recover by rebuilding the index");
    let state = journal.state();
    assert_eq!(state.seqnum1, 10);
    assert_eq!(state.timestamp1, 1010);
    assert_eq!(state.seqnum2, 13);
    assert_eq!(state.timestamp2, 1013);

    // The rebuilt index should now be self-consistent.
    assert_eq!(journal.search(1012, crate::SearchMode::Lower).unwrap(), 12);
}

#[test]
fn missing_index_is_rebuilt_transparently() {
    let (dir, journal) = super::open_journal();
    super::seed(&journal, 1, 5);
    journal.close();
    drop(journal);

    fs::remove_file(dir.path().join("test.idx")).expect("remove idx");

    let journal = Journal::open(dir.path(), "test").expect("reopen should rebuild index");
    let state = journal.state();
    assert_eq!(state.seqnum1, 1);
    assert_eq!(state.seqnum2, 5);
}
