//! Scenario and invariant tests for the journal, organized as shared
//! fixtures in this file plus one themed submodule per concern.

use tempfile::TempDir;

use crate::{AppendEntry, Journal, JournalOptions};

mod basic;
mod invariants;
mod recovery;

/// A fresh, empty journal named `test` in its own temp directory. Dropping
/// the returned `TempDir` cleans up both `.dat` and `.idx` files.
fn open_journal() -> (TempDir, Journal) {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = Journal::open(dir.path(), "test").expect("open should succeed");
    (dir, journal)
}

fn open_journal_with(opts: impl FnOnce(JournalOptions) -> JournalOptions) -> (TempDir, Journal) {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = opts(JournalOptions::new(dir.path(), "test"))
        .open()
        .expect("open should succeed");
    (dir, journal)
}

/// Appends `data-<seqnum>` for `seqnum in lo..=hi`, with
/// `timestamp = seqnum - (seqnum % 10)`.
fn seed(journal: &Journal, lo: u64, hi: u64) {
    let payloads: Vec<String> = (lo..=hi).map(|s| format!("data-{s}")).collect();
    let entries: Vec<AppendEntry<'_>> = (lo..=hi)
        .zip(payloads.iter())
        .map(|(s, payload)| {
            AppendEntry::new(payload.as_bytes())
                .with_seqnum(s)
                // `s - (s % 10)` buckets timestamps into runs of 10, clamped
                // away from 0 so low seqnums used by other tests never trip
                // the "timestamp 0 means auto-assign" rule.
                .with_timestamp((s - (s % 10)).max(1))
        })
        .collect();
    let written = journal.append(&entries).expect("seed append should succeed");
    assert_eq!(written, entries.len());
}
