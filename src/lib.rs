//! `seqjournal` is an embeddable, crash-safe, append-only journal: a durable,
//! ordered sequence of variable-length records identified by a dense,
//! monotonically increasing sequence number and tagged with a monotonically
//! non-decreasing timestamp.
//!
//! A journal instance owns two files sharing a base name in one directory:
//! `<name>.dat` holds the records, `<name>.idx` maps seqnum to byte offset.
//! Opening a journal is self-healing -- a crash-torn tail is repaired by
//! zeroing, a missing or inconsistent index is rebuilt from the data file,
//! which is always authoritative.
//!
//! ```no_run
//! use seqjournal::{AppendEntry, Journal};
//!
//! let journal = Journal::open("/var/lib/myapp", "events")?;
//! journal.append(&[AppendEntry::new(b"hello")])?;
//! let mut buf = [0u8; 4096];
//! for entry in journal.read(1, 10, &mut buf)? {
//!     println!("{}: {:?}", entry.seqnum, entry.data);
//! }
//! # Ok::<(), seqjournal::JournalError>(())
//! ```

mod append;
mod config;
mod error;
mod format;
mod journal;
mod lock;
mod pio;
mod read;
mod recovery;
mod state;
mod truncate;

pub use append::AppendEntry;
pub use config::{JournalOptions, MAX_NAME_LEN};
pub use error::{AppendError, JournalError, OpenError, ReadError, TruncateError};
pub use journal::{version, Journal};
pub use read::{Entry, EntryRef, SearchMode, Stats};
pub use state::JournalState;

#[cfg(test)]
mod tests;
