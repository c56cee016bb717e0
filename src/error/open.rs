//! Errors from opening or recovering a journal.

use std::io;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OpenError {
    #[snafu(display("path does not exist: {}", path.display()))]
    PathNotFound { path: std::path::PathBuf },

    #[snafu(display(
        "invalid journal name {name:?}: must match [A-Za-z0-9_]{{1,31}}"
    ))]
    InvalidName { name: String },

    #[snafu(display("failed to create data file: {source}"))]
    CreateDat { source: io::Error },

    #[snafu(display("failed to create index file: {source}"))]
    CreateIdx { source: io::Error },

    #[snafu(display("failed to open data file: {source}"))]
    OpenDat { source: io::Error },

    #[snafu(display("failed to open index file: {source}"))]
    OpenIdx { source: io::Error },

    #[snafu(display("failed to read data file: {source}"))]
    ReadDat { source: io::Error },

    #[snafu(display("failed to read index file: {source}"))]
    ReadIdx { source: io::Error },

    #[snafu(display("failed to write data file: {source}"))]
    WriteDat { source: io::Error },

    #[snafu(display("failed to write index file: {source}"))]
    WriteIdx { source: io::Error },

    #[snafu(display("could not acquire exclusive lock on data file: {source}"))]
    LockDat { source: io::Error },

    #[snafu(display("could not acquire exclusive lock on index file: {source}"))]
    LockIdx { source: io::Error },

    #[snafu(display("data file is locked by another process"))]
    DatLockHeld,

    #[snafu(display("index file is locked by another process"))]
    IdxLockHeld,

    #[snafu(display("bad magic in data file header"))]
    BadMagicDat,

    #[snafu(display("bad magic in index file header"))]
    BadMagicIdx,

    #[snafu(display("unsupported format version {format} in data file"))]
    BadFormatDat { format: u32 },

    #[snafu(display("unsupported format version {format} in index file"))]
    BadFormatIdx { format: u32 },

    #[snafu(display("data/index format version mismatch: dat={dat}, idx={idx}"))]
    FormatMismatch { dat: u32, idx: u32 },

    #[snafu(display("data file corrupt: {reason}"))]
    CorruptDat { reason: String },

    #[snafu(display("index file corrupt: {reason}"))]
    CorruptIdx { reason: String },
}
