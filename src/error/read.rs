//! Errors from [`crate::read::read`], [`crate::read::stats`], and
//! [`crate::read::search`]: logical not-found cases plus the I/O and
//! integrity faults a positional read can hit.

use std::io;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReadError {
    #[snafu(display("seqnum {seqnum} not found in journal"))]
    NotFound { seqnum: u64 },

    #[snafu(display("no entry matches the requested timestamp"))]
    TimestampNotFound,

    #[snafu(display("index file corrupt: {reason}"))]
    CorruptIdx { reason: String },

    #[snafu(display("failed to read data file: {source}"))]
    ReadDat { source: io::Error },

    #[snafu(display("failed to read index file: {source}"))]
    ReadIdx { source: io::Error },
}
