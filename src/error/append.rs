//! Errors from [`crate::append::append`]: per-entry validation failures and
//! the I/O faults that can interrupt a batch partway through.

use std::io;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppendError {
    #[snafu(display("journal is closed"))]
    Closed,

    #[snafu(display("broken sequence: expected seqnum {expected}, got {actual}"))]
    BrokenSequence { expected: u64, actual: u64 },

    #[snafu(display(
        "timestamp regression: {timestamp} is before last stored timestamp {last}"
    ))]
    TimestampRegression { timestamp: u64, last: u64 },

    #[snafu(display("failed to write data record: {source}"))]
    WriteDat { source: io::Error },

    #[snafu(display("failed to write index record: {source}"))]
    WriteIdx { source: io::Error },

    #[snafu(display("failed to flush data file: {source}"))]
    FlushDat { source: io::Error },
}
