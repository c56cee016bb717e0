//! Error taxonomy: one `#[derive(Snafu)]` enum per component seam
//! (open/recovery, append, read, truncate), split by file and by kind,
//! plus a top-level [`JournalError`] that every public
//! [`crate::Journal`] method returns. There is no numeric error-code
//! vocabulary here: that translation belongs to a CLI layer, out of
//! scope for this crate.

pub(crate) mod append;
pub(crate) mod open;
pub(crate) mod read;
pub(crate) mod truncate;

use snafu::Snafu;

pub use append::AppendError;
pub use open::OpenError;
pub use read::ReadError;
pub use truncate::TruncateError;

/// Error returned by every public operation on [`crate::Journal`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum JournalError {
    #[snafu(display("{source}"))]
    #[snafu(context(false))]
    Open { source: OpenError },

    #[snafu(display("append stopped after writing {written} of the batch: {source}"))]
    Append {
        written: usize,
        source: AppendError,
    },

    #[snafu(display("{source}"))]
    #[snafu(context(false))]
    Read { source: ReadError },

    #[snafu(display("{source}"))]
    #[snafu(context(false))]
    Truncate { source: TruncateError },

    #[snafu(display("journal is closed"))]
    ReadClosed,

    #[snafu(display("journal is closed"))]
    TruncateClosed,
}
