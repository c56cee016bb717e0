//! Errors from [`crate::truncate::rollback`] and [`crate::truncate::purge`].
//! Purge's rewrite-then-rename dance adds a couple of fault surfaces
//! (temp file, rename, post-rewrite index rebuild) that rollback never
//! touches.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

use crate::error::OpenError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TruncateError {
    #[snafu(display("failed to read data file: {source}"))]
    ReadDat { source: io::Error },

    #[snafu(display("failed to read index file: {source}"))]
    ReadIdx { source: io::Error },

    #[snafu(display("failed to write data file: {source}"))]
    WriteDat { source: io::Error },

    #[snafu(display("failed to write index file: {source}"))]
    WriteIdx { source: io::Error },

    #[snafu(display("failed to flush data file: {source}"))]
    FlushDat { source: io::Error },

    #[snafu(display("failed to flush index file: {source}"))]
    FlushIdx { source: io::Error },

    #[snafu(display("temp file {}: {source}", path.display()))]
    TempFile { path: PathBuf, source: io::Error },

    #[snafu(display("failed to rename temp file into place: {source}"))]
    Rename { source: io::Error },

    #[snafu(display("failed to rebuild index after purge: {source}"))]
    Rebuild { source: OpenError },
}
