//! Open-time configuration, modeled as a small builder over a data
//! directory and a handful of named toggles.

use std::path::{Path, PathBuf};

use crate::error::open::{InvalidNameSnafu, PathNotFoundSnafu};
use crate::error::OpenError;
use crate::journal::Journal;
use snafu::ensure;

/// Maximum length of a journal name, per the file-system contract.
pub const MAX_NAME_LEN: usize = 31;

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) fn validate_name(name: &str) -> Result<(), OpenError> {
    ensure!(
        !name.is_empty() && name.len() <= MAX_NAME_LEN && name.chars().all(is_valid_name_char),
        InvalidNameSnafu {
            name: name.to_string(),
        }
    );
    Ok(())
}

/// Builder for the parameters accepted by [`Journal::open`].
///
/// ```ignore
/// let journal = JournalOptions::new(".", "test")
///     .deep_check(true)
///     .fsync(false)
///     .open()?;
/// ```
#[derive(Debug, Clone)]
pub struct JournalOptions {
    path: PathBuf,
    name: String,
    deep_check: bool,
    fsync: bool,
}

impl JournalOptions {
    /// `path` of `""` means the current working directory, matching the
    /// file-system contract.
    pub fn new(path: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let path = path.as_ref();
        let path = if path.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            path.to_path_buf()
        };
        JournalOptions {
            path,
            name: name.into(),
            deep_check: false,
            fsync: false,
        }
    }

    /// Full verification of every record at open time. Off by
    /// default: a shallow open only reads the first and last records.
    pub fn deep_check(mut self, deep_check: bool) -> Self {
        self.deep_check = deep_check;
        self
    }

    /// Whether the data file is `fsync`ed (not just flushed) after each
    /// append batch and truncation.
    pub fn fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deep_check_enabled(&self) -> bool {
        self.deep_check
    }

    pub fn fsync_enabled(&self) -> bool {
        self.fsync
    }

    pub(crate) fn validate(&self) -> Result<(), OpenError> {
        ensure!(
            self.path.is_dir(),
            PathNotFoundSnafu {
                path: self.path.clone(),
            }
        );
        validate_name(&self.name)
    }

    pub(crate) fn dat_path(&self) -> PathBuf {
        self.path.join(format!("{}.dat", self.name))
    }

    pub(crate) fn idx_path(&self) -> PathBuf {
        self.path.join(format!("{}.idx", self.name))
    }

    pub(crate) fn tmp_path(&self) -> PathBuf {
        self.path.join(format!("{}.tmp", self.name))
    }

    /// Opens (creating if necessary) the journal described by this builder.
    pub fn open(self) -> Result<Journal, crate::error::JournalError> {
        Journal::open_with_options(self)
    }
}
