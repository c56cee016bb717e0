//! Exclusive advisory locking, acquired non-blocking on both files so a
//! second process opening the same journal fails fast instead of hanging.

use std::path::Path;

use fslock::LockFile;
use snafu::ResultExt;

use crate::error::open::{DatLockHeldSnafu, IdxLockHeldSnafu, LockDatSnafu, LockIdxSnafu};
use crate::error::OpenError;

pub struct JournalLock {
    dat: LockFile,
    idx: LockFile,
}

impl JournalLock {
    pub fn acquire(dat_path: &Path, idx_path: &Path) -> Result<Self, OpenError> {
        let mut dat = LockFile::open(dat_path).context(LockDatSnafu)?;
        if !dat.try_lock().context(LockDatSnafu)? {
            return DatLockHeldSnafu.fail();
        }

        let mut idx = LockFile::open(idx_path).context(LockIdxSnafu)?;
        if !idx.try_lock().context(LockIdxSnafu)? {
            return IdxLockHeldSnafu.fail();
        }

        Ok(JournalLock { dat, idx })
    }

    pub fn release(&mut self) {
        let _ = self.dat.unlock();
        let _ = self.idx.unlock();
    }
}
