//! Positional file I/O that does not disturb the file's seek position, so
//! readers never race the writer's file position. `std::fs::File` only
//! exposes this via platform-specific extension traits, so this module
//! picks the right one at compile time and re-exports it under a single
//! name.

use std::fs::File;
use std::io;

pub trait PositionalIo {
    fn pread_exact(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
    fn pwrite_all(&self, buf: &[u8], offset: u64) -> io::Result<()>;
}

#[cfg(unix)]
impl PositionalIo for File {
    fn pread_exact(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.read_exact_at(buf, offset)
    }

    fn pwrite_all(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.write_all_at(buf, offset)
    }
}

#[cfg(windows)]
impl PositionalIo for File {
    fn pread_exact(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut read = 0;
        let mut pos = offset;
        while read < buf.len() {
            let n = self.seek_read(&mut buf[read..], pos)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            read += n;
            pos += n as u64;
        }
        Ok(())
    }

    fn pwrite_all(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut written = 0;
        let mut pos = offset;
        while written < buf.len() {
            let n = self.seek_write(&buf[written..], pos)?;
            written += n;
            pos += n as u64;
        }
        Ok(())
    }
}

/// Like [`PositionalIo::pread_exact`], but returns the number of bytes
/// actually read instead of failing on a short read. Used where a read may
/// legitimately run past live data into a zeroed or nonexistent tail (end of
/// file during recovery scans, buffer-exhaustion reads).
pub fn pread_best_effort(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        let mut read = 0;
        loop {
            match file.read_at(&mut buf[read..], offset + read as u64) {
                Ok(0) => return Ok(read),
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            if read == buf.len() {
                return Ok(read);
            }
        }
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        let mut read = 0;
        loop {
            match file.seek_read(&mut buf[read..], offset + read as u64) {
                Ok(0) => return Ok(read),
                Ok(n) => read += n,
                Err(e) => return Err(e),
            }
            if read == buf.len() {
                return Ok(read);
            }
        }
    }
}
