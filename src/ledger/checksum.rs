//! CRC-32 fingerprints of files on disk.
//!
//! Zip archives already declare an IEEE CRC-32 for every entry, so the ledger
//! uses the same polynomial for files on disk. That lets the reconciler
//! compare an installed file against an archive entry without decompressing
//! the entry.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::Ledger;

const READ_BUFFER_SIZE: usize = 64 * 1024;

impl Ledger {
    /// Compute the IEEE CRC-32 of a file's full content.
    ///
    /// The file is streamed through a fixed buffer, so arbitrarily large
    /// binaries can be fingerprinted without loading them into memory.
    ///
    /// # Errors
    ///
    /// Returns the raw [`io::Error`] so callers can tell a file that vanished
    /// (`NotFound`) from one that could not be read.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::path::Path;
    /// use upkeep_cli::ledger::Ledger;
    ///
    /// # fn example() -> std::io::Result<()> {
    /// let crc = Ledger::compute_checksum(Path::new("vim.exe"))?;
    /// println!("{crc:08x}");
    /// # Ok(())
    /// # }
    /// ```
    pub fn compute_checksum(path: &Path) -> io::Result<u32> {
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, File::open(path)?);
        let mut hasher = crc32fast::Hasher::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }

    /// Compute the IEEE CRC-32 of an in-memory buffer.
    #[must_use]
    pub fn checksum_bytes(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}
