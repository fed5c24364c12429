use crate::error::{FsError, Result};

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// A flat, block addressed storage medium. Byte `offset` of block `blocknr` lives at
/// `blocknr * block_size() + offset`.
///
/// Implementations do no locking of their own, the file system serializes access.
pub trait BlockStorage {
    /// The total number of blocks on the medium.
    fn block_count(&self) -> usize;
    /// The size of a single block in bytes. Every block has the same size.
    fn block_size(&self) -> usize;
    /// Fills `buf` with `buf.len()` bytes starting `offset` bytes into `blocknr`.
    ///
    /// # Errors
    ///
    /// Reading past the end of the medium returns `FsError::OutOfRange`.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8], offset: usize) -> Result<()>;
    /// Writes `buf` starting `offset` bytes into `blocknr`. Without an offset every
    /// block fully covered by `buf` is erased before it is overwritten.
    ///
    /// # Errors
    ///
    /// Writing past the end of the medium returns `FsError::OutOfRange`.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8], offset: Option<usize>)
        -> Result<()>;
    /// Erases a single block.
    fn erase_block(&mut self, blocknr: BlockNumber) -> Result<()>;
    /// Flush any buffered IO to the medium.
    fn sync_disk(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Checks an access of `len` bytes at `offset` into `blocknr` against the device
/// bounds and returns the absolute byte address.
pub(crate) fn checked_addr<T: BlockStorage + ?Sized>(
    dev: &T,
    blocknr: BlockNumber,
    offset: usize,
    len: usize,
) -> Result<usize> {
    let out_of_range = || FsError::OutOfRange {
        block: blocknr,
        offset,
        len,
    };
    if blocknr >= dev.block_count() {
        return Err(out_of_range());
    }
    let total = dev.block_count() * dev.block_size();
    let addr = blocknr
        .checked_mul(dev.block_size())
        .and_then(|a| a.checked_add(offset))
        .ok_or_else(out_of_range)?;
    match addr.checked_add(len) {
        Some(end) if end <= total => Ok(addr),
        _ => Err(out_of_range()),
    }
}

/// Erases every block fully covered by a write of `len` bytes starting at
/// `blocknr`, the behaviour of an offset-less `write_block`.
pub(crate) fn erase_covered<T: BlockStorage + ?Sized>(
    dev: &mut T,
    blocknr: BlockNumber,
    len: usize,
) -> Result<()> {
    for i in 0..len / dev.block_size() {
        dev.erase_block(blocknr + i)?;
    }
    Ok(())
}
