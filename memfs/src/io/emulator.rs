use super::block::{checked_addr, erase_covered, BlockNumber, BlockStorage};
use crate::error::{FsError, Result};
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufWriter, SeekFrom};

/// 4k is a common block size for file systems. Disks commonly are composed of
/// 512 byte blocks mapping each file system block to 8 hard disk blocks.
const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Emulates block storage in userspace using a file as the medium. This is only
/// meant to be used as scratch space for development and testing, nothing is
/// ever mounted back from it.
#[derive(Debug)]
pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of a block.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: usize,
    block_size: usize,
}

impl FileBlockEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }
}

impl BlockStorage for FileBlockEmulator {
    fn block_count(&self) -> usize {
        self.block_count
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8], offset: usize) -> Result<()> {
        let addr = checked_addr(&*self, blocknr, offset, buf.len())?;
        self.fd.seek(SeekFrom::Start(addr as u64))?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn write_block(
        &mut self,
        blocknr: BlockNumber,
        buf: &[u8],
        offset: Option<usize>,
    ) -> Result<()> {
        let addr = checked_addr(&*self, blocknr, offset.unwrap_or(0), buf.len())?;
        if offset.is_none() {
            erase_covered(self, blocknr, buf.len())?;
        }
        self.fd.seek(SeekFrom::Start(addr as u64))?;
        self.fd.write_all(buf)?;
        Ok(())
    }

    fn erase_block(&mut self, blocknr: BlockNumber) -> Result<()> {
        let addr = checked_addr(&*self, blocknr, 0, self.block_size)?;
        self.fd.seek(SeekFrom::Start(addr as u64))?;
        self.fd.write_all(&vec![0x00; self.block_size])?;
        Ok(())
    }

    fn sync_disk(&mut self) -> Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: usize,
    block_size: usize,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            // A better default here might be the size of the file rounded down
            // to the nearest block.
            block_count: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Sets the size in bytes of every block.
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Whether the medium is zeroed on build. Defaults to true.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally, ownership
    /// of the file is transferred to the emulator meaning this builder can only
    /// be used to create one emulator.
    pub fn build(mut self) -> Result<FileBlockEmulator> {
        if self.block_count == 0 || self.block_size == 0 {
            return Err(FsError::InvalidArgument(
                "block size and block count must be positive".to_string(),
            ));
        }
        if self.clear_medium {
            self.zero_medium()?;
        }
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_count: self.block_count,
            block_size: self.block_size,
        })
    }

    fn zero_medium(&mut self) -> Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk" block, buffering each write to prevent excessive writes.
        let block = vec![0x00; self.block_size];
        for _ in 0..self.block_count {
            bfd.write_all(&block)?;
        }
        bfd.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emulator(block_size: usize, blocks: usize) -> FileBlockEmulator {
        let fs_block = tempfile::tempfile().unwrap();
        FileBlockEmulatorBuilder::from(fs_block)
            .with_block_size(block_size)
            .with_block_count(blocks)
            .build()
            .expect("failed to allocate file block")
    }

    #[test]
    fn file_emulator_allocates_correct_num_bytes() {
        let mut disk_emu = emulator(4096, 4);
        disk_emu.sync_disk().unwrap();
        assert_eq!(disk_emu.into_file().metadata().unwrap().len(), 4 * 4096);
    }

    #[test]
    fn can_read_and_write_blocks() {
        let mut disk_emu = emulator(512, 4);

        disk_emu.write_block(2, &[0x55; 512], None).unwrap();
        disk_emu.sync_disk().unwrap();

        let mut read_block = vec![0xff; 512];
        // Read a different block.
        disk_emu.read_block(3, &mut read_block, 0).unwrap();
        assert_eq!(read_block, vec![0x00; 512]);

        // Read the block with data.
        let mut filled_block = vec![0x00; 512];
        disk_emu.read_block(2, &mut filled_block, 0).unwrap();
        assert_eq!(filled_block, vec![0x55; 512]);
    }

    #[test]
    fn erase_zeroes_block() {
        let mut disk_emu = emulator(16, 2);
        disk_emu.write_block(1, &[0x55; 16], None).unwrap();
        disk_emu.erase_block(1).unwrap();

        let mut buf = [0xff; 16];
        disk_emu.read_block(1, &mut buf, 0).unwrap();
        assert_eq!(buf, [0; 16]);
    }

    #[test]
    fn medium_is_kept_when_not_cleared() {
        let disk = tempfile::NamedTempFile::new().unwrap();
        let mut first = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
            .with_block_size(8)
            .with_block_count(2)
            .build()
            .unwrap();
        first.write_block(0, b"keepme", Some(0)).unwrap();
        first.sync_disk().unwrap();

        let mut second = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
            .with_block_size(8)
            .with_block_count(2)
            .clear_medium(false)
            .build()
            .unwrap();
        let mut buf = [0; 6];
        second.read_block(0, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"keepme");
    }

    #[test]
    fn write_block_beyond_range_returns_error() {
        let mut disk_emu = emulator(64, 1);

        // Attempt to write beyond range.
        let wresult = disk_emu.write_block(1, &[0x55; 64], None);
        if wresult.is_ok() {
            panic!("expected an error, got result instead")
        }
    }

    #[test]
    fn empty_device_cannot_be_built() {
        let fs_block = tempfile::tempfile().unwrap();
        assert!(FileBlockEmulatorBuilder::from(fs_block).build().is_err());
    }
}
