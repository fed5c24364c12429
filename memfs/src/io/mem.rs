use super::block::{checked_addr, erase_covered, BlockNumber, BlockStorage};
use crate::error::{FsError, Result};
use log::trace;

/// Block storage held entirely in memory as one contiguous buffer of
/// `block_size * block_count` bytes.
#[derive(Debug)]
pub struct MemBlockDevice {
    data: Vec<u8>,
    block_size: usize,
}

impl MemBlockDevice {
    pub fn new(block_size: usize, block_count: usize) -> Result<Self> {
        if block_size == 0 || block_count == 0 {
            return Err(FsError::InvalidArgument(
                "block size and block count must be positive".to_string(),
            ));
        }
        let len = block_size.checked_mul(block_count).ok_or_else(|| {
            FsError::InvalidArgument("device size overflows the address space".to_string())
        })?;
        Ok(Self {
            data: vec![0; len],
            block_size,
        })
    }
}

impl BlockStorage for MemBlockDevice {
    fn block_count(&self) -> usize {
        self.data.len() / self.block_size
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8], offset: usize) -> Result<()> {
        let addr = checked_addr(&*self, blocknr, offset, buf.len())?;
        buf.copy_from_slice(&self.data[addr..addr + buf.len()]);
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
        self.data[addr..addr + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    /// Memory has no erase cycle, so this only validates the block number.
    fn erase_block(&mut self, blocknr: BlockNumber) -> Result<()> {
        checked_addr(&*self, blocknr, 0, self.block_size)?;
        trace!("erase block {}", blocknr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_reports_geometry() {
        let dev = MemBlockDevice::new(10, 4).unwrap();
        assert_eq!(dev.block_size(), 10);
        assert_eq!(dev.block_count(), 4);
    }

    #[test]
    fn zero_sized_devices_are_rejected() {
        assert!(MemBlockDevice::new(0, 4).is_err());
        assert!(MemBlockDevice::new(10, 0).is_err());
    }

    #[test]
    fn can_read_and_write_blocks() {
        let mut dev = MemBlockDevice::new(8, 4).unwrap();
        dev.write_block(2, &[0x55; 8], None).unwrap();

        let mut other = [0xff; 8];
        dev.read_block(3, &mut other, 0).unwrap();
        assert_eq!(other, [0; 8]);

        let mut filled = [0; 8];
        dev.read_block(2, &mut filled, 0).unwrap();
        assert_eq!(filled, [0x55; 8]);
    }

    #[test]
    fn offset_access_addresses_inside_block() {
        let mut dev = MemBlockDevice::new(8, 2).unwrap();
        dev.write_block(1, b"abc", Some(5)).unwrap();

        let mut buf = [0; 3];
        dev.read_block(1, &mut buf, 5).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn writes_may_span_blocks() {
        let mut dev = MemBlockDevice::new(4, 3).unwrap();
        dev.write_block(0, b"abcdefghij", None).unwrap();

        let mut second = [0; 4];
        dev.read_block(1, &mut second, 0).unwrap();
        assert_eq!(&second, b"efgh");
    }

    #[test]
    fn access_beyond_range_is_rejected() {
        let mut dev = MemBlockDevice::new(8, 2).unwrap();

        match dev.write_block(2, &[1; 8], None) {
            Err(FsError::OutOfRange { block: 2, .. }) => (),
            other => panic!("expected out of range, got {:?}", other),
        }
        // Runs off the end of the last block.
        let mut buf = [0; 4];
        assert!(dev.read_block(1, &mut buf, 6).is_err());
        assert!(dev.write_block(1, &[1; 9], Some(0)).is_err());
        assert!(dev.erase_block(5).is_err());
    }
}
