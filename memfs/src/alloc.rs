use crate::error::{FsError, Result};
use crate::io::BlockNumber;
use log::{debug, error};
use spin::Mutex;
use std::collections::VecDeque;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// One bit per block, packed into 64 bit words. A set bit marks a used block.
#[derive(Debug, Clone)]
pub struct Bitmap {
    bitmap: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; (len + 63) / 64],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, blocknr: usize) -> State {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        // Grab the u64 containing the significant bit.
        let word = self.bitmap[blocknr / 64];

        let inner_offset = blocknr % 64;
        match (word >> inner_offset) & 1 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        self.bitmap[blocknr / 64] |= 1_u64 << (blocknr % 64);
    }

    pub fn set_free(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        self.bitmap[blocknr / 64] &= !(1_u64 << (blocknr % 64));
    }

    /// Number of blocks marked used.
    pub fn count_used(&self) -> usize {
        self.bitmap.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Allocator state. Every block is either in `free` (and clear in `usage`) or set
/// in `usage` (and absent from `free`), never both.
struct FreeList {
    usage: Bitmap,
    /// Blocks are handed out in the order they were freed.
    free: VecDeque<BlockNumber>,
}

impl FreeList {
    fn pop(&mut self) -> Result<BlockNumber> {
        let blocknr = self.free.pop_front().ok_or_else(|| {
            corruption("allocation requested with no free blocks".to_string())
        })?;
        if self.usage.get(blocknr) == State::Used {
            return Err(corruption(format!(
                "block {} on the free list is marked used",
                blocknr
            )));
        }
        self.usage.set_reserved(blocknr);
        Ok(blocknr)
    }

    fn check_release(&self, blocknr: BlockNumber) -> Result<()> {
        if blocknr >= self.usage.len() {
            return Err(corruption(format!("released unknown block {}", blocknr)));
        }
        if self.usage.get(blocknr) == State::Free {
            return Err(corruption(format!("block {} released twice", blocknr)));
        }
        Ok(())
    }

    fn push(&mut self, blocknr: BlockNumber) {
        self.usage.set_free(blocknr);
        self.free.push_back(blocknr);
    }
}

fn corruption(msg: String) -> FsError {
    error!("{}", msg);
    FsError::AllocatorCorruption(msg)
}

/// Tracks which blocks of a device are owned by files. Initially every block is
/// free and blocks are handed out in ascending order; afterwards freed blocks are
/// reused first-freed, first-allocated.
///
/// The lock is only held while the free list and bitmap are updated, never across
/// device IO.
pub struct BlockAllocator {
    inner: Mutex<FreeList>,
}

impl BlockAllocator {
    pub fn new(blocks: usize) -> Self {
        Self {
            inner: Mutex::new(FreeList {
                usage: Bitmap::new(blocks),
                free: (0..blocks).collect(),
            }),
        }
    }

    /// Total number of blocks tracked.
    pub fn capacity(&self) -> usize {
        self.inner.lock().usage.len()
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn is_used(&self, blocknr: BlockNumber) -> bool {
        let inner = self.inner.lock();
        blocknr < inner.usage.len() && inner.usage.get(blocknr) == State::Used
    }

    /// Takes the block at the head of the free list.
    pub fn allocate(&self) -> Result<BlockNumber> {
        let blocknr = self.inner.lock().pop()?;
        debug!("allocated block {}", blocknr);
        Ok(blocknr)
    }

    /// Takes `count` blocks at once, or none of them when fewer are free.
    pub fn reserve(&self, count: usize) -> Result<Vec<BlockNumber>> {
        let mut inner = self.inner.lock();
        let free = inner.free.len();
        if count > free {
            return Err(FsError::OutOfSpace {
                shortfall: count - free,
            });
        }
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            match inner.pop() {
                Ok(blocknr) => blocks.push(blocknr),
                Err(e) => {
                    // Hand back what was taken so the reservation stays all or nothing.
                    for &blocknr in blocks.iter().rev() {
                        inner.usage.set_free(blocknr);
                        inner.free.push_front(blocknr);
                    }
                    return Err(e);
                }
            }
        }
        drop(inner);
        debug!("reserved blocks {:?}", blocks);
        Ok(blocks)
    }

    /// Returns a block to the tail of the free list.
    ///
    /// # Errors
    ///
    /// Releasing a free block or one outside the device is a corruption and leaves
    /// the allocator untouched.
    pub fn release(&self, blocknr: BlockNumber) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_release(blocknr)?;
        inner.push(blocknr);
        drop(inner);
        debug!("released block {}", blocknr);
        Ok(())
    }

    /// Releases a whole chain in order. Every block is validated before any is
    /// freed, so a bad batch changes nothing.
    pub fn release_all(&self, blocks: &[BlockNumber]) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        // Clearing each bit as it is checked makes a repeat show up as free.
        for (i, &blocknr) in blocks.iter().enumerate() {
            if let Err(e) = inner.check_release(blocknr) {
                for &cleared in &blocks[..i] {
                    inner.usage.set_reserved(cleared);
                }
                return Err(e);
            }
            inner.usage.set_free(blocknr);
        }
        inner.free.extend(blocks.iter().copied());
        drop(inner);
        debug!("released blocks {:?}", blocks);
        Ok(())
    }

    /// Checks that the free list and bitmap agree.
    pub fn is_consistent(&self) -> bool {
        let inner = self.inner.lock();
        inner.usage.count_used() + inner.free.len() == inner.usage.len()
            && inner.free.iter().all(|&b| inner.usage.get(b) == State::Free)
    }
}
