use crate::io::BlockNumber;

/// The ordered data blocks of one file. Blocks need not be contiguous on the
/// device; content is read back by walking the chain head to tail.
///
/// The byte length is tracked next to the chain since the last block is usually
/// only partially filled.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BlockChain {
    blocks: Vec<BlockNumber>,
    length: usize,
}

impl BlockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, blocknr: BlockNumber) {
        self.blocks.push(blocknr);
    }

    /// Walks the chain in write order. Each call starts again from the head.
    pub fn iter(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.blocks.iter().copied()
    }

    /// Byte length of the content stored in the chain.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn set_len(&mut self, length: usize) {
        self.length = length;
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of blocks held.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[BlockNumber] {
        &self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_append_order() {
        let mut chain = BlockChain::new();
        for &b in &[7, 2, 5] {
            chain.append(b);
        }
        chain.set_len(25);

        assert_eq!(chain.iter().collect::<Vec<_>>(), vec![7, 2, 5]);
        // Restartable.
        assert_eq!(chain.iter().next(), Some(7));
        assert_eq!(chain.block_count(), 3);
        assert_eq!(chain.len(), 25);
    }

    #[test]
    fn new_chain_is_empty() {
        let chain = BlockChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.iter().count(), 0);
    }
}
