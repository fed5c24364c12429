//! An in-memory file system over a fixed pool of fixed-size blocks.
//!
//! File content is split into block sized chunks, each stored in whichever block
//! the allocator hands out next, and every file keeps the ordered chain of blocks
//! it owns so reads can put the content back together.
//!
//! ```
//! use memfs::MemFs;
//!
//! let fs = MemFs::new(10, 4).unwrap();
//! fs.create("/docs/notes.txt", false).unwrap();
//!
//! let mut file = fs.open("/docs/notes.txt").unwrap();
//! fs.write(&mut file, b"file 1 data").unwrap();
//! assert_eq!(fs.read(&file).unwrap(), b"file 1 data");
//! assert_eq!(fs.free_blocks(), 2);
//! ```
mod alloc;
mod error;
mod fs;
mod inode;
pub mod io;
mod node;

pub use crate::alloc::BlockAllocator;
pub use crate::error::{FsError, Result};
pub use crate::fs::{FileHandle, MemFs};
pub use crate::inode::BlockChain;
pub use crate::node::{FileType, Metadata};
