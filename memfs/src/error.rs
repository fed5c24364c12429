use crate::io::BlockNumber;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("block access out of range: block {block}, offset {offset}, length {len}")]
    OutOfRange {
        block: BlockNumber,
        offset: usize,
        len: usize,
    },
    #[error("out of storage, need {shortfall} more blocks")]
    OutOfSpace { shortfall: usize },
    #[error("file is already open")]
    FileBusy,
    #[error("cannot read or write a directory")]
    NotAFile,
    #[error("path component is not a directory")]
    NotADirectory,
    #[error("directory is not empty")]
    DirectoryNotEmpty,
    #[error("found no file at path")]
    DoesNotExist,
    #[error("path already exists")]
    AlreadyExists,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The free list and usage bitmap disagree. Never recoverable.
    #[error("block allocator corrupted: {0}")]
    AllocatorCorruption(String),
    #[error("block device io failed")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
