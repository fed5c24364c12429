use crate::inode::BlockChain;
use spin::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// A description of the type of file object a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// A regular file owning a chain of data blocks.
    RegularFile,
    /// A directory containing zero or more regular files or directories.
    Directory,
}

/// A point in time snapshot of a node's attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub ftype: FileType,
    /// The total size of the file in bytes.
    pub size: usize,
    /// Number of data blocks held by the file.
    pub blocks: usize,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.ftype == FileType::Directory
    }
}

pub(crate) struct NodeState {
    pub name: String,
    pub ftype: FileType,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    /// Always empty for directories.
    pub inode: BlockChain,
    /// Always empty for regular files.
    pub children: BTreeMap<String, Arc<Node>>,
    /// Cleared once a removal has claimed the node.
    pub linked: bool,
}

/// A file system object. Parents own their children through `children`, while
/// open handles and in-flight lookups may hold extra references.
pub(crate) struct Node {
    open: AtomicBool,
    pub state: Mutex<NodeState>,
}

impl Node {
    pub fn new(name: &str, ftype: FileType) -> Self {
        let now = SystemTime::now();
        Self {
            open: AtomicBool::new(false),
            state: Mutex::new(NodeState {
                name: name.to_string(),
                ftype,
                created_at: now,
                updated_at: now,
                inode: BlockChain::new(),
                children: BTreeMap::new(),
                linked: true,
            }),
        }
    }

    /// Marks the node open. Returns false without waiting if someone else holds it.
    pub fn try_open(&self) -> bool {
        self.open
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn metadata(&self) -> Metadata {
        let state = self.state.lock();
        Metadata {
            name: state.name.clone(),
            ftype: state.ftype,
            size: state.inode.len(),
            blocks: state.inode.block_count(),
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

impl NodeState {
    pub fn is_dir(&self) -> bool {
        self.ftype == FileType::Directory
    }

    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}
