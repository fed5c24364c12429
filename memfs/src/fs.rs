use std::path::{Component, Path};
use std::sync::Arc;

use crate::alloc::BlockAllocator;
use crate::error::{FsError, Result};
use crate::inode::BlockChain;
use crate::io::{BlockStorage, MemBlockDevice};
use crate::node::{FileType, Metadata, Node};

use log::{debug, info, warn};
use spin::Mutex;

/// A file system over a fixed pool of equally sized blocks. File content is split
/// into block sized chunks stored wherever the allocator finds room, and each
/// file keeps the ordered chain of blocks it owns.
///
/// All operations take `&self`, so one instance can be shared between threads.
/// Reading and writing require a `FileHandle`, and a path can only be open once
/// at a time.
pub struct MemFs<T: BlockStorage = MemBlockDevice> {
    /// Held for a single block transfer at a time.
    dev: Mutex<T>,
    alloc: BlockAllocator,
    root: Arc<Node>,
    block_size: usize,
}

impl MemFs<MemBlockDevice> {
    /// Creates a file system over a zeroed in-memory device of `num_blocks`
    /// blocks of `block_size` bytes.
    pub fn new(block_size: usize, num_blocks: usize) -> Result<Self> {
        Self::with_device(MemBlockDevice::new(block_size, num_blocks)?)
    }
}

impl<T: BlockStorage> MemFs<T> {
    /// Initializes the file system onto owned block storage. Every block of the
    /// device starts out free and the namespace holds only the root directory.
    pub fn with_device(dev: T) -> Result<Self> {
        let block_size = dev.block_size();
        let block_count = dev.block_count();
        if block_size == 0 || block_count == 0 {
            return Err(FsError::InvalidArgument(
                "device must have a positive block size and block count".to_string(),
            ));
        }
        info!("mounted {} blocks of {} bytes", block_count, block_size);
        Ok(Self {
            dev: Mutex::new(dev),
            alloc: BlockAllocator::new(block_count),
            root: Arc::new(Node::new("/", FileType::Directory)),
            block_size,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.alloc.capacity()
    }

    /// Number of blocks not owned by any file.
    pub fn free_blocks(&self) -> usize {
        self.alloc.free_count()
    }

    pub fn allocator(&self) -> &BlockAllocator {
        &self.alloc
    }

    /// Flushes the device and returns it to the caller.
    pub fn into_device(self) -> Result<T> {
        let mut dev = self.dev.into_inner();
        dev.sync_disk()?;
        Ok(dev)
    }

    /// Creates an empty file, or a directory when `is_dir` is set. Missing parent
    /// directories are created along the way.
    ///
    /// # Errors
    ///
    /// The final path component must not exist yet and every parent component
    /// must be a directory.
    pub fn create<P: AsRef<Path>>(&self, path: P, is_dir: bool) -> Result<()> {
        let parts = split(path.as_ref())?;
        let (name, dirs) = parts.split_last().ok_or(FsError::AlreadyExists)?;

        let mut curr = self.root.clone();
        for part in dirs {
            let next = {
                let mut state = curr.state.lock();
                if !state.linked {
                    return Err(FsError::DoesNotExist);
                }
                if !state.is_dir() {
                    return Err(FsError::NotADirectory);
                }
                if !state.children.contains_key(part) {
                    debug!("creating parent directory {:?}", part);
                    let dir = Arc::new(Node::new(part, FileType::Directory));
                    state.children.insert(part.clone(), dir);
                    state.touch();
                }
                state.children[part].clone()
            };
            curr = next;
        }

        let ftype = if is_dir {
            FileType::Directory
        } else {
            FileType::RegularFile
        };
        insert_child(&curr, name, ftype)?;
        info!("created {:?} {}", ftype, path.as_ref().display());
        Ok(())
    }

    /// Opens a file or directory for exclusive use. This never waits: if the
    /// path is already open the call fails with `FsError::FileBusy`.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<FileHandle<'_, T>> {
        let parts = split(path.as_ref())?;
        let (parent, node) = self.lookup(&parts)?;
        if !node.try_open() {
            debug!("{} is busy", path.as_ref().display());
            return Err(FsError::FileBusy);
        }
        Ok(FileHandle {
            fs: self,
            node,
            parent,
        })
    }

    /// Releases a handle. Dropping the handle has the same effect.
    pub fn close(&self, file: FileHandle<'_, T>) {
        drop(file);
    }

    /// Renames the open node within its parent directory.
    pub fn rename(&self, file: &mut FileHandle<'_, T>, new_name: &str) -> Result<()> {
        self.check_owner(file)?;
        if new_name.is_empty() || new_name.contains('/') || new_name == "." || new_name == ".."
        {
            return Err(FsError::InvalidArgument(format!(
                "{:?} is not a valid name",
                new_name
            )));
        }
        let parent = file.parent.as_ref().ok_or_else(|| {
            FsError::InvalidArgument("the root directory cannot be renamed".to_string())
        })?;

        let mut parent_state = parent.state.lock();
        let mut state = file.node.state.lock();
        if state.name != new_name {
            if parent_state.children.contains_key(new_name) {
                return Err(FsError::AlreadyExists);
            }
            if let Some(node) = parent_state.children.remove(&state.name) {
                parent_state.children.insert(new_name.to_string(), node);
            }
            parent_state.touch();
            info!("renamed {:?} to {:?}", state.name, new_name);
            state.name = new_name.to_string();
        }
        state.touch();
        Ok(())
    }

    /// Lists the sorted names inside a directory. A regular file lists itself.
    pub fn list<P: AsRef<Path>>(&self, path: P) -> Result<Vec<String>> {
        let parts = split(path.as_ref())?;
        let (_, node) = self.lookup(&parts)?;
        let state = node.state.lock();
        if !state.is_dir() {
            return Ok(vec![state.name.clone()]);
        }
        Ok(state.children.keys().cloned().collect())
    }

    /// Unlinks a node and hands its blocks back to the allocator. Directories
    /// with content are only removed when `recursive` is set.
    ///
    /// # Errors
    ///
    /// Fails with `FsError::FileBusy` and removes nothing if any node in the
    /// subtree is open.
    pub fn remove<P: AsRef<Path>>(&self, path: P, recursive: bool) -> Result<()> {
        let parts = split(path.as_ref())?;
        let (name, dirs) = parts.split_last().ok_or_else(|| {
            FsError::InvalidArgument("the root directory cannot be removed".to_string())
        })?;
        let (_, parent) = self.lookup(dirs)?;

        let mut parent_state = parent.state.lock();
        if !parent_state.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let node = parent_state
            .children
            .get(name)
            .cloned()
            .ok_or(FsError::DoesNotExist)?;

        // Removed nodes stay marked open so late lookups cannot reopen them.
        let mut claimed = Vec::new();
        if let Err(e) = claim(&node, recursive, &mut claimed) {
            for n in &claimed {
                n.state.lock().linked = true;
                n.release();
            }
            return Err(e);
        }
        parent_state.children.remove(name);
        parent_state.touch();
        drop(parent_state);

        let mut released = 0;
        for n in &claimed {
            let mut state = n.state.lock();
            let chain = std::mem::take(&mut state.inode);
            state.children.clear();
            drop(state);
            self.alloc.release_all(chain.blocks())?;
            released += chain.block_count();
        }
        info!(
            "removed {} ({} blocks freed)",
            path.as_ref().display(),
            released
        );
        Ok(())
    }

    /// Replaces the whole content of a file.
    ///
    /// The blocks for the new content are reserved in one step before anything is
    /// written, so a write that does not fit fails with `FsError::OutOfSpace` and
    /// leaves both the file and the free block count untouched. The blocks of the
    /// previous content are released once the new chain is in place.
    pub fn write(&self, file: &mut FileHandle<'_, T>, data: &[u8]) -> Result<()> {
        self.check_owner(file)?;
        let mut state = file.node.state.lock();
        if state.is_dir() {
            return Err(FsError::NotAFile);
        }

        let required = (data.len() + self.block_size - 1) / self.block_size;
        let blocks = match self.alloc.reserve(required) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("write of {} bytes to {:?} rejected: {}", data.len(), state.name, e);
                return Err(e);
            }
        };

        let mut chain = BlockChain::new();
        for (chunk, &blocknr) in data.chunks(self.block_size).zip(blocks.iter()) {
            let written = self.dev.lock().write_block(blocknr, chunk, None);
            if let Err(e) = written {
                self.alloc.release_all(&blocks)?;
                return Err(e);
            }
            chain.append(blocknr);
        }
        chain.set_len(data.len());

        let old = std::mem::replace(&mut state.inode, chain);
        state.touch();
        debug!(
            "wrote {} bytes to {:?} in blocks {:?}",
            data.len(),
            state.name,
            state.inode.blocks()
        );
        drop(state);
        self.alloc.release_all(old.blocks())
    }

    /// Reads back the whole content of a file by walking its block chain.
    pub fn read(&self, file: &FileHandle<'_, T>) -> Result<Vec<u8>> {
        self.check_owner(file)?;
        let state = file.node.state.lock();
        if state.is_dir() {
            return Err(FsError::NotAFile);
        }

        let size = state.inode.len();
        let mut buf = vec![0; size];
        let mut read_len = 0;
        for blocknr in state.inode.iter() {
            let n = self.block_size.min(size - read_len);
            if n == 0 {
                break;
            }
            self.dev
                .lock()
                .read_block(blocknr, &mut buf[read_len..read_len + n], 0)?;
            read_len += n;
        }
        debug_assert_eq!(read_len, size);
        Ok(buf)
    }

    fn check_owner(&self, file: &FileHandle<'_, T>) -> Result<()> {
        if std::ptr::eq(file.fs, self) {
            Ok(())
        } else {
            Err(FsError::InvalidArgument(
                "handle belongs to another file system".to_string(),
            ))
        }
    }

    /// Walks from the root, returning the node at `parts` and its parent.
    fn lookup(&self, parts: &[String]) -> Result<(Option<Arc<Node>>, Arc<Node>)> {
        let mut parent = None;
        let mut curr = self.root.clone();
        for part in parts {
            let next = {
                let state = curr.state.lock();
                if !state.is_dir() {
                    return Err(FsError::NotADirectory);
                }
                state
                    .children
                    .get(part)
                    .cloned()
                    .ok_or(FsError::DoesNotExist)?
            };
            parent = Some(std::mem::replace(&mut curr, next));
        }
        Ok((parent, curr))
    }
}

/// Adds an empty node named `name` to the directory `dir`.
fn insert_child(dir: &Arc<Node>, name: &str, ftype: FileType) -> Result<()> {
    let mut state = dir.state.lock();
    if !state.linked {
        return Err(FsError::DoesNotExist);
    }
    if !state.is_dir() {
        return Err(FsError::NotADirectory);
    }
    if state.children.contains_key(name) {
        return Err(FsError::AlreadyExists);
    }
    state
        .children
        .insert(name.to_string(), Arc::new(Node::new(name, ftype)));
    state.touch();
    Ok(())
}

/// Marks `node` and everything below it open and unlinked, collecting each
/// claimed node. Unlinking happens under the same lock that enumerates the
/// children, so a concurrent create either lands before and is claimed too, or
/// finds the directory gone.
fn claim(node: &Arc<Node>, recursive: bool, claimed: &mut Vec<Arc<Node>>) -> Result<()> {
    if !node.try_open() {
        return Err(FsError::FileBusy);
    }
    claimed.push(node.clone());
    let mut state = node.state.lock();
    state.linked = false;
    if state.is_dir() && !state.children.is_empty() {
        if !recursive {
            return Err(FsError::DirectoryNotEmpty);
        }
        for child in state.children.values() {
            claim(child, recursive, claimed)?;
        }
    }
    Ok(())
}

/// Splits an absolute path into its names. The root path yields no names.
fn split(path: &Path) -> Result<Vec<String>> {
    let mut parts = path.components();
    if Some(Component::RootDir) != parts.next() {
        return Err(FsError::InvalidArgument(
            "path must start with \"/\"".to_string(),
        ));
    }
    parts
        .map(|part| match part {
            Component::Normal(name) => name.to_str().map(str::to_string).ok_or_else(|| {
                FsError::InvalidArgument("path is not valid unicode".to_string())
            }),
            _ => Err(FsError::InvalidArgument(format!(
                "unsupported path component {:?}",
                part
            ))),
        })
        .collect()
}

/// Exclusive access to one open node. The handle is the only way to read or
/// write file content; the node is closed again when the handle is dropped.
pub struct FileHandle<'fs, T: BlockStorage> {
    fs: &'fs MemFs<T>,
    node: Arc<Node>,
    /// `None` for the root directory.
    parent: Option<Arc<Node>>,
}

impl<'fs, T: BlockStorage> FileHandle<'fs, T> {
    pub fn metadata(&self) -> Metadata {
        self.node.metadata()
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.fs.read(self)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let fs = self.fs;
        fs.write(self, data)
    }
}

impl<T: BlockStorage> Drop for FileHandle<'_, T> {
    fn drop(&mut self) {
        self.node.release();
    }
}
