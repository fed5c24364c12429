mod block;
mod emulator;
mod mem;

pub use block::{BlockNumber, BlockStorage};
pub use emulator::{FileBlockEmulator, FileBlockEmulatorBuilder};
pub use mem::MemBlockDevice;
