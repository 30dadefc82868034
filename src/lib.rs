//! vfscore - a pluggable, async virtual filesystem core.
//!
//! The crate is organized around one trait, [`filesystem::FileSystem`], implemented by a single
//! concrete backend ([`store_fs::StoreFs`], generic over any [`store::Store`]) and a handful of
//! composers that wrap a `FileSystem` to add behavior: [`locked::LockedFs`] (serialize access),
//! [`readonly::ReadonlyFs`] (reject mutators), [`overlay::OverlayFs`] (writable layer over a
//! read-only one) and [`bridge::AsyncBridge`] (mirror an async-only backend into a fast local
//! view). [`mount::MountTable`] routes absolute paths across many mounted filesystems by longest
//! matching prefix, and [`registry::Registry`] builds filesystems from [`config::Configuration`]
//! documents.

pub mod backends;
pub mod bridge;
pub mod config;
pub mod cred;
pub mod error;
pub mod filesystem;
pub mod flags;
pub mod inode;
pub mod locked;
pub mod mount;
pub mod overlay;
pub mod path;
pub mod readonly;
pub mod registry;
pub mod stat;
pub mod store;
pub mod store_fs;

pub use cred::Cred;
pub use error::{Error, ErrorKind, Result};
pub use filesystem::{DirEntry, FileHandle, FileSystem, Metadata};
pub use flags::OpenFlags;
pub use mount::MountTable;
pub use stat::{FileType, Stats};

/// Builds a [`registry::Registry`] preloaded with every backend this crate ships.
pub fn default_registry() -> registry::Registry {
    let mut registry = registry::Registry::new();
    registry.register(std::sync::Arc::new(backends::memory::MemoryBackend));
    registry
}
