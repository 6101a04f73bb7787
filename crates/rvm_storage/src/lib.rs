//! # RVM Storage
//!
//! Byte-store backends used by the recoverable virtual memory engine.
//!
//! Backends are **opaque byte stores**. They hold the commit log and the
//! per-segment backing files, but never interpret either format.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, overwrite, resize, flush)
//! - No knowledge of log records, segment names, or transactions
//! - Must be `Send + Sync` so an `Rvm` can be shared across threads
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use rvm_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! backend.write_at(offset, b"HELLO").unwrap();
//! assert_eq!(backend.read_at(0, 11).unwrap(), b"HELLO world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
