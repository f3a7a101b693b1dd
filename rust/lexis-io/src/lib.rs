//! I/O abstractions for index construction:
//! - `IndexStorage`: a flat namespace of named streams, written once through a
//!   `SealingWrite` and read back sequentially.
//! - `bits`: gamma/delta bit streams over `std::io` readers and writers, plus an
//!   owned in-memory bit buffer.
//!
//! Provides two storage implementations: directory-based and memory-based.

use std::{
    io::{Read, Write},
    sync::Arc,
};

pub mod bits;
pub mod fs;
pub mod memory;

pub use fs::LocalDirStorage;
pub use memory::InMemoryStorage;

/// Default buffer size for streams written while scanning documents.
pub const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// Default buffer size for streams read and written while combining indices.
pub const COMBINE_BUFFER_SIZE: usize = 1024 * 1024;

/// A sequential writer with a `seal()` operation, committing the write activity.
///
/// Data written to a stream becomes visible to readers of the same storage only
/// after a successful `seal()`. Dropping an unsealed writer leaves the stream in an
/// unspecified state.
pub trait SealingWrite: std::io::Write + Send {
    /// Flushes any buffered data and commits the stream.
    ///
    /// Calling `seal()` more than once returns an error.
    fn seal(&mut self) -> std::io::Result<()>;
}

/// A flat namespace of write-once, read-sequentially streams.
///
/// Index components are addressed by name (typically a basename followed by an
/// extension, e.g. `text@0.terms`).
pub trait IndexStorage: Send + Sync {
    /// Creates (or truncates) the stream `name` for writing.
    fn create(&self, name: &str) -> std::io::Result<Box<dyn SealingWrite>>;

    /// Opens the stream `name` for sequential reading.
    ///
    /// Returns an error of kind `NotFound` if the stream does not exist.
    fn open(&self, name: &str) -> std::io::Result<Box<dyn std::io::Read + Send>>;

    /// Returns `true` if a sealed stream with the given name exists.
    fn exists(&self, name: &str) -> bool;

    /// Deletes the stream `name`. Returns `false` if it did not exist.
    fn delete(&self, name: &str) -> std::io::Result<bool>;

    /// Reads the whole stream into a string.
    fn read_to_string(&self, name: &str) -> std::io::Result<String> {
        let mut reader = self.open(name)?;
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(text)
    }

    /// Returns a view of the same streams whose readers and writers buffer
    /// `buffer_size` bytes, or `None` if this storage does not buffer.
    fn with_io_buffer(&self, _buffer_size: usize) -> Option<Arc<dyn IndexStorage>> {
        None
    }

    /// Writes `data` as the complete content of stream `name` and seals it.
    fn write_all(&self, name: &str, data: &[u8]) -> std::io::Result<()> {
        let mut writer = self.create(name)?;
        writer.write_all(data)?;
        writer.seal()
    }
}

impl<S: IndexStorage + ?Sized> IndexStorage for Arc<S> {
    fn create(&self, name: &str) -> std::io::Result<Box<dyn SealingWrite>> {
        (**self).create(name)
    }

    fn open(&self, name: &str) -> std::io::Result<Box<dyn std::io::Read + Send>> {
        (**self).open(name)
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn delete(&self, name: &str) -> std::io::Result<bool> {
        (**self).delete(name)
    }

    fn with_io_buffer(&self, buffer_size: usize) -> Option<Arc<dyn IndexStorage>> {
        (**self).with_io_buffer(buffer_size)
    }
}
