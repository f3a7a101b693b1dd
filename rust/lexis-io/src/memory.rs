use std::{
    io::{Cursor, Write},
    sync::{Arc, RwLock},
};

use ahash::AHashMap;

use crate::{IndexStorage, SealingWrite};

type Streams = Arc<RwLock<AHashMap<String, Arc<Vec<u8>>>>>;

/// Memory-backed storage. Streams are published to the namespace when sealed.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    streams: Streams,
}

impl InMemoryStorage {
    pub fn new() -> InMemoryStorage {
        Default::default()
    }

    /// Names of all sealed streams, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .streams
            .read()
            .map(|streams| streams.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Total number of bytes held by sealed streams.
    pub fn total_size(&self) -> usize {
        self.streams
            .read()
            .map(|streams| streams.values().map(|data| data.len()).sum())
            .unwrap_or(0)
    }

    /// Returns a copy of the sealed stream `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<Vec<u8>>> {
        self.streams.read().ok()?.get(name).cloned()
    }
}

fn poisoned() -> std::io::Error {
    std::io::Error::other("in-memory storage lock poisoned")
}

impl IndexStorage for InMemoryStorage {
    fn create(&self, name: &str) -> std::io::Result<Box<dyn SealingWrite>> {
        Ok(Box::new(MemoryWriter {
            name: name.to_string(),
            data: Some(Vec::new()),
            streams: self.streams.clone(),
        }))
    }

    fn open(&self, name: &str) -> std::io::Result<Box<dyn std::io::Read + Send>> {
        let data = self
            .streams
            .read()
            .map_err(|_| poisoned())?
            .get(name)
            .cloned()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, format!("no stream {name}"))
            })?;
        Ok(Box::new(Cursor::new(SharedBytes(data))))
    }

    fn exists(&self, name: &str) -> bool {
        self.streams
            .read()
            .map(|streams| streams.contains_key(name))
            .unwrap_or(false)
    }

    fn delete(&self, name: &str) -> std::io::Result<bool> {
        Ok(self
            .streams
            .write()
            .map_err(|_| poisoned())?
            .remove(name)
            .is_some())
    }
}

struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

struct MemoryWriter {
    name: String,
    data: Option<Vec<u8>>,
    streams: Streams,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data
            .as_mut()
            .ok_or_else(|| std::io::Error::other("stream already sealed"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SealingWrite for MemoryWriter {
    fn seal(&mut self) -> std::io::Result<()> {
        let data = self
            .data
            .take()
            .ok_or_else(|| std::io::Error::other("stream already sealed"))?;
        self.streams
            .write()
            .map_err(|_| poisoned())?
            .insert(std::mem::take(&mut self.name), Arc::new(data));
        Ok(())
    }
}
