use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{IndexStorage, SCAN_BUFFER_SIZE, SealingWrite};

/// Directory-backed storage: every stream is a file directly under `root`.
#[derive(Debug, Clone)]
pub struct LocalDirStorage {
    root: PathBuf,
    buffer_size: usize,
}

impl LocalDirStorage {
    /// Opens the storage rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<LocalDirStorage> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(LocalDirStorage {
            root,
            buffer_size: SCAN_BUFFER_SIZE,
        })
    }

    /// Sets the buffer size used for both readers and writers.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl IndexStorage for LocalDirStorage {
    fn create(&self, name: &str) -> std::io::Result<Box<dyn SealingWrite>> {
        let file = File::create(self.path_of(name))?;
        Ok(Box::new(FileWriter {
            file: Some(BufWriter::with_capacity(self.buffer_size, file)),
        }))
    }

    fn open(&self, name: &str) -> std::io::Result<Box<dyn std::io::Read + Send>> {
        let file = File::open(self.path_of(name))?;
        Ok(Box::new(BufReader::with_capacity(self.buffer_size, file)))
    }

    fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    fn delete(&self, name: &str) -> std::io::Result<bool> {
        let path = self.path_of(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::trace!("deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn with_io_buffer(&self, buffer_size: usize) -> Option<Arc<dyn IndexStorage>> {
        Some(Arc::new(self.clone().with_buffer_size(buffer_size)))
    }
}

struct FileWriter {
    file: Option<BufWriter<File>>,
}

impl FileWriter {
    fn file_mut(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("stream already sealed"))
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl SealingWrite for FileWriter {
    fn seal(&mut self) -> std::io::Result<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| std::io::Error::other("stream already sealed"))?;
        let file = file.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::COMBINE_BUFFER_SIZE;

    #[test]
    fn test_create_seal_open() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDirStorage::new(dir.path()).unwrap();
        let mut writer = storage.create("a.terms").unwrap();
        writer.write_all(b"alpha\nbeta\n").unwrap();
        writer.seal().unwrap();
        assert!(writer.seal().is_err());

        assert!(storage.exists("a.terms"));
        let mut text = String::new();
        storage
            .open("a.terms")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "alpha\nbeta\n");
    }

    #[test]
    fn test_io_buffer_view() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDirStorage::new(dir.path()).unwrap();
        assert_eq!(storage.buffer_size(), SCAN_BUFFER_SIZE);
        let combine = storage.with_io_buffer(COMBINE_BUFFER_SIZE).unwrap();
        combine.write_all("v.sizes", &[7; 3]).unwrap();
        assert!(storage.exists("v.sizes"));
        let mut data = Vec::new();
        storage
            .open("v.sizes")
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, vec![7; 3]);
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDirStorage::new(dir.path().join("nested")).unwrap();
        storage.write_all("x.sizes", &[1, 2, 3]).unwrap();
        assert!(storage.delete("x.sizes").unwrap());
        assert!(!storage.delete("x.sizes").unwrap());
        assert!(!storage.exists("x.sizes"));
        let err = storage.open("x.sizes").err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
