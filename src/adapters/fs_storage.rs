//! Flat-directory file storage over `std::fs`.
//!
//! On the firmware the SD card is FAT-mounted into the VFS (see `main.rs`)
//! and this adapter works on the mount point; the simulator points it at a
//! plain host directory.  Append handles are cached per file until
//! [`FileStore::close`] so the run log is not reopened for every burst.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::debug;

use crate::app::ports::{FileEntry, FileStore};
use crate::error::StorageFault;
use crate::text::bounded;

pub struct FsStorage {
    root: PathBuf,
    handles: HashMap<String, File>,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            handles: HashMap::new(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn handle(&mut self, name: &str) -> Result<&mut File, StorageFault> {
        if !self.handles.contains_key(name) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path(name))
                .map_err(|e| map_io(&e, StorageFault::OpenFailed))?;
            self.handles.insert(name.to_string(), file);
        }
        self.handles.get_mut(name).ok_or(StorageFault::OpenFailed)
    }
}

fn map_io(e: &io::Error, fallback: StorageFault) -> StorageFault {
    match e.kind() {
        io::ErrorKind::NotFound => StorageFault::NotFound,
        _ => fallback,
    }
}

impl FileStore for FsStorage {
    fn mount(&mut self) -> Result<(), StorageFault> {
        self.handles.clear();
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StorageFault::NotMounted)
        }
    }

    fn probe(&mut self) -> Result<(), StorageFault> {
        fs::read_dir(&self.root)
            .map(|_| ())
            .map_err(|_| StorageFault::NotMounted)
    }

    fn exists(&mut self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn size(&mut self, name: &str) -> Result<u64, StorageFault> {
        fs::metadata(self.path(name))
            .map(|m| m.len())
            .map_err(|e| map_io(&e, StorageFault::ReadFailed))
    }

    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), StorageFault> {
        let res = self.handle(name)?.write_all(data);
        if res.is_err() {
            self.handles.remove(name);
            return Err(StorageFault::WriteFailed);
        }
        Ok(())
    }

    fn sync(&mut self, name: &str) -> Result<(), StorageFault> {
        match self.handles.get_mut(name) {
            Some(file) => file.sync_data().map_err(|_| StorageFault::WriteFailed),
            None => Ok(()),
        }
    }

    fn close(&mut self, name: &str) {
        if self.handles.remove(name).is_some() {
            debug!("fs: closed {}", name);
        }
    }

    fn read_at(&mut self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageFault> {
        let mut file = File::open(self.path(name)).map_err(|e| map_io(&e, StorageFault::OpenFailed))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|_| StorageFault::ReadFailed)?;
        file.read(buf).map_err(|_| StorageFault::ReadFailed)
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), StorageFault> {
        self.handles.remove(name);
        fs::write(self.path(name), data).map_err(|_| StorageFault::WriteFailed)
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageFault> {
        self.handles.remove(name);
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(_) => Err(StorageFault::WriteFailed),
        }
    }

    fn list(&mut self) -> Result<Vec<FileEntry>, StorageFault> {
        let dir = fs::read_dir(&self.root).map_err(|_| StorageFault::NotMounted)?;
        let mut entries = Vec::new();
        for entry in dir.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str().and_then(bounded::<12>) else {
                continue;
            };
            entries.push(FileEntry {
                name,
                size: meta.len(),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static NEXT: AtomicU32 = AtomicU32::new(0);

    fn scratch() -> FsStorage {
        let dir = std::env::temp_dir().join(format!(
            "chamber-fs-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();
        FsStorage::new(dir)
    }

    #[test]
    fn append_read_and_list() {
        let mut fs = scratch();
        fs.mount().unwrap();
        fs.append("RUN01.CSV", b"ms;T1\n").unwrap();
        fs.append("RUN01.CSV", b"1;2.0\n").unwrap();
        fs.sync("RUN01.CSV").unwrap();
        fs.close("RUN01.CSV");

        assert_eq!(fs.size("RUN01.CSV").unwrap(), 12);
        let mut buf = [0u8; 8];
        let n = fs.read_at("RUN01.CSV", 6, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"1;2.0\n");
        assert_eq!(fs.read_at("RUN01.CSV", 12, &mut buf).unwrap(), 0);

        let names: Vec<_> = fs.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].as_str(), "RUN01.CSV");
    }

    #[test]
    fn replace_and_remove() {
        let mut fs = scratch();
        fs.write_file("RUN01.ACK", b"10,1,0\n").unwrap();
        fs.write_file("RUN01.ACK", b"20,2,0\n").unwrap();
        assert_eq!(fs.read_to_end("RUN01.ACK", 64).unwrap(), b"20,2,0\n");
        fs.remove("RUN01.ACK").unwrap();
        fs.remove("RUN01.ACK").unwrap();
        assert_eq!(fs.size("RUN01.ACK"), Err(StorageFault::NotFound));
    }

    #[test]
    fn missing_root_is_not_mounted() {
        let mut fs = FsStorage::new(std::env::temp_dir().join("chamber-no-such-dir"));
        assert_eq!(fs.mount(), Err(StorageFault::NotMounted));
        assert_eq!(fs.probe(), Err(StorageFault::NotMounted));
    }
}
