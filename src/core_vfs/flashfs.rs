//! Log-structured internal flash volume.
//!
//! Every operation takes the per-volume mutex for the duration of the
//! call only; the same mutex is shared with any other subsystem that
//! touches the volume, so it is never held across a scheduler tick.
//! The volume keeps no per-file timestamp; the bridge maintains
//! best-effort write times on the side.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::backend::{Backend, DirEntry, Metadata, OpenMode};
use super::error::{VfsError, VfsResult};

struct OpenFile {
    path: String,
    pos: usize,
    writable: bool,
}

struct OpenDir {
    entries: Vec<DirEntry>,
    next: usize,
}

struct FlashInner {
    files: HashMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    open_files: HashMap<u32, OpenFile>,
    open_dirs: HashMap<u32, OpenDir>,
    next_handle: u32,
    capacity: usize,
}

pub struct FlashFs {
    inner: Mutex<FlashInner>,
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn child_name<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
    if parent(path) == dir && !path.is_empty() {
        Some(path.rsplit('/').next().unwrap_or(path))
    } else {
        None
    }
}

impl FlashInner {
    fn used(&self) -> usize {
        self.files.values().map(|data| data.len()).sum()
    }

    fn dir_exists(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains(path)
    }

    fn has_children(&self, path: &str) -> bool {
        self.files.keys().any(|p| child_name(path, p).is_some())
            || self.dirs.iter().any(|p| child_name(path, p).is_some())
    }

    fn take_handle(&mut self) -> u32 {
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.next_handle
    }
}

impl FlashFs {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(FlashInner {
                files: HashMap::new(),
                dirs: BTreeSet::new(),
                open_files: HashMap::new(),
                open_dirs: HashMap::new(),
                next_handle: 0,
                capacity,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlashInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Backend for FlashFs {
    fn open(&self, path: &str, mode: OpenMode) -> VfsResult<u32> {
        let mut inner = self.lock();
        if inner.dir_exists(path) && !path.is_empty() {
            return Err(VfsError::IsADirectory);
        }
        match mode {
            OpenMode::Read => {
                if !inner.files.contains_key(path) {
                    return Err(VfsError::NotFound);
                }
            }
            OpenMode::WriteCreate => {
                if !inner.dir_exists(parent(path)) {
                    return Err(VfsError::NotFound);
                }
                inner.files.insert(path.to_string(), Vec::new());
            }
        }
        let handle = inner.take_handle();
        inner.open_files.insert(
            handle,
            OpenFile {
                path: path.to_string(),
                pos: 0,
                writable: mode == OpenMode::WriteCreate,
            },
        );
        Ok(handle)
    }

    fn read(&self, handle: u32, buf: &mut [u8]) -> VfsResult<usize> {
        let mut inner = self.lock();
        let (path, pos) = match inner.open_files.get(&handle) {
            Some(open) => (open.path.clone(), open.pos),
            None => return Err(VfsError::InvalidHandle),
        };
        let data = inner.files.get(&path).ok_or(VfsError::InvalidHandle)?;
        let end = (pos + buf.len()).min(data.len());
        let count = end.saturating_sub(pos);
        buf[..count].copy_from_slice(&data[pos..end]);
        if let Some(open) = inner.open_files.get_mut(&handle) {
            open.pos = end;
        }
        Ok(count)
    }

    fn write(&self, handle: u32, data: &[u8]) -> VfsResult<usize> {
        let mut inner = self.lock();
        let (path, pos, writable) = match inner.open_files.get(&handle) {
            Some(open) => (open.path.clone(), open.pos, open.writable),
            None => return Err(VfsError::InvalidHandle),
        };
        if !writable {
            return Err(VfsError::InvalidHandle);
        }
        let used = inner.used();
        let current_len = inner.files.get(&path).map(|d| d.len()).unwrap_or(0);
        let growth = (pos + data.len()).saturating_sub(current_len);
        if used + growth > inner.capacity {
            return Err(VfsError::NoSpace);
        }
        let file = inner.files.get_mut(&path).ok_or(VfsError::InvalidHandle)?;
        if file.len() < pos + data.len() {
            file.resize(pos + data.len(), 0);
        }
        file[pos..pos + data.len()].copy_from_slice(data);
        if let Some(open) = inner.open_files.get_mut(&handle) {
            open.pos = pos + data.len();
        }
        Ok(data.len())
    }

    fn close(&self, handle: u32) -> VfsResult<()> {
        let mut inner = self.lock();
        inner
            .open_files
            .remove(&handle)
            .map(|_| ())
            .ok_or(VfsError::InvalidHandle)
    }

    fn opendir(&self, path: &str) -> VfsResult<u32> {
        let mut inner = self.lock();
        if inner.files.contains_key(path) {
            return Err(VfsError::NotADirectory);
        }
        if !inner.dir_exists(path) {
            return Err(VfsError::NotFound);
        }
        let mut entries: Vec<DirEntry> = Vec::new();
        for dir in inner.dirs.iter() {
            if let Some(name) = child_name(path, dir) {
                entries.push(DirEntry {
                    name: name.to_string(),
                    size: 0,
                    is_dir: true,
                    mtime: None,
                });
            }
        }
        for (file, data) in inner.files.iter() {
            if let Some(name) = child_name(path, file) {
                entries.push(DirEntry {
                    name: name.to_string(),
                    size: data.len() as u64,
                    is_dir: false,
                    mtime: None,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let handle = inner.take_handle();
        inner.open_dirs.insert(handle, OpenDir { entries, next: 0 });
        Ok(handle)
    }

    fn readdir(&self, handle: u32) -> VfsResult<Option<DirEntry>> {
        let mut inner = self.lock();
        let open = inner
            .open_dirs
            .get_mut(&handle)
            .ok_or(VfsError::InvalidHandle)?;
        let entry = open.entries.get(open.next).cloned();
        if entry.is_some() {
            open.next += 1;
        }
        Ok(entry)
    }

    fn closedir(&self, handle: u32) {
        self.lock().open_dirs.remove(&handle);
    }

    fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let inner = self.lock();
        if path.is_empty() || inner.dirs.contains(path) {
            return Ok(Metadata {
                size: 0,
                is_dir: true,
                mtime: None,
            });
        }
        match inner.files.get(path) {
            Some(data) => Ok(Metadata {
                size: data.len() as u64,
                is_dir: false,
                mtime: None,
            }),
            None => Err(VfsError::NotFound),
        }
    }

    fn mkdir(&self, path: &str) -> VfsResult<()> {
        let mut inner = self.lock();
        if path.is_empty() || inner.dirs.contains(path) || inner.files.contains_key(path) {
            return Err(VfsError::AlreadyExists);
        }
        if !inner.dir_exists(parent(path)) {
            return Err(VfsError::NotFound);
        }
        inner.dirs.insert(path.to_string());
        Ok(())
    }

    fn unlink(&self, path: &str) -> VfsResult<()> {
        let mut inner = self.lock();
        if inner.files.remove(path).is_some() {
            return Ok(());
        }
        if inner.dirs.contains(path) {
            if inner.has_children(path) {
                return Err(VfsError::NotEmpty);
            }
            inner.dirs.remove(path);
            return Ok(());
        }
        Err(VfsError::NotFound)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let mut inner = self.lock();
        if inner.files.contains_key(to) || inner.dirs.contains(to) {
            return Err(VfsError::AlreadyExists);
        }
        if !inner.dir_exists(parent(to)) {
            return Err(VfsError::NotFound);
        }
        if let Some(data) = inner.files.remove(from) {
            inner.files.insert(to.to_string(), data);
            return Ok(());
        }
        if inner.dirs.contains(from) {
            inner.dirs.remove(from);
            inner.dirs.insert(to.to_string());
            let prefix = format!("{}/", from);
            let moved_dirs: Vec<String> = inner
                .dirs
                .iter()
                .filter(|d| d.starts_with(&prefix))
                .cloned()
                .collect();
            for dir in moved_dirs {
                inner.dirs.remove(&dir);
                inner.dirs.insert(format!("{}/{}", to, &dir[prefix.len()..]));
            }
            let moved_files: Vec<String> = inner
                .files
                .keys()
                .filter(|f| f.starts_with(&prefix))
                .cloned()
                .collect();
            for file in moved_files {
                if let Some(data) = inner.files.remove(&file) {
                    inner
                        .files
                        .insert(format!("{}/{}", to, &file[prefix.len()..]), data);
                }
            }
            return Ok(());
        }
        Err(VfsError::NotFound)
    }

    fn carries_timestamps(&self) -> bool {
        false
    }
}
