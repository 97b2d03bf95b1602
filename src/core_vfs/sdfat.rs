//! FAT-style SD-card volume.
//!
//! The legacy card filesystem: modification times live inside the
//! directory entries themselves, and non-root directories report the
//! usual `.` and `..` entries on iteration.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDateTime, Utc};

use super::backend::{Backend, DirEntry, Metadata, OpenMode};
use super::error::{VfsError, VfsResult};

struct FatFile {
    data: Vec<u8>,
    mtime: NaiveDateTime,
}

struct OpenFile {
    path: String,
    pos: usize,
    writable: bool,
}

struct OpenDir {
    entries: Vec<DirEntry>,
    next: usize,
}

struct FatInner {
    files: HashMap<String, FatFile>,
    dirs: BTreeMap<String, NaiveDateTime>,
    open_files: HashMap<u32, OpenFile>,
    open_dirs: HashMap<u32, OpenDir>,
    next_handle: u32,
}

pub struct SdFatFs {
    inner: RefCell<FatInner>,
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

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl FatInner {
    fn dir_exists(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains_key(path)
    }

    fn has_children(&self, path: &str) -> bool {
        self.files.keys().any(|p| child_name(path, p).is_some())
            || self.dirs.keys().any(|p| child_name(path, p).is_some())
    }

    fn take_handle(&mut self) -> u32 {
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.next_handle
    }
}

impl SdFatFs {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(FatInner {
                files: HashMap::new(),
                dirs: BTreeMap::new(),
                open_files: HashMap::new(),
                open_dirs: HashMap::new(),
                next_handle: 0,
            }),
        }
    }
}

impl Default for SdFatFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SdFatFs {
    fn open(&self, path: &str, mode: OpenMode) -> VfsResult<u32> {
        let mut inner = self.inner.borrow_mut();
        if inner.dirs.contains_key(path) {
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
                inner.files.insert(
                    path.to_string(),
                    FatFile {
                        data: Vec::new(),
                        mtime: now(),
                    },
                );
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
        let mut inner = self.inner.borrow_mut();
        let (path, pos) = match inner.open_files.get(&handle) {
            Some(open) => (open.path.clone(), open.pos),
            None => return Err(VfsError::InvalidHandle),
        };
        let file = inner.files.get(&path).ok_or(VfsError::InvalidHandle)?;
        let end = (pos + buf.len()).min(file.data.len());
        let count = end.saturating_sub(pos);
        buf[..count].copy_from_slice(&file.data[pos..end]);
        if let Some(open) = inner.open_files.get_mut(&handle) {
            open.pos = end;
        }
        Ok(count)
    }

    fn write(&self, handle: u32, data: &[u8]) -> VfsResult<usize> {
        let mut inner = self.inner.borrow_mut();
        let (path, pos, writable) = match inner.open_files.get(&handle) {
            Some(open) => (open.path.clone(), open.pos, open.writable),
            None => return Err(VfsError::InvalidHandle),
        };
        if !writable {
            return Err(VfsError::InvalidHandle);
        }
        let file = inner.files.get_mut(&path).ok_or(VfsError::InvalidHandle)?;
        if file.data.len() < pos + data.len() {
            file.data.resize(pos + data.len(), 0);
        }
        file.data[pos..pos + data.len()].copy_from_slice(data);
        file.mtime = now();
        if let Some(open) = inner.open_files.get_mut(&handle) {
            open.pos = pos + data.len();
        }
        Ok(data.len())
    }

    fn close(&self, handle: u32) -> VfsResult<()> {
        self.inner
            .borrow_mut()
            .open_files
            .remove(&handle)
            .map(|_| ())
            .ok_or(VfsError::InvalidHandle)
    }

    fn opendir(&self, path: &str) -> VfsResult<u32> {
        let mut inner = self.inner.borrow_mut();
        if inner.files.contains_key(path) {
            return Err(VfsError::NotADirectory);
        }
        if !inner.dir_exists(path) {
            return Err(VfsError::NotFound);
        }
        let mut entries: Vec<DirEntry> = Vec::new();
        if !path.is_empty() {
            let mtime = inner.dirs.get(path).copied().unwrap_or_else(now);
            for dot in [".", ".."] {
                entries.push(DirEntry {
                    name: dot.to_string(),
                    size: 0,
                    is_dir: true,
                    mtime: Some(mtime),
                });
            }
        }
        let mut children: Vec<DirEntry> = Vec::new();
        for (dir, mtime) in inner.dirs.iter() {
            if let Some(name) = child_name(path, dir) {
                children.push(DirEntry {
                    name: name.to_string(),
                    size: 0,
                    is_dir: true,
                    mtime: Some(*mtime),
                });
            }
        }
        for (file_path, file) in inner.files.iter() {
            if let Some(name) = child_name(path, file_path) {
                children.push(DirEntry {
                    name: name.to_string(),
                    size: file.data.len() as u64,
                    is_dir: false,
                    mtime: Some(file.mtime),
                });
            }
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        entries.extend(children);
        let handle = inner.take_handle();
        inner.open_dirs.insert(handle, OpenDir { entries, next: 0 });
        Ok(handle)
    }

    fn readdir(&self, handle: u32) -> VfsResult<Option<DirEntry>> {
        let mut inner = self.inner.borrow_mut();
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
        self.inner.borrow_mut().open_dirs.remove(&handle);
    }

    fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let inner = self.inner.borrow();
        if path.is_empty() {
            return Ok(Metadata {
                size: 0,
                is_dir: true,
                mtime: None,
            });
        }
        if let Some(mtime) = inner.dirs.get(path) {
            return Ok(Metadata {
                size: 0,
                is_dir: true,
                mtime: Some(*mtime),
            });
        }
        match inner.files.get(path) {
            Some(file) => Ok(Metadata {
                size: file.data.len() as u64,
                is_dir: false,
                mtime: Some(file.mtime),
            }),
            None => Err(VfsError::NotFound),
        }
    }

    fn mkdir(&self, path: &str) -> VfsResult<()> {
        let mut inner = self.inner.borrow_mut();
        if path.is_empty() || inner.dirs.contains_key(path) || inner.files.contains_key(path) {
            return Err(VfsError::AlreadyExists);
        }
        if !inner.dir_exists(parent(path)) {
            return Err(VfsError::NotFound);
        }
        inner.dirs.insert(path.to_string(), now());
        Ok(())
    }

    fn unlink(&self, path: &str) -> VfsResult<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.files.remove(path).is_some() {
            return Ok(());
        }
        if inner.dirs.contains_key(path) {
            if inner.has_children(path) {
                return Err(VfsError::NotEmpty);
            }
            inner.dirs.remove(path);
            return Ok(());
        }
        Err(VfsError::NotFound)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.files.contains_key(to) || inner.dirs.contains_key(to) {
            return Err(VfsError::AlreadyExists);
        }
        if !inner.dir_exists(parent(to)) {
            return Err(VfsError::NotFound);
        }
        if let Some(mut file) = inner.files.remove(from) {
            file.mtime = now();
            inner.files.insert(to.to_string(), file);
            return Ok(());
        }
        if let Some(mtime) = inner.dirs.remove(from) {
            inner.dirs.insert(to.to_string(), mtime);
            let prefix = format!("{}/", from);
            let moved_dirs: Vec<String> = inner
                .dirs
                .keys()
                .filter(|d| d.starts_with(&prefix))
                .cloned()
                .collect();
            for dir in moved_dirs {
                if let Some(stamp) = inner.dirs.remove(&dir) {
                    inner
                        .dirs
                        .insert(format!("{}/{}", to, &dir[prefix.len()..]), stamp);
                }
            }
            let moved_files: Vec<String> = inner
                .files
                .keys()
                .filter(|f| f.starts_with(&prefix))
                .cloned()
                .collect();
            for file in moved_files {
                if let Some(entry) = inner.files.remove(&file) {
                    inner
                        .files
                        .insert(format!("{}/{}", to, &file[prefix.len()..]), entry);
                }
            }
            return Ok(());
        }
        Err(VfsError::NotFound)
    }

    fn carries_timestamps(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> SdFatFs {
        let fs = SdFatFs::new();
        fs.mkdir("data").unwrap();
        let handle = fs.open("log.txt", OpenMode::WriteCreate).unwrap();
        fs.write(handle, b"entry one\n").unwrap();
        fs.close(handle).unwrap();
        fs
    }

    #[test]
    fn entries_carry_timestamps() {
        let fs = volume();
        let meta = fs.stat("log.txt").unwrap();
        assert!(meta.mtime.is_some());
    }

    #[test]
    fn non_root_dirs_report_dot_entries() {
        let fs = volume();
        let dir = fs.opendir("data").unwrap();
        assert_eq!(fs.readdir(dir).unwrap().unwrap().name, ".");
        assert_eq!(fs.readdir(dir).unwrap().unwrap().name, "..");
        assert!(fs.readdir(dir).unwrap().is_none());
        fs.closedir(dir);
    }

    #[test]
    fn root_has_no_dot_entries() {
        let fs = volume();
        let dir = fs.opendir("").unwrap();
        assert_eq!(fs.readdir(dir).unwrap().unwrap().name, "data");
        assert_eq!(fs.readdir(dir).unwrap().unwrap().name, "log.txt");
        assert!(fs.readdir(dir).unwrap().is_none());
        fs.closedir(dir);
    }
}
