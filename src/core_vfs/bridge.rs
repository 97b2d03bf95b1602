//! Routes absolute paths to one of the mounted volumes and hides the
//! differences between their metadata models behind one operation set.

use std::collections::HashMap;

use chrono::{NaiveDateTime, Utc};
use log::debug;

use super::backend::{Backend, DirEntry, Metadata, OpenMode};
use super::error::{VfsError, VfsResult};

struct Mount {
    name: String,
    backend: Box<dyn Backend>,
    /// Best-effort write timestamps for volumes whose backend keeps
    /// none of its own, keyed by volume-relative path.
    mtimes: HashMap<String, NaiveDateTime>,
}

/// An open file, routed to its volume. The `dirty` flag is set on every
/// write and consumed once, at close time, so the out-of-band timestamp
/// costs one update per open/close cycle instead of one per write.
#[derive(Debug)]
pub struct FileRef {
    mount: usize,
    handle: u32,
    rel_path: String,
    dirty: bool,
}

/// An open directory iterator, routed to its volume.
#[derive(Debug)]
pub struct DirRef {
    mount: usize,
    handle: u32,
    rel_path: String,
}

pub struct VfsBridge {
    mounts: Vec<Mount>,
}

fn join(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", rel, name)
    }
}

impl VfsBridge {
    pub fn new() -> Self {
        Self { mounts: Vec::new() }
    }

    pub fn mount(&mut self, name: &str, backend: Box<dyn Backend>) {
        self.mounts.push(Mount {
            name: name.to_string(),
            backend,
            mtimes: HashMap::new(),
        });
    }

    pub fn volume(&self, index: usize) -> Option<&str> {
        self.mounts.get(index).map(|m| m.name.as_str())
    }

    /// Resolves an absolute path to a mounted volume and the remainder
    /// relative to that volume's root. A path outside every mount is a
    /// not-found error, the same as a missing file.
    fn route<'a>(&self, path: &'a str) -> VfsResult<(usize, &'a str)> {
        let stripped = path.strip_prefix('/').ok_or(VfsError::NotFound)?;
        let (volume, rest) = match stripped.find('/') {
            Some(idx) => (&stripped[..idx], &stripped[idx + 1..]),
            None => (stripped, ""),
        };
        for (index, mount) in self.mounts.iter().enumerate() {
            if mount.name == volume {
                return Ok((index, rest));
            }
        }
        debug!("path {:?} does not resolve to any mounted volume", path);
        Err(VfsError::NotFound)
    }

    pub fn open(&mut self, path: &str, mode: OpenMode) -> VfsResult<FileRef> {
        let (mount, rel) = self.route(path)?;
        let handle = self.mounts[mount].backend.open(rel, mode)?;
        Ok(FileRef {
            mount,
            handle,
            rel_path: rel.to_string(),
            dirty: false,
        })
    }

    pub fn read(&mut self, file: &FileRef, buf: &mut [u8]) -> VfsResult<usize> {
        self.mounts[file.mount].backend.read(file.handle, buf)
    }

    pub fn write(&mut self, file: &mut FileRef, data: &[u8]) -> VfsResult<usize> {
        let count = self.mounts[file.mount].backend.write(file.handle, data)?;
        file.dirty = true;
        Ok(count)
    }

    pub fn close(&mut self, file: FileRef) -> VfsResult<()> {
        let mount = &mut self.mounts[file.mount];
        let result = mount.backend.close(file.handle);
        if file.dirty && !mount.backend.carries_timestamps() {
            mount
                .mtimes
                .insert(file.rel_path, Utc::now().naive_utc());
        }
        result
    }

    pub fn opendir(&mut self, path: &str) -> VfsResult<DirRef> {
        let (mount, rel) = self.route(path)?;
        let handle = self.mounts[mount].backend.opendir(rel)?;
        Ok(DirRef {
            mount,
            handle,
            rel_path: rel.to_string(),
        })
    }

    pub fn readdir(&mut self, dir: &DirRef) -> VfsResult<Option<DirEntry>> {
        let mount = &self.mounts[dir.mount];
        let mut entry = mount.backend.readdir(dir.handle)?;
        if let Some(ref mut entry) = entry {
            if entry.mtime.is_none() {
                entry.mtime = mount.mtimes.get(&join(&dir.rel_path, &entry.name)).copied();
            }
        }
        Ok(entry)
    }

    pub fn closedir(&mut self, dir: DirRef) {
        self.mounts[dir.mount].backend.closedir(dir.handle);
    }

    /// Reopens the directory `dir` iterates over, restarting iteration
    /// from the first entry.
    pub fn reopendir(&mut self, dir: DirRef) -> VfsResult<DirRef> {
        let mount = dir.mount;
        let rel_path = dir.rel_path.clone();
        self.closedir(dir);
        let handle = self.mounts[mount].backend.opendir(&rel_path)?;
        Ok(DirRef {
            mount,
            handle,
            rel_path,
        })
    }

    pub fn stat(&mut self, path: &str) -> VfsResult<Metadata> {
        let (mount, rel) = self.route(path)?;
        let mount = &self.mounts[mount];
        let mut meta = mount.backend.stat(rel)?;
        if meta.mtime.is_none() {
            meta.mtime = mount.mtimes.get(rel).copied();
        }
        Ok(meta)
    }

    pub fn mkdir(&mut self, path: &str) -> VfsResult<()> {
        let (mount, rel) = self.route(path)?;
        self.mounts[mount].backend.mkdir(rel)
    }

    pub fn unlink(&mut self, path: &str) -> VfsResult<()> {
        let (mount, rel) = self.route(path)?;
        let result = self.mounts[mount].backend.unlink(rel);
        if result.is_ok() {
            self.mounts[mount].mtimes.remove(rel);
        }
        result
    }

    /// Renames within a single volume. A destination that routes to a
    /// different volume than the source is reported as not found; the
    /// backends cannot move data between each other.
    pub fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        let (from_mount, from_rel) = self.route(from)?;
        let (to_mount, to_rel) = self.route(to)?;
        if from_mount != to_mount {
            debug!("rename {:?} -> {:?} crosses volumes, rejected", from, to);
            return Err(VfsError::NotFound);
        }
        self.mounts[from_mount].backend.rename(from_rel, to_rel)?;
        if let Some(stamp) = self.mounts[from_mount].mtimes.remove(from_rel) {
            self.mounts[from_mount]
                .mtimes
                .insert(to_rel.to_string(), stamp);
        }
        Ok(())
    }
}

impl Default for VfsBridge {
    fn default() -> Self {
        Self::new()
    }
}
