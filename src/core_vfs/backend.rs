use chrono::NaiveDateTime;

use super::error::VfsResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Write access, creating the file and truncating any previous
    /// content.
    WriteCreate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    /// `None` when the backend keeps no per-entry timestamp.
    pub mtime: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub size: u64,
    pub is_dir: bool,
    pub mtime: Option<NaiveDateTime>,
}

/// One mounted embedded filesystem.
///
/// Paths are relative to the volume root, without a leading separator
/// (`""` is the root itself); routing from absolute paths is the
/// bridge's job. Open files and directories are referred to by opaque
/// numeric handles. Directory iteration has no seek: a handle only
/// moves forward, and a fresh `opendir` restarts from the beginning in
/// a stable order.
pub trait Backend {
    fn open(&self, path: &str, mode: OpenMode) -> VfsResult<u32>;
    fn read(&self, handle: u32, buf: &mut [u8]) -> VfsResult<usize>;
    fn write(&self, handle: u32, data: &[u8]) -> VfsResult<usize>;
    fn close(&self, handle: u32) -> VfsResult<()>;

    fn opendir(&self, path: &str) -> VfsResult<u32>;
    fn readdir(&self, handle: u32) -> VfsResult<Option<DirEntry>>;
    fn closedir(&self, handle: u32);

    fn stat(&self, path: &str) -> VfsResult<Metadata>;
    fn mkdir(&self, path: &str) -> VfsResult<()>;
    fn unlink(&self, path: &str) -> VfsResult<()>;
    fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Whether directory entries carry their own modification time.
    /// When `false` the bridge maintains write timestamps on the side.
    fn carries_timestamps(&self) -> bool;
}
