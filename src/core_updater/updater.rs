//! Firmware-update escape hatch.
//!
//! A STOR whose resolved target matches the configured image path is
//! not written through the filesystem bridge at all; the received
//! bytes go straight to the updater, which owns the write path for the
//! duration of the transfer.

use log::{info, warn};

/// Maximum accepted firmware image, matching the application
/// partition.
const IMAGE_MAX_SIZE: usize = 0x1E_0000;

pub trait Updater {
    /// Whether `path` is the firmware-image target.
    fn check_path(&self, path: &str) -> bool;
    /// Begins an update; `false` when one is already in progress.
    fn start(&mut self) -> bool;
    fn write(&mut self, buf: &[u8]) -> bool;
    /// Ends the update and releases the updater lock. Safe to call on
    /// an updater that never started.
    fn finish(&mut self) -> bool;
}

/// Stages the incoming image in memory; partition switching is the
/// bootloader's job and happens outside the protocol engine.
pub struct ImageUpdater {
    image_path: String,
    staged: Vec<u8>,
    in_progress: bool,
}

impl ImageUpdater {
    pub fn new(image_path: &str) -> Self {
        Self {
            image_path: image_path.to_string(),
            staged: Vec::new(),
            in_progress: false,
        }
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }
}

impl Updater for ImageUpdater {
    fn check_path(&self, path: &str) -> bool {
        path == self.image_path
    }

    fn start(&mut self) -> bool {
        if self.in_progress {
            warn!("firmware update already in progress, refusing to start another");
            return false;
        }
        info!("firmware update started");
        self.staged.clear();
        self.in_progress = true;
        true
    }

    fn write(&mut self, buf: &[u8]) -> bool {
        if !self.in_progress {
            return false;
        }
        if self.staged.len() + buf.len() > IMAGE_MAX_SIZE {
            warn!("firmware image exceeds {} bytes, aborting", IMAGE_MAX_SIZE);
            return false;
        }
        self.staged.extend_from_slice(buf);
        true
    }

    fn finish(&mut self) -> bool {
        if !self.in_progress {
            return false;
        }
        self.in_progress = false;
        info!("firmware update finished, {} bytes staged", self.staged.len());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_the_configured_path() {
        let updater = ImageUpdater::new("/flash/sys/appimg.bin");
        assert!(updater.check_path("/flash/sys/appimg.bin"));
        assert!(!updater.check_path("/flash/sys/appimg.bin.bak"));
        assert!(!updater.check_path("/sd/appimg.bin"));
    }

    #[test]
    fn start_write_finish_cycle() {
        let mut updater = ImageUpdater::new("/flash/sys/appimg.bin");
        assert!(updater.start());
        assert!(!updater.start());
        assert!(updater.write(b"image bytes"));
        assert!(updater.finish());
        assert_eq!(updater.staged_len(), 11);
        assert!(!updater.finish());
    }

    #[test]
    fn write_without_start_is_refused() {
        let mut updater = ImageUpdater::new("/flash/sys/appimg.bin");
        assert!(!updater.write(b"stray"));
    }
}
