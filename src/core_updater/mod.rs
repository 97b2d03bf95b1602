pub mod updater;

pub use updater::{ImageUpdater, Updater};
