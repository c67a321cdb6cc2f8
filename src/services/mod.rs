//! Background services

pub mod source_sync;
pub mod updater;

pub use source_sync::{SourceSync, SourceSyncHandle};
pub use updater::{ConfigUpdater, UpdaterHandle};
