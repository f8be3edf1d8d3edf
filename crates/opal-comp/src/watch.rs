//! File-change watcher driving the shell's hot reload.
//!
//! The shell registers every file it serves; any modification flips the
//! next pump iteration's poll to true, which the compositor answers
//! with a single `reload_reply`. Changes arriving together coalesce:
//! one poll drains the whole queue and still produces one reload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, WatchDescriptor};
use tracing::{info, warn};

pub struct ReloadWatcher {
    inotify: Inotify,
    watched: HashMap<WatchDescriptor, PathBuf>,
}

impl ReloadWatcher {
    pub fn new() -> Result<Self> {
        let inotify = Inotify::init(InitFlags::IN_NONBLOCK).context("inotify init failed")?;
        Ok(Self {
            inotify,
            watched: HashMap::new(),
        })
    }

    /// Start watching a file for modification.
    pub fn register(&mut self, path: &Path) -> Result<()> {
        let wd = self
            .inotify
            .add_watch(path, AddWatchFlags::IN_MODIFY)
            .with_context(|| format!("failed to watch {:?}", path))?;
        info!("watching {:?}", path);
        self.watched.insert(wd, path.to_path_buf());
        Ok(())
    }

    /// True when any watched file changed since the previous poll.
    /// Never blocks; drains the whole event queue in one call.
    pub fn poll(&mut self) -> bool {
        match self.inotify.read_events() {
            Ok(events) => {
                for event in &events {
                    if let Some(path) = self.watched.get(&event.wd) {
                        info!("file updated: {}", path.display());
                    }
                }
                !events.is_empty()
            }
            Err(nix::errno::Errno::EAGAIN) => false,
            Err(e) => {
                warn!("inotify read failed: {}", e);
                false
            }
        }
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_modifications_coalesce_into_one_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<html></html>").unwrap();

        let mut watcher = ReloadWatcher::new().unwrap();
        watcher.register(&path).unwrap();
        assert_eq!(watcher.watched_count(), 1);

        // Quiet file: no signal.
        assert!(!watcher.poll());

        // Two writes before the next poll collapse to one signal.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "one").unwrap();
        writeln!(file, "two").unwrap();
        drop(file);

        assert!(watcher.poll());
        assert!(!watcher.poll());
    }
}
