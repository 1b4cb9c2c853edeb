//! Hot reload of the configuration file.
//!
//! The parent directory is watched rather than the file, so editors that
//! replace the file through a rename keep producing events. Bursts of
//! events are collapsed into one reload, and only configurations that
//! parse and validate are sent on.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;

/// Quiet period that ends a burst of file events.
pub const DEBOUNCE: Duration = Duration::from_millis(250);

/// Watches one configuration file and emits validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for reloaded configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEBOUNCE,
            update_tx,
        };
        (watcher, update_rx)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Reloads stop once the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(OsString::from).ok_or_else(|| {
            notify::Error::generic("configuration path has no file name")
        })?;

        let (event_tx, event_rx) = std_mpsc::channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if touches(&event, &file_name) => {
                let _ = event_tx.send(());
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Config watch error"),
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        let Self {
            path,
            debounce,
            update_tx,
        } = self;
        thread::Builder::new()
            .name("config-reload".into())
            .spawn(move || reload_loop(&path, debounce, &event_rx, &update_tx))
            .map_err(notify::Error::io)?;

        tracing::info!(directory = %directory.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

fn reload_loop(
    path: &Path,
    debounce: Duration,
    events: &std_mpsc::Receiver<()>,
    updates: &mpsc::UnboundedSender<AppConfig>,
) {
    // Ends when the notify watcher, and with it the event sender, is dropped.
    while events.recv().is_ok() {
        loop {
            match events.recv_timeout(debounce) {
                Ok(()) => continue,
                Err(std_mpsc::RecvTimeoutError::Timeout) => break,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }

        // `load_config` runs `validate_config`, so only valid configurations
        // reach the receiver.
        match load_config(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Configuration reloaded");
                if updates.send(config).is_err() {
                    return;
                }
            }
            Err(e) => tracing::error!(
                path = %path.display(),
                error = %e,
                "Rejected configuration change, keeping the current one"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::time::timeout;

    fn replace_atomically(path: &Path, content: &str) {
        let staging = path.with_extension("toml.tmp");
        fs::write(&staging, content).unwrap();
        fs::rename(&staging, path).unwrap();
    }

    #[tokio::test]
    async fn test_reload_after_atomic_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatchr.toml");
        fs::write(&path, "DEBUG = false\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.with_debounce(Duration::from_millis(50)).run().unwrap();

        replace_atomically(&path, "DEBUG = true\nAPPLICATION_ROOT = \"/reloaded\"\n");

        let config = timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("no reload within 5s")
            .unwrap();
        assert!(config.debug);
        assert_eq!(config.application_root, "/reloaded");
    }

    #[tokio::test]
    async fn test_invalid_change_is_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatchr.toml");
        fs::write(&path, "DEBUG = false\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.with_debounce(Duration::from_millis(50)).run().unwrap();

        fs::write(&path, "SESSION_COOKIE_NAME = \"\"\n").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        fs::write(&path, "SESSION_COOKIE_NAME = \"sid\"\n").unwrap();

        let config = timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("no reload within 5s")
            .unwrap();
        assert_eq!(config.session_cookie_name, "sid");
    }

    #[test]
    fn test_other_files_are_ignored() {
        let event = Event::new(notify::EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/etc/app/other.toml"));
        assert!(!touches(&event, &OsString::from("dispatchr.toml")));

        let event = Event::new(notify::EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/etc/app/dispatchr.toml"));
        assert!(touches(&event, &OsString::from("dispatchr.toml")));
    }
}
