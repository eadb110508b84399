//! Single-file change notifications.
//!
//! [`start`] watches one path and calls back with no payload whenever the
//! file is written. Writes that land within [`COALESCE_WINDOW`] of each other
//! are folded into a single callback, so a burst of writes may produce fewer
//! callbacks than writes, but never more.

use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, warn};
use notify::{event::ModifyKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Quiet period that ends a burst of write events.
pub const COALESCE_WINDOW: Duration = Duration::from_millis(50);

/// Cancellation handle returned by [`start`]. Dropping it stops the watch.
pub struct WatchHandle {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
}

/// Starts watching `path`, calling `on_change` from a background thread.
///
/// If the path cannot be watched the returned handle is inert: nothing is
/// retried and `on_change` never runs.
pub fn start<F>(path: &Path, on_change: F) -> WatchHandle
where
    F: FnMut() + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<()>();

    let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if is_write(&event.kind) {
                let _ = tx.send(());
            }
        }
        Err(e) => warn!("watch error: {e:?}"),
    });
    let mut watcher = match watcher {
        Ok(w) => w,
        Err(e) => {
            warn!("failed to create watcher for {}: {e}", path.display());
            return WatchHandle::inert(path);
        }
    };

    if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
        warn!("not watching {}: {e}", path.display());
        return WatchHandle::inert(path);
    }

    let worker = thread::Builder::new()
        .name("mbsc-watch".to_string())
        .spawn(move || deliver(rx, on_change));
    let worker = match worker {
        Ok(handle) => handle,
        Err(e) => {
            warn!("failed to spawn watch thread: {e}");
            return WatchHandle::inert(path);
        }
    };

    debug!("watching {}", path.display());
    WatchHandle {
        path: path.to_path_buf(),
        watcher: Some(watcher),
        worker: Some(worker),
    }
}

impl WatchHandle {
    fn inert(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            watcher: None,
            worker: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Cancels the watch and waits for the delivery thread to finish. Safe to call repeatedly.
    pub fn stop(&mut self) {
        // Dropping the watcher drops its sender, which ends `deliver`.
        if self.watcher.take().is_some() {
            debug!("stopped watching {}", self.path.display());
        }

        if let Some(worker) = self.worker.take() {
            // Stopping from inside the callback must not join itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_write(kind: &EventKind) -> bool {
    match kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) | EventKind::Create(_) => true,
        _ => false,
    }
}

fn deliver<F: FnMut()>(rx: Receiver<()>, mut on_change: F) {
    while rx.recv().is_ok() {
        loop {
            match rx.recv_timeout(COALESCE_WINDOW) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        on_change();
    }
}
