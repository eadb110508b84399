use std::{path::{Path, PathBuf}, sync::Arc};

use anyhow::{anyhow, Result};
use log::{info, warn};

use crate::{
    config::{self, MenuConfig},
    watcher::{self, WatchHandle},
};

/// Owns the config file and the currently published menu tree.
///
/// The store has a single writer: whoever owns it (the UI thread). Readers on
/// any thread take an immutable [`snapshot`](Self::snapshot); a reload swaps
/// in a new snapshot and never touches the old one. A reload that fails keeps
/// the previous tree and terminal.
pub struct ConfigStore {
    path: PathBuf,
    template: Option<&'static str>,
    published: Arc<MenuConfig>,
    generation: u64,
    last_error: Option<String>,
    watch: Option<WatchHandle>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, template: Option<&'static str>) -> Self {
        Self {
            path: path.into(),
            template,
            published: Arc::new(MenuConfig::default()),
            generation: 0,
            last_error: None,
            watch: None,
        }
    }

    /// Store for `<home>/.mbsc.json`, seeded from the bundled template.
    pub fn open_default() -> Result<Self> {
        let path = config::resolve_config_path()
            .ok_or_else(|| anyhow!("No config path available (HOME is not set)"))?;
        Ok(Self::new(path, Some(config::DEFAULT_TEMPLATE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seeds the config file from the template if it does not exist yet.
    pub fn initialize(&mut self) {
        match config::ensure_config_file_exists(&self.path, self.template) {
            Ok(true) => info!("created {} from template", self.path.display()),
            Ok(false) => {}
            Err(e) => warn!("{e:#}"),
        }
    }

    /// Rereads the file and publishes it. Returns `false` (keeping the last
    /// good tree) when the file cannot be read or parsed.
    pub fn reload(&mut self) -> bool {
        match config::load(&self.path) {
            Ok(cfg) => {
                info!(
                    "loaded {} ({} entries, terminal {:?})",
                    self.path.display(),
                    cfg.data.len(),
                    cfg.terminal
                );
                self.published = Arc::new(cfg);
                self.generation += 1;
                self.last_error = None;
                true
            }
            Err(e) => {
                warn!("keeping previous config: {e:#}");
                self.last_error = Some(format!("{e:#}"));
                false
            }
        }
    }

    pub fn snapshot(&self) -> Arc<MenuConfig> {
        Arc::clone(&self.published)
    }

    pub fn terminal(&self) -> &str {
        &self.published.terminal
    }

    /// Bumped on every successful publish.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Why the most recent reload failed, if it did.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Watches the config file. `schedule` runs on a background thread for
    /// every change burst and must hand the reload back to the owner's thread.
    pub fn watch<F>(&mut self, schedule: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.unwatch();
        self.watch = Some(watcher::start(&self.path, schedule));
    }

    pub fn is_watching(&self) -> bool {
        self.watch.as_ref().is_some_and(WatchHandle::is_active)
    }

    pub fn unwatch(&mut self) {
        if let Some(mut handle) = self.watch.take() {
            if handle.is_active() {
                info!("no longer watching {}", handle.path().display());
            }
            handle.stop();
        }
    }
}
