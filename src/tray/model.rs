use std::path::PathBuf;

use log::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::store::ConfigStore;
use crate::tray::commands::{
    ActionsMap, Command, CMD_BASE_ACTION, CMD_EDIT_CONFIG, CMD_QUIT, CMD_RELOAD,
};
use crate::tray::common;
use crate::tray::menu::{MenuItem, MenuSpec};

pub const APP_NAME: &str = "mbsc";

/// Platform-independent state behind the status-bar menu.
pub struct TrayModel {
    store: ConfigStore,
    dispatcher: Dispatcher,
    actions: ActionsMap,
}

#[derive(Debug, Default, Clone)]
pub struct ModelUpdate {
    pub refresh_menu: bool,
    pub refresh_tooltip: bool,
    pub quit: bool,
    pub open_path: Option<PathBuf>,
    /// The file exists now but nothing is watching it.
    pub restart_watch: bool,
}

impl TrayModel {
    /// Seeds and loads the config. Watching is started by the platform layer,
    /// which knows how to get back onto its main thread.
    pub fn new(mut store: ConfigStore, dispatcher: Dispatcher) -> Self {
        store.initialize();
        store.reload();
        let (_, actions) = common::build_actions(&store.snapshot(), CMD_BASE_ACTION);

        Self {
            store,
            dispatcher,
            actions,
        }
    }

    pub fn actions(&self) -> &ActionsMap {
        &self.actions
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    pub fn tooltip(&self) -> String {
        match self.store.last_error() {
            None => APP_NAME.to_string(),
            Some(e) => format!("{APP_NAME}: {e}"),
        }
    }

    pub fn menu_spec(&self) -> MenuSpec {
        let (mut items, _) = common::build_actions(&self.store.snapshot(), CMD_BASE_ACTION);

        items.push(MenuItem::Separator);
        items.push(MenuItem::Action {
            id: CMD_EDIT_CONFIG,
            title: "Edit".to_string(),
        });
        items.push(MenuItem::Action {
            id: CMD_RELOAD,
            title: "Reload config".to_string(),
        });
        items.push(MenuItem::Action {
            id: CMD_QUIT,
            title: "Quit".to_string(),
        });

        MenuSpec::new(items)
    }

    pub fn handle(&mut self, cmd: Command) -> ModelUpdate {
        match cmd {
            Command::Run(id) => {
                match self.actions.get(&id) {
                    Some(command) => self.dispatcher.dispatch(command, self.store.terminal()),
                    None => warn!("no action for menu tag {id}"),
                }
                ModelUpdate::default()
            }
            Command::Reload => self.config_changed(),
            Command::EditConfig => {
                self.store.initialize();
                ModelUpdate {
                    open_path: Some(self.store.path().to_path_buf()),
                    restart_watch: self.store.path().is_file() && !self.store.is_watching(),
                    ..Default::default()
                }
            }
            Command::Quit => ModelUpdate {
                quit: true,
                ..Default::default()
            },
        }
    }

    /// Reloads after the file changed. Must run on the thread that owns the model.
    pub fn config_changed(&mut self) -> ModelUpdate {
        let published = self.store.reload();
        if published {
            let (_, actions) = common::build_actions(&self.store.snapshot(), CMD_BASE_ACTION);
            self.actions = actions;
        }
        debug!("config reload published={published}");

        ModelUpdate {
            refresh_menu: published,
            refresh_tooltip: true,
            ..Default::default()
        }
    }
}
