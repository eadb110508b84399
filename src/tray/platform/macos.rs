use std::{
    ffi::c_void,
    fs::OpenOptions,
    os::fd::AsRawFd,
    path::Path,
    process::Command,
    sync::Once,
};

use anyhow::{anyhow, Context, Result};
use cocoa::{
    appkit::{NSApp, NSApplication, NSApplicationActivationPolicyAccessory, NSStatusBar},
    base::{id, nil, NO},
    foundation::{NSAutoreleasePool, NSInteger, NSString},
};
use log::{error, info};
use objc::{
    class,
    declare::ClassDecl,
    msg_send,
    runtime::{Class, Object, Sel},
    sel, sel_impl,
};

use crate::dispatch::Dispatcher;
use crate::store::ConfigStore;
use crate::tray::commands;
use crate::tray::menu::MenuItem;
use crate::tray::model::{ModelUpdate, TrayModel, APP_NAME};

pub fn run() -> Result<()> {
    unsafe {
        // Launched from a shell, closing that terminal would SIGHUP the app.
        detach_from_terminal();

        let _pool = NSAutoreleasePool::new(nil);

        let app = NSApp();
        app.setActivationPolicy_(NSApplicationActivationPolicyAccessory);

        let store = ConfigStore::open_default().context("locate config")?;
        let mut state = Box::new(State::new(TrayModel::new(store, Dispatcher::new())));
        let state_ptr: *mut State = &mut *state;

        let target = new_target(state_ptr);
        state
            .install_status_item(target)
            .context("install status item")?;

        state.start_watch(target);
        info!("{APP_NAME} running, config at {}", state.model.store().path().display());

        app.run();
        drop(state);
    }

    Ok(())
}

fn detach_from_terminal() {
    unsafe {
        libc::signal(libc::SIGHUP, libc::SIG_IGN);

        let stdout_is_tty = libc::isatty(libc::STDOUT_FILENO) == 1;
        let stderr_is_tty = libc::isatty(libc::STDERR_FILENO) == 1;
        if !stdout_is_tty && !stderr_is_tty {
            return;
        }

        if let Ok(f) = OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/mbsc-tray.out")
        {
            let _ = libc::dup2(f.as_raw_fd(), libc::STDOUT_FILENO);
            let _ = libc::dup2(f.as_raw_fd(), libc::STDERR_FILENO);
        }
    }
}

/// Menu target handed to the watcher thread. Only used to post
/// `onConfigChanged:` to the main thread, never dereferenced off it.
struct MainThreadTarget(id);

unsafe impl Send for MainThreadTarget {}

impl MainThreadTarget {
    fn config_changed(&self) {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let _: () = msg_send![self.0, performSelectorOnMainThread: sel!(onConfigChanged:) withObject: nil waitUntilDone: NO];
            let _: () = msg_send![pool, drain];
        }
    }
}

struct State {
    status_item: Option<id>,
    menu: Option<id>,
    model: TrayModel,
}

impl State {
    fn new(model: TrayModel) -> Self {
        Self {
            status_item: None,
            menu: None,
            model,
        }
    }

    fn start_watch(&mut self, target: id) {
        let main_thread = MainThreadTarget(target);
        self.model
            .store_mut()
            .watch(move || main_thread.config_changed());
    }

    fn install_status_item(&mut self, target: id) -> Result<()> {
        unsafe {
            let status_item: id =
                msg_send![NSStatusBar::systemStatusBar(nil), statusItemWithLength: -1.0];
            let button: id = msg_send![status_item, button];
            let title = nsstring(APP_NAME);
            let _: () = msg_send![button, setTitle: title];

            self.status_item = Some(status_item);
            self.rebuild_menu(target).context("build menu")?;
            self.update_tooltip();
        }

        Ok(())
    }

    fn rebuild_menu(&mut self, target: id) -> Result<()> {
        let spec = self.model.menu_spec();
        unsafe {
            let menu = new_menu(APP_NAME);
            add_items(menu, &spec.items, target);

            if let Some(status_item) = self.status_item {
                let _: () = msg_send![status_item, setMenu: menu];
            }

            self.menu = Some(menu);
        }
        Ok(())
    }

    fn update_tooltip(&mut self) {
        unsafe {
            let status_item = match self.status_item {
                Some(s) => s,
                None => return,
            };
            let button: id = msg_send![status_item, button];
            let tip = nsstring(&self.model.tooltip());
            let _: () = msg_send![button, setToolTip: tip];
        }
    }

    fn handle_cmd(&mut self, cmd: u16, target: id) -> Result<()> {
        let Some(cmd) = commands::decode(cmd, self.model.actions()) else {
            return Ok(());
        };
        let update = self.model.handle(cmd);
        self.apply(update, target)
    }

    fn apply(&mut self, update: ModelUpdate, target: id) -> Result<()> {
        if update.refresh_menu {
            self.rebuild_menu(target)?;
        }
        if update.refresh_tooltip {
            self.update_tooltip();
        }
        if update.restart_watch {
            self.start_watch(target);
        }
        if let Some(path) = update.open_path {
            shell_open(&path).with_context(|| format!("open {}", path.display()))?;
        }
        if update.quit {
            self.model.store_mut().unwatch();
            unsafe {
                let app = NSApp();
                let _: () = msg_send![app, terminate: nil];
            }
        }
        Ok(())
    }
}

fn shell_open(path: &Path) -> Result<()> {
    let status = Command::new("open")
        .arg(path)
        .status()
        .with_context(|| format!("running open {}", path.display()))?;
    if !status.success() {
        return Err(anyhow!("open failed (exit={status})"));
    }
    Ok(())
}

unsafe fn nsstring(s: &str) -> id {
    NSString::alloc(nil).init_str(s)
}

unsafe fn new_menu(title: &str) -> id {
    let menu: id = msg_send![class!(NSMenu), alloc];
    msg_send![menu, initWithTitle: nsstring(title)]
}

unsafe fn add_items(menu: id, items: &[MenuItem], target: id) {
    for item in items {
        match item {
            MenuItem::Separator => {
                let sep: id = msg_send![class!(NSMenuItem), separatorItem];
                let _: () = msg_send![menu, addItem: sep];
            }
            MenuItem::Action { id: tag, title } => {
                add_action_item(menu, title, sel!(onMenuItem:), target, *tag as NSInteger);
            }
            MenuItem::Submenu { title, items } => {
                let submenu = new_menu(title);
                add_items(submenu, items, target);

                let entry: id = msg_send![class!(NSMenuItem), alloc];
                let empty = nsstring("");
                let entry: id = msg_send![entry, initWithTitle: nsstring(title) action: nil keyEquivalent: empty];
                let _: () = msg_send![entry, setSubmenu: submenu];
                let _: () = msg_send![menu, addItem: entry];
            }
        }
    }
}

unsafe fn add_action_item(menu: id, title: &str, action: Sel, target: id, tag: NSInteger) {
    let item: id = msg_send![class!(NSMenuItem), alloc];
    let title = nsstring(title);
    let empty = nsstring("");
    let item: id = msg_send![item, initWithTitle: title action: action keyEquivalent: empty];
    let _: () = msg_send![item, setTarget: target];
    let _: () = msg_send![item, setTag: tag];
    let _: () = msg_send![menu, addItem: item];
}

fn target_class() -> *const Class {
    static ONCE: Once = Once::new();
    static mut CLS: *const Class = std::ptr::null();

    ONCE.call_once(|| unsafe {
        let ns_object = class!(NSObject);
        let mut decl = ClassDecl::new("MbscTrayTarget", ns_object)
            .expect("MbscTrayTarget class already registered");
        decl.add_ivar::<*mut c_void>("state_ptr");
        decl.add_method(
            sel!(onMenuItem:),
            on_menu_item as extern "C" fn(&Object, Sel, id),
        );
        decl.add_method(
            sel!(onConfigChanged:),
            on_config_changed as extern "C" fn(&Object, Sel, id),
        );
        CLS = decl.register();
    });

    unsafe { CLS }
}

fn new_target(state_ptr: *mut State) -> id {
    unsafe {
        let cls = target_class();
        let obj: id = msg_send![cls, new];
        (*obj).set_ivar("state_ptr", state_ptr as *mut c_void);
        obj
    }
}

unsafe fn state_of(this: &Object) -> Option<&mut State> {
    let state_ptr: *mut c_void = *this.get_ivar("state_ptr");
    if state_ptr.is_null() {
        return None;
    }
    Some(&mut *(state_ptr as *mut State))
}

extern "C" fn on_menu_item(this: &Object, _cmd: Sel, sender: id) {
    unsafe {
        let Some(state) = state_of(this) else {
            return;
        };
        let tag: NSInteger = msg_send![sender, tag];

        if let Err(e) = state.handle_cmd(tag as u16, this as *const _ as id) {
            error!("menu command failed: {e:#}");
        }
    }
}

extern "C" fn on_config_changed(this: &Object, _cmd: Sel, _arg: id) {
    unsafe {
        let Some(state) = state_of(this) else {
            return;
        };
        let update = state.model.config_changed();
        if let Err(e) = state.apply(update, this as *const _ as id) {
            error!("applying config change failed: {e:#}");
        }
    }
}
