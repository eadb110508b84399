pub mod config;
pub mod dispatch;
pub mod store;
pub mod tray;
pub mod watcher;
