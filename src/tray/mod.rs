pub mod commands;
pub mod common;
pub mod menu;
pub mod model;

pub mod platform {
    #[cfg(target_os = "macos")]
    pub mod macos;
}
