use anyhow::Result;

#[cfg(not(target_os = "macos"))]
fn main() -> Result<()> {
    anyhow::bail!("mbsc-tray is only supported on macOS");
}

#[cfg(target_os = "macos")]
fn main() -> Result<()> {
    use std::fs::OpenOptions;

    use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    if let Ok(log_file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open("/tmp/mbsc-tray.log")
    {
        let _ = WriteLogger::init(LevelFilter::Info, log_config, log_file);
    }

    mbsc::tray::platform::macos::run()
}
