//! User configuration stored in `~/.pkgjobd/config.ini`.

mod file;

pub use file::{
    config_directory, config_file_path, AppstoreSettings, ConfigError, ConfigFile,
    DaemonSettings, DEFAULT_DISPATCH_INTERVAL_MS,
};
