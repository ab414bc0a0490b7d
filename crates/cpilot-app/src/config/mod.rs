//! Configuration for Compose Pilot
//!
//! `~/.config/compose-pilot/config.toml` holds the docker path, log cap,
//! refresh interval, and the ordered list of tracked projects.

pub mod settings;
pub mod types;

pub use settings::{
    config_file_path, load_settings, load_settings_from, save_settings, save_settings_to,
};
pub use types::Settings;
