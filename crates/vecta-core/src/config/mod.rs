//! Configuration loading for the embedding service.

pub mod settings;

pub use settings::{
    ConfigError, ConfigResult, SETTINGS_FILE_NAME, Settings, env, parse_comma_list,
};
