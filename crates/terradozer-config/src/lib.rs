pub mod config;
pub mod error;

pub use config::{BUILTIN_PROVIDERS, Config, ProviderConfig};
pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "TERRADOZER_CONFIG";

const CANDIDATES: [&str; 2] = ["terradozer.yaml", ".terradozer.yaml"];

/// Locate the terradozer config file.
///
/// Search order:
/// 1. `explicit` (the `--config` flag), then the `TERRADOZER_CONFIG` env var.
///    A path given this way must exist.
/// 2. Current directory: terradozer.yaml, .terradozer.yaml
/// 3. ./.terradozer/config.yaml
/// 4. `<config_dir>/terradozer/config.yaml` (global config)
///
/// Returns `None` when no file exists; built-in defaults apply then.
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(Some(path));
        }
        return Err(ConfigError::NotFound(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    let local = current_dir.join(".terradozer").join("config.yaml");
    if local.is_file() {
        return Ok(Some(local));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("terradozer").join("config.yaml");
        if global.is_file() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// Find and load the config, falling back to defaults when there is none
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match find_config_file(explicit)? {
        Some(path) => Config::load(&path),
        None => Ok(Config::default()),
    }
}
