//! Locates the texfilter configuration file.
//!
//! Resolution order: an explicit `--config` path, then
//! `$TEXFILTER_CONFIG_DIR/config.toml`, then `config.toml` in the platform
//! config directory reported by `directories-next`. Only an explicit path is
//! required to exist; a missing discovered file means "built-ins only".

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::ProjectDirs;
use filterconfig::FilterConfig;

pub const ENV_CONFIG_DIR: &str = "TEXFILTER_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "config.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "texfilter";
const APPLICATION: &str = "texfilter";

/// Where the configuration file was looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Passed with `--config`; must exist.
    Explicit(PathBuf),
    /// Derived from the environment or platform directories; may be absent.
    Discovered(PathBuf),
    /// No candidate could be determined.
    Unavailable,
}

impl ConfigLocation {
    pub fn resolve(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return ConfigLocation::Explicit(path.to_path_buf());
        }
        if let Some(dir) = env_override(ENV_CONFIG_DIR) {
            return ConfigLocation::Discovered(dir.join(CONFIG_FILE_NAME));
        }
        match ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION) {
            Some(dirs) => ConfigLocation::Discovered(dirs.config_dir().join(CONFIG_FILE_NAME)),
            None => ConfigLocation::Unavailable,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigLocation::Explicit(path) | ConfigLocation::Discovered(path) => Some(path),
            ConfigLocation::Unavailable => None,
        }
    }

    /// Reads and validates the file at this location.
    pub fn load(&self) -> Result<Option<FilterConfig>> {
        match self {
            ConfigLocation::Explicit(path) => {
                if !path.is_file() {
                    return Err(anyhow!("config file {} does not exist", path.display()));
                }
                let config = FilterConfig::from_path(path)
                    .with_context(|| format!("failed to load {}", path.display()))?;
                Ok(Some(config))
            }
            ConfigLocation::Discovered(path) => {
                let config = FilterConfig::from_path_if_exists(path)
                    .with_context(|| format!("failed to load {}", path.display()))?;
                if config.is_none() {
                    tracing::debug!(path = %path.display(), "no config file; using built-in presets");
                }
                Ok(config)
            }
            ConfigLocation::Unavailable => {
                tracing::debug!("could not determine a config directory; using built-in presets");
                Ok(None)
            }
        }
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
