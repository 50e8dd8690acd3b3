//! Configuration loading.
//!
//! Settings come from four layers, highest priority first:
//!
//! 1. command-line flags (and their environment fallbacks, see `main.rs`)
//! 2. `NO_COLOR`
//! 3. the JSON config file (`--config`, or `<config_dir>/wsbridge/config.json`)
//! 4. built-in defaults
//!
//! ```json
//! { "origin": "https://example.com", "prompt": "ws> ", "color": false }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PROMPT, ENV_NO_COLOR};
use crate::ws;

/// Optional settings read from the config file.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// `Origin` header for every connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Prompt shown in front of the input line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Whether inbound messages are coloured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<bool>,
}

impl FileConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wsbridge").join("config.json"))
    }

    /// Reads and parses `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Loads an explicit path (which must exist) or the default path (which
    /// may be missing).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Values supplied on the command line.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// Target URL (`ws://`, `wss://`, `http://`, or `https://`).
    pub url: String,
    /// Explicit `Origin` header.
    pub origin: Option<String>,
    /// Explicit prompt.
    pub prompt: Option<String>,
    /// `--no-color` was given.
    pub no_color: bool,
    /// `--config <PATH>`.
    pub config_path: Option<PathBuf>,
}

/// Fully resolved session settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// WebSocket URL to dial.
    pub url: String,
    /// `Origin` header sent with the handshake.
    pub origin: String,
    /// Prompt shown in front of the input line.
    pub prompt: String,
    /// Whether inbound messages are coloured.
    pub color: bool,
}

impl Config {
    /// Loads the config file named by `overrides` and merges everything.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let file = FileConfig::load(overrides.config_path.as_deref())?;
        Self::resolve(overrides, file, no_color_env())
    }

    /// Merges command-line values, `NO_COLOR`, and file values.
    pub fn resolve(overrides: &Overrides, file: FileConfig, no_color_env: bool) -> Result<Self> {
        let url = ws::http_to_ws_scheme(overrides.url.trim());

        let origin = match overrides.origin.clone().or(file.origin) {
            Some(origin) => origin,
            None => ws::origin_for(&url)
                .with_context(|| format!("cannot derive an origin from {url}; pass --origin"))?,
        };

        let prompt = overrides
            .prompt
            .clone()
            .or(file.prompt)
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        let color = !overrides.no_color && !no_color_env && file.color.unwrap_or(true);

        Ok(Self {
            url,
            origin,
            prompt,
            color,
        })
    }
}

fn no_color_env() -> bool {
    std::env::var_os(ENV_NO_COLOR).is_some_and(|value| !value.is_empty())
}
