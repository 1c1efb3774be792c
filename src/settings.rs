//! Persistent front end settings.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{KeyscopeError, Result};

/// the settings key under which the last used connection target is kept
pub const LAST_TARGET_KEY: &str = "redis-url";

/// environment variable that overrides the settings directory
pub const HOME_ENV: &str = "KEYSCOPE_HOME";

const SETTINGS_FILE: &str = "settings.json";

/// Small persistent key/value settings document, stored as JSON.
///
/// The only entry the front end relies on is [`LAST_TARGET_KEY`]: the connection target of
/// the last successful session, handed back verbatim on the next start.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Settings {
    /// `$KEYSCOPE_HOME/settings.json`, or `<config dir>/keyscope/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(home) = std::env::var(HOME_ENV) {
            return Ok(PathBuf::from(home).join(SETTINGS_FILE));
        }
        dirs::config_dir()
            .map(|dir| dir.join("keyscope").join(SETTINGS_FILE))
            .ok_or_else(|| KeyscopeError::Config("could not determine a config directory".into()))
    }

    /// loads the settings at `path`.
    ///
    /// A missing file gives empty settings. So does a file whose content is not a settings
    /// document; it is overwritten on the next [`Settings::save`].
    pub fn load(path: impl Into<PathBuf>) -> Result<Settings> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(values) => values,
                Err(e) => {
                    warn!("ignoring unreadable settings file {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Settings { path, values })
    }

    /// where these settings are saved
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// the connection target of the last session, if any
    pub fn last_target(&self) -> Option<&str> {
        self.values.get(LAST_TARGET_KEY).map(String::as_str)
    }

    /// records `target` as the last used target
    pub fn remember(&mut self, target: &str) {
        self.values.insert(LAST_TARGET_KEY.to_string(), target.to_string());
    }

    /// drops the last used target
    pub fn forget(&mut self) {
        self.values.remove(LAST_TARGET_KEY);
    }

    /// writes the settings back, creating the parent directory if needed
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        debug!("saved settings to {:?}", self.path);
        Ok(())
    }
}
