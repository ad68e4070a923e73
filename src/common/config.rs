use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Well-known name of the daemon's IPC endpoint.
pub const SERVICE_NAME: &str = "dev.spacetoggle.daemon";

const CONFIG_DIR: &str = ".config/spacetoggle";
const SETTINGS_FILE: &str = "settings.toml";
const SPACES_FILE: &str = "spaces.json";
const ENDPOINT_FILE: &str = "daemon.json";
const LAYOUT_DOCUMENT: &str = "Library/Preferences/com.apple.spaces.plist";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub poll_interval_ms: u64,
    pub app_settle_delay_ms: u64,
    pub layout_ttl_ms: u64,
    pub toggle: ToggleSettings,
}

/// Which preference the daemon drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToggleSettings {
    pub domain: String,
    pub key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            poll_interval_ms: 2000,
            app_settle_delay_ms: 100,
            layout_ttl_ms: 1000,
            toggle: ToggleSettings::default(),
        }
    }
}

impl Default for ToggleSettings {
    fn default() -> Self {
        ToggleSettings {
            domain: "com.apple.WindowManager".to_string(),
            key: "GloballyEnabled".to_string(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn read(path: &Path) -> anyhow::Result<Settings> {
        match fs::read_to_string(path) {
            Ok(buf) => Self::parse(&buf)
                .with_context(|| format!("failed to parse settings at {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read settings at {}", path.display()))
            }
        }
    }

    pub fn parse(buf: &str) -> anyhow::Result<Settings> { Ok(toml::from_str(buf)?) }

    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms.max(1)) }

    pub fn app_settle_delay(&self) -> Duration { Duration::from_millis(self.app_settle_delay_ms) }

    pub fn layout_ttl(&self) -> Duration { Duration::from_millis(self.layout_ttl_ms) }
}

/// Per-user file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub layout_document: PathBuf,
}

impl Paths {
    pub fn new(config_dir: PathBuf, layout_document: PathBuf) -> Self {
        Paths { config_dir, layout_document }
    }

    /// Resolves the default locations under the user's home directory.
    /// `config_dir` replaces the default configuration directory when given.
    pub fn resolve(config_dir: Option<PathBuf>) -> anyhow::Result<Paths> {
        let home = dirs::home_dir().context("unable to resolve home directory")?;
        let config_dir = config_dir.unwrap_or_else(|| home.join(CONFIG_DIR));
        Ok(Paths::new(config_dir, home.join(LAYOUT_DOCUMENT)))
    }

    pub fn settings(&self) -> PathBuf { self.config_dir.join(SETTINGS_FILE) }

    pub fn spaces_config(&self) -> PathBuf { self.config_dir.join(SPACES_FILE) }

    pub fn endpoint_file(&self) -> PathBuf { self.config_dir.join(ENDPOINT_FILE) }

    pub fn socket(&self) -> PathBuf { self.config_dir.join(format!("{SERVICE_NAME}.sock")) }
}
