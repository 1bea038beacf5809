use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngageConfig {
    #[serde(default)]
    pub navigator: NavigatorConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Preferred CLI output mode (`pretty`, `text`, `json`), below `FORMAT`.
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigatorConfig {
    /// Settle window after each carousel transition.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_autoplay_ms")]
    pub autoplay_ms: u64,
    #[serde(default)]
    pub autoplay: bool,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            autoplay_ms: default_autoplay_ms(),
            autoplay: false,
        }
    }
}

impl NavigatorConfig {
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub const fn autoplay_interval(&self) -> Duration {
        Duration::from_millis(self.autoplay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_max_author_chars")]
    pub max_author_chars: usize,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_author_chars: default_max_author_chars(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database used by the CLI's local backend.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// File holding the visitor id.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

impl StorageConfig {
    /// Database path, falling back to `<data_dir>/engage/engage.db`, then
    /// `.engage/engage.db` under `project_root`.
    #[must_use]
    pub fn database_path(&self, project_root: &Path) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            dirs::data_dir().map_or_else(
                || project_root.join(".engage").join("engage.db"),
                |dir| dir.join("engage").join("engage.db"),
            )
        })
    }
}

/// Load the first config found: `<project_root>/.engage/config.toml`, then
/// `<config_dir>/engage/config.toml`. Missing files mean defaults.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be read or parsed.
pub fn load_config(project_root: &Path) -> Result<EngageConfig> {
    load_config_from(project_root, dirs::config_dir().as_deref())
}

fn load_config_from(project_root: &Path, user_config_dir: Option<&Path>) -> Result<EngageConfig> {
    let project = project_root.join(".engage/config.toml");
    if project.exists() {
        return load_config_file(&project);
    }

    let Some(config_dir) = user_config_dir else {
        return Ok(EngageConfig::default());
    };
    let user = config_dir.join("engage/config.toml");
    if user.exists() {
        return load_config_file(&user);
    }

    Ok(EngageConfig::default())
}

/// Parse one config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML for
/// [`EngageConfig`].
pub fn load_config_file(path: &Path) -> Result<EngageConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngageConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_settle_ms() -> u64 {
    500
}

const fn default_autoplay_ms() -> u64 {
    6_000
}

const fn default_max_author_chars() -> usize {
    80
}

const fn default_max_content_chars() -> usize {
    8_192
}
