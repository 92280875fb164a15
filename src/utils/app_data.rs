use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "nutrimatic";
const CONFIG_FILE: &str = "config.json";

/// Engine configuration, read from a JSON file.
///
/// Every field has a default, so a config file only needs the keys it wants
/// to change. Command-line flags override whatever is loaded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Search node budget; `None` leaves the engine unbounded so the caller's
    /// resource limits decide when to stop
    pub max_nodes: Option<u64>,

    /// Emit a `# <nodes>` heartbeat every this many expanded nodes
    pub heartbeat_interval: u64,

    /// Score multiplier applied when a search continues past the end of a
    /// chain by restarting at the index root (0 disables restarts)
    pub restart_penalty: f64,

    /// Largest automaton a pattern may compile to
    pub max_automaton_states: usize,

    /// Chains buffered in memory before the builder writes a shard
    pub chains_per_shard: usize,

    /// Longest chain (in bytes) the builder cuts from running text
    pub history_window: usize,

    /// How many times an article title is counted
    pub title_multiplier: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_nodes: None,
            heartbeat_interval: 100_000,
            restart_penalty: 1e-6,
            max_automaton_states: 250_000,
            chains_per_shard: 1_000_000,
            history_window: 40,
            title_multiplier: 10,
        }
    }
}

impl AppConfig {
    /// Load config from `path`, or from the app config directory when no
    /// path is given. A missing default file yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => match get_config_path() {
                Some(path) if path.exists() => Self::load_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval == 0 {
            anyhow::bail!("heartbeat_interval must be positive");
        }
        if !(0.0..=1.0).contains(&self.restart_penalty) {
            anyhow::bail!("restart_penalty must be within [0, 1]");
        }
        if self.history_window < 2 {
            anyhow::bail!("history_window must be at least 2");
        }
        if self.chains_per_shard == 0 || self.max_automaton_states == 0 {
            anyhow::bail!("chains_per_shard and max_automaton_states must be positive");
        }
        Ok(())
    }
}

/// Get the path of the default config file, if a config directory exists
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_NAME).join(CONFIG_FILE))
}
