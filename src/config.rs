use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ai::ProviderKind;

const CONFIG_FILE: &str = "config.json";

/// Runtime configuration. Loaded once in `main` and passed down explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub keywords: String,
    pub location: String,
    /// on-site, remote, hybrid
    pub remote_options: Vec<String>,
    /// internship, entry, associate, mid-senior, director, executive
    pub experience_level: Vec<String>,
    /// day, week, month, any
    pub date_posted: String,
    pub max_jobs: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keywords: "software engineer".to_string(),
            location: "Remote".to_string(),
            remote_options: vec!["remote".to_string(), "hybrid".to_string()],
            experience_level: vec!["mid-senior".to_string(), "director".to_string()],
            date_posted: "week".to_string(),
            max_jobs: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    /// Only used by Ollama.
    pub base_url: String,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "llama3".to_string(),
            api_key: None,
            base_url: "http://localhost:11434".to_string(),
            max_tokens: 4096,
            max_retries: 3,
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    /// Configured key, falling back to the provider's usual environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.provider
                    .api_key_env()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// LinkedIn login needs a visible window, so this defaults to false.
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub login_timeout_secs: u64,
    pub page_settle_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            login_timeout_secs: 300,
            page_settle_secs: 3,
        }
    }
}

impl Config {
    pub fn default_data_dir() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobkit") {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from(".jobkit")
        }
    }

    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str::<Config>(&raw)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(self.config_path(), json + "\n")
            .with_context(|| format!("Failed to write config: {}", self.config_path().display()))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.applications_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("jobkit.db")
    }

    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("profile.json")
    }

    pub fn applications_dir(&self) -> PathBuf {
        self.data_dir.join("applications")
    }

    pub fn browser_profile_dir(&self) -> PathBuf {
        self.data_dir.join("browser-profile")
    }

    /// Sets a dotted key such as `llm.model` or `search.remote_options`.
    /// The new value takes the type of the value it replaces; lists are
    /// comma-separated and `none` clears an optional value.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let mut tree = serde_json::to_value(&*self)?;
        let pointer = format!("/{}", key.replace('.', "/"));
        let slot = tree
            .pointer_mut(&pointer)
            .filter(|_| key.contains('.'))
            .ok_or_else(|| anyhow!("Unknown config key '{}'", key))?;

        let replacement = match &*slot {
            Value::Bool(_) => Value::Bool(
                value
                    .parse()
                    .with_context(|| format!("'{}' expects true or false", key))?,
            ),
            Value::Number(_) => Value::Number(
                value
                    .parse::<u64>()
                    .with_context(|| format!("'{}' expects a whole number", key))?
                    .into(),
            ),
            Value::Array(_) => Value::Array(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
            Value::Object(_) => bail!("'{}' is a section, not a value", key),
            Value::Null | Value::String(_) => {
                if value.eq_ignore_ascii_case("none") {
                    Value::Null
                } else {
                    Value::String(value.to_string())
                }
            }
        };
        *slot = replacement;

        let mut updated: Config = serde_json::from_value(tree)
            .with_context(|| format!("Invalid value '{}' for '{}'", value, key))?;
        updated.data_dir = std::mem::take(&mut self.data_dir);
        *self = updated;
        Ok(())
    }
}
