use crate::engine::{Formula, ScoreSource};
use crate::spectrum::DEFAULT_EXCLUDED_FAILURE_PREFIX;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// How the instrumented test runtime is launched
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// How results are classified and ranked
    #[serde(default)]
    pub localization: LocalizationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Launch settings for the child test runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime executable. Falls back to `$JAVA_HOME/bin/java`, then `java`.
    #[serde(default)]
    pub java_executable: Option<PathBuf>,

    /// Instrumentation agent bundle attached with `-javaagent:`
    #[serde(default)]
    pub agent_path: Option<PathBuf>,

    /// Fully-qualified entry point the child runs
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Classpath entries the runner itself needs (placed first)
    #[serde(default)]
    pub extra_classpath: Vec<PathBuf>,

    /// Environment variable set to "true" in the child
    #[serde(default = "default_mode_env_var")]
    pub mode_env_var: String,

    /// How long to wait for the child before killing it
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Copy the child's output to our stderr while draining it
    #[serde(default)]
    pub mirror_output: bool,

    /// How much of the child's output tail to keep for failure reports
    #[serde(default = "default_max_captured_output_bytes")]
    pub max_captured_output_bytes: usize,
}

/// Classification and ranking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Default threshold for suspicious-location queries
    #[serde(default)]
    pub threshold: f64,

    /// Use the runtime's scores or compute them from per-test coverage
    #[serde(default)]
    pub score_source: ScoreSource,

    /// Formula used when `score_source = "formula"`
    #[serde(default)]
    pub formula: Formula,

    /// Failing tests with these name prefixes are dropped
    #[serde(default = "default_excluded_failure_prefixes")]
    pub excluded_failure_prefixes: Vec<String>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_entry_point() -> String {
    "com.gzoltar.core.instr.Runner".to_string()
}

fn default_mode_env_var() -> String {
    "FAULT_LOCALIZATION".to_string()
}

fn default_timeout_seconds() -> u64 {
    600 // 10 minutes
}

fn default_max_captured_output_bytes() -> usize {
    10_000
}

fn default_excluded_failure_prefixes() -> Vec<String> {
    vec![DEFAULT_EXCLUDED_FAILURE_PREFIX.to_string()]
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            java_executable: None,
            agent_path: None,
            entry_point: default_entry_point(),
            extra_classpath: Vec::new(),
            mode_env_var: default_mode_env_var(),
            timeout_seconds: default_timeout_seconds(),
            mirror_output: false,
            max_captured_output_bytes: default_max_captured_output_bytes(),
        }
    }
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            score_source: ScoreSource::default(),
            formula: Formula::default(),
            excluded_failure_prefixes: default_excluded_failure_prefixes(),
        }
    }
}

impl RuntimeConfig {
    /// Resolve the runtime executable, adding `.exe` on Windows.
    pub fn resolve_java_executable(&self) -> PathBuf {
        let java_home = std::env::var_os("JAVA_HOME").map(PathBuf::from);
        resolve_java(self.java_executable.as_deref(), java_home.as_deref())
    }
}

fn resolve_java(configured: Option<&Path>, java_home: Option<&Path>) -> PathBuf {
    let mut path = match (configured, java_home) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(home)) => home.join("bin").join("java"),
        (None, None) => PathBuf::from("java"),
    };
    if cfg!(windows) && path.extension().is_none() {
        path.set_extension("exe");
    }
    path
}

impl Config {
    /// Load configuration from file, or create default if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
            .context("No config path available")?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "faultline", "faultline")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
