//! Configuration file management for regimen.
//!
//! Provides a TOML-based config file at `~/.config/regimen/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use regimen_core::config::{ProviderConfig, WorkflowConfig};
use regimen_db::config::DbConfig;

pub const ENV_DATABASE_URL: &str = "REGIMEN_DATABASE_URL";
pub const ENV_API_KEY: &str = "REGIMEN_PROVIDER_API_KEY";
pub const ENV_API_BASE: &str = "REGIMEN_PROVIDER_API_BASE";
pub const ENV_MODEL: &str = "REGIMEN_MODEL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::DEFAULT_URL.to_string(),
        }
    }
}

/// Every field is optional; missing ones take the built-in defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScheduleSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_interval_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_duration_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Six-field cron expression (with seconds), UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_cron: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotator_cron: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the regimen config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/regimen` or `~/.config/regimen`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("regimen");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("regimen")
}

/// Return the path to the regimen config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<ConfigFile> {
    toml::from_str(contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix since it may hold an API key.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct RegimenConfig {
    pub db_config: DbConfig,
    pub provider: ProviderConfig,
    pub workflow: WorkflowConfig,
}

impl RegimenConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// A missing config file is fine; a malformed one is an error.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let path = config_path();
        let file = if path.exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };
        Ok(Self::from_parts(cli_db_url, file, |key| std::env::var(key).ok()))
    }

    fn from_parts(
        cli_db_url: Option<&str>,
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let db_url = cli_db_url
            .map(str::to_string)
            .or_else(|| env(ENV_DATABASE_URL))
            .unwrap_or(file.database.url);

        let defaults = ProviderConfig::default();
        let provider = ProviderConfig {
            api_base: env(ENV_API_BASE)
                .or(file.provider.api_base)
                .unwrap_or(defaults.api_base),
            model: env(ENV_MODEL).or(file.provider.model).unwrap_or(defaults.model),
            api_key: env(ENV_API_KEY)
                .or(file.provider.api_key)
                .filter(|k| !k.trim().is_empty()),
            timeout: file
                .provider
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
            temperature: file.provider.temperature.unwrap_or(defaults.temperature),
        };

        let defaults = WorkflowConfig::default();
        let schedule = file.schedule;
        let workflow = WorkflowConfig {
            generation_interval_days: schedule
                .generation_interval_days
                .unwrap_or(defaults.generation_interval_days),
            active_duration_days: schedule
                .active_duration_days
                .unwrap_or(defaults.active_duration_days),
            retry_attempts: schedule.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_delay: schedule
                .retry_delay_secs
                .map_or(defaults.retry_delay, Duration::from_secs),
            max_workers: schedule.max_workers.unwrap_or(defaults.max_workers),
            trigger_schedule: schedule.trigger_cron.unwrap_or(defaults.trigger_schedule),
            rotator_schedule: schedule.rotator_cron.unwrap_or(defaults.rotator_schedule),
        };

        Self {
            db_config: DbConfig::new(db_url),
            provider,
            workflow,
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const SAMPLE: &str = r#"
[database]
url = "postgresql://file:5432/filedb"

[provider]
model = "file/model"
api_key = "file-key"
timeout_secs = 30

[schedule]
retry_attempts = 5
retry_delay_secs = 60
trigger_cron = "0 30 4 * * *"
"#;

    #[test]
    fn empty_file_parses_to_defaults() {
        let file = parse_config("").unwrap();
        let config = RegimenConfig::from_parts(None, file, env_from(&[]));
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.provider.model, ProviderConfig::DEFAULT_MODEL);
        assert!(config.provider.api_key.is_none());
        assert_eq!(config.workflow.retry_attempts, 3);
        assert_eq!(config.workflow.trigger_schedule, "0 0 1 * * *");
    }

    #[test]
    fn file_values_override_defaults() {
        let file = parse_config(SAMPLE).unwrap();
        let config = RegimenConfig::from_parts(None, file, env_from(&[]));
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(config.provider.model, "file/model");
        assert_eq!(config.provider.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.provider.timeout, Duration::from_secs(30));
        assert_eq!(config.provider.api_base, ProviderConfig::DEFAULT_API_BASE);
        assert_eq!(config.workflow.retry_attempts, 5);
        assert_eq!(config.workflow.retry_delay, Duration::from_secs(60));
        assert_eq!(config.workflow.trigger_schedule, "0 30 4 * * *");
        assert_eq!(config.workflow.rotator_schedule, "0 0 2 * * *");
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let env = env_from(&[
            (ENV_DATABASE_URL, "postgresql://env:5432/envdb"),
            (ENV_MODEL, "env/model"),
            (ENV_API_KEY, "env-key"),
        ]);
        let config = RegimenConfig::from_parts(None, parse_config(SAMPLE).unwrap(), &env);
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.provider.model, "env/model");
        assert_eq!(config.provider.api_key.as_deref(), Some("env-key"));

        let config = RegimenConfig::from_parts(
            Some("postgresql://cli:5432/clidb"),
            parse_config(SAMPLE).unwrap(),
            &env,
        );
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let env = env_from(&[(ENV_API_KEY, "  ")]);
        let config = RegimenConfig::from_parts(None, ConfigFile::default(), env);
        assert!(config.provider.api_key.is_none());
    }

    #[test]
    fn default_file_round_trips() {
        let contents = toml::to_string_pretty(&ConfigFile::default()).unwrap();
        assert!(contents.contains("[database]"));
        let loaded = parse_config(&contents).unwrap();
        assert_eq!(loaded.database.url, DbConfig::DEFAULT_URL);
        assert!(loaded.provider.api_key.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_writes_private_file() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = save_config(&ConfigFile::default());
        let path = config_path();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        result.unwrap();
        assert!(path.starts_with(tmp.path()));
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let path = config_path();
        assert!(
            path.ends_with("regimen/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
