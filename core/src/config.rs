//! Layered settings.
//!
//! Precedence, lowest first: built-in defaults, the config file
//! (`robotflow.toml` in the working directory, or an explicit path), then
//! `ROBOTFLOW_*` environment variables with `__` between nested keys
//! (`ROBOTFLOW_DEBUG__PORT=9400`). A `.env` file is loaded into the
//! environment before any of that.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CONFIG_FILE: &str = "robotflow.toml";
pub const ENV_PREFIX: &str = "ROBOTFLOW";
/// Explicit config path, as set by `--config`
pub const CONFIG_PATH_ENV: &str = "ROBOTFLOW_CONFIG_PATH";

pub const DEFAULT_DEBUG_PORT: u16 = 9339;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where compiled programs are written and run from
    pub build_dir: PathBuf,
    /// Extra directive descriptors merged over the built-in catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_dir: Option<PathBuf>,
    pub debug: DebugConfig,
    pub runtime: RuntimeConfig,
    pub log: LogConfig,
    /// Launch overrides for exposed application variables
    pub variables: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub host: String,
    pub port: u16,
    pub attach_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime executable for debug sessions; defaults to this binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            catalog_dir: None,
            debug: DebugConfig::default(),
            runtime: RuntimeConfig::default(),
            log: LogConfig::default(),
            variables: BTreeMap::new(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_DEBUG_PORT,
            attach_timeout_ms: 10_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl DebugConfig {
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }
}

impl RuntimeConfig {
    /// Configured runtime program, else the running executable.
    pub fn program(&self) -> Result<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe().context("Failed to locate the robotflow executable"),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with the default search.
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// The defaults as TOML, for `init-config`.
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Config::default()).context("Failed to render default config")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    build_dir: Option<PathBuf>,
    skip_dotenv: bool,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Overrides every other source.
    pub fn build_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.build_dir = dir;
        self
    }

    pub fn skip_dotenv(mut self) -> Self {
        self.skip_dotenv = true;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_dotenv {
            // A missing .env is fine.
            let _ = dotenvy::dotenv();
        }

        let explicit = self
            .config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let defaults = ::config::Config::try_from(&Config::default())
            .context("Failed to build default configuration")?;
        let mut builder = ::config::Config::builder().add_source(defaults);
        builder = match &explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                builder.add_source(file_source(path, true))
            }
            None => builder.add_source(file_source(Path::new(CONFIG_FILE), false)),
        };
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        if let Some(dir) = &self.build_dir {
            builder = builder
                .set_override("build_dir", dir.to_string_lossy().to_string())
                .context("Failed to apply build_dir override")?;
        }

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn file_source(path: &Path, required: bool) -> ::config::File<::config::FileSourceFile, ::config::FileFormat> {
    ::config::File::from(path)
        .format(::config::FileFormat::Toml)
        .required(required)
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.debug.host.trim().is_empty() {
            anyhow::bail!("debug.host must not be empty");
        }
        if self.debug.attach_timeout_ms == 0 {
            anyhow::bail!("debug.attach_timeout_ms must be greater than 0");
        }
        if self.log.filter.trim().is_empty() {
            anyhow::bail!("log.filter must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.debug.port, DEFAULT_DEBUG_PORT);
        assert_eq!(config.build_dir, PathBuf::from("build"));
        assert_eq!(config.debug.attach_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_file_layer_over_defaults() {
        let file = write_config(
            r#"
build_dir = "out"

[debug]
port = 9400

[variables]
user = "ada"
limit = 3
"#,
        );
        let config = Config::builder()
            .skip_dotenv()
            .config_path(Some(file.path().to_path_buf()))
            .build()
            .unwrap();
        assert_eq!(config.build_dir, PathBuf::from("out"));
        assert_eq!(config.debug.port, 9400);
        assert_eq!(config.debug.host, "127.0.0.1");
        assert_eq!(config.variables["user"], serde_json::json!("ada"));
        assert_eq!(config.variables["limit"], serde_json::json!(3));
    }

    #[test]
    fn test_build_dir_override_wins() {
        let file = write_config("build_dir = \"out\"\n");
        let config = Config::builder()
            .skip_dotenv()
            .config_path(Some(file.path().to_path_buf()))
            .build_dir(Some(PathBuf::from("elsewhere")))
            .build()
            .unwrap();
        assert_eq!(config.build_dir, PathBuf::from("elsewhere"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::builder()
            .skip_dotenv()
            .config_path(Some(PathBuf::from("/nonexistent/robotflow.toml")))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("[debug]\nattach_timeout_ms = 0\n");
        let result = Config::builder()
            .skip_dotenv()
            .config_path(Some(file.path().to_path_buf()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_toml_parses_back() {
        let text = Config::default_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
