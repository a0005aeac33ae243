// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for testcov listeners.
//!
//! Configuration is resolved in this order, highest priority first:
//!
//! 1. `TESTCOV_*` environment variables.
//! 2. A user-provided `testcov.toml`.
//! 3. The defaults embedded in this crate (`default-config.toml`).

use crate::errors::ConfigError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::{collections::BTreeSet, io, time::Duration};
use testcov_metadata::RunLayout;
use tracing::{debug, warn};

/// Environment variable naming the config file to load.
///
/// The special value `none` skips loading a config file.
pub const TESTCOV_CONFIG_ENV: &str = "TESTCOV_CONFIG";

/// Environment variable overriding `store.run-id`.
pub const TESTCOV_RUN_ID_ENV: &str = "TESTCOV_RUN_ID";

/// Environment variable overriding `store.base-dir`.
pub const TESTCOV_BASE_DIR_ENV: &str = "TESTCOV_BASE_DIR";

/// Environment variable overriding `agent.address`.
pub const TESTCOV_AGENT_ADDRESS_ENV: &str = "TESTCOV_AGENT_ADDRESS";

/// Environment variable overriding `agent.port`.
pub const TESTCOV_AGENT_PORT_ENV: &str = "TESTCOV_AGENT_PORT";

/// The config file looked up in the working directory by default.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "testcov.toml";

/// Special value for [`TESTCOV_CONFIG_ENV`] that skips loading a config file.
pub const CONFIG_NONE: &str = "none";

/// Specifies where to load configuration from.
#[derive(Clone, Copy, Debug)]
pub enum ConfigLocation<'a> {
    /// Load `testcov.toml` from the working directory if it exists.
    Default,

    /// Skip the config file, using only built-in defaults.
    Isolated,

    /// Load configuration from an explicit path.
    ///
    /// Returns an error if the file does not exist.
    Explicit(&'a Utf8Path),
}

impl<'a> ConfigLocation<'a> {
    /// Creates a config location from the value of [`TESTCOV_CONFIG_ENV`].
    pub fn from_env_value(value: Option<&'a str>) -> Self {
        match value {
            None => Self::Default,
            Some(CONFIG_NONE) => Self::Isolated,
            Some(path) => Self::Explicit(Utf8Path::new(path)),
        }
    }
}

/// Resolved configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestcovConfig {
    /// Where results and snapshots are stored.
    pub store: StoreConfig,

    /// How to reach the coverage agent.
    pub agent: AgentConfig,

    /// Log file settings.
    pub log: LogConfig,
}

/// The `[store]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// The base directory for all artifacts.
    pub base_dir: Utf8PathBuf,

    /// The run or revision identifier.
    pub run_id: String,
}

/// The `[agent]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    /// The backend used to capture coverage.
    pub backend: CoverageBackend,

    /// The host name or IP address of the agent.
    pub address: String,

    /// The TCP port of the agent.
    pub port: u16,

    /// Upper bound for one full dump-and-reset exchange.
    pub timeout: Duration,

    /// The extension of snapshot files.
    pub extension: String,
}

/// The `[log]` section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether to write a log file under the base directory.
    pub enabled: bool,

    /// The maximum level written.
    pub level: LogLevel,
}

/// Which coverage agent backend to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageBackend {
    /// The JaCoCo TCP remote-control protocol.
    Jacoco,

    /// Do not capture coverage; only record results.
    None,
}

/// The maximum level written to the log file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages.
    Info,
    /// Per-event diagnostics.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    /// Converts this to a `tracing` level.
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }
}

impl TestcovConfig {
    /// Loads configuration using [`TESTCOV_CONFIG_ENV`] and the other `TESTCOV_*` variables from
    /// the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_env = std::env::var(TESTCOV_CONFIG_ENV).ok();
        let location = ConfigLocation::from_env_value(config_env.as_deref());
        Self::load(location, |var| std::env::var(var).ok())
    }

    /// Loads configuration from `location`, then applies overrides looked up through `env`.
    pub fn load(
        location: ConfigLocation<'_>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let user_config = match location {
            ConfigLocation::Isolated => {
                debug!("testcov config: skipping config file (isolated)");
                None
            }
            ConfigLocation::Explicit(path) => match DeserializedConfig::from_path(path)? {
                Some(config) => Some(config),
                None => {
                    return Err(ConfigError::FileNotFound {
                        path: path.to_owned(),
                    });
                }
            },
            ConfigLocation::Default => {
                DeserializedConfig::from_path(Utf8Path::new(DEFAULT_CONFIG_FILE_NAME))?
            }
        };

        let mut config = Self::resolve(DefaultConfig::from_embedded(), user_config);
        config.apply_env_overrides(env)?;
        Ok(config)
    }

    /// Returns the on-disk layout for this configuration.
    pub fn layout(&self) -> RunLayout {
        RunLayout::new(self.store.base_dir.clone(), &self.store.run_id)
    }

    /// Returns the agent address in `host:port` form.
    pub fn agent_address(&self) -> String {
        format!("{}:{}", self.agent.address, self.agent.port)
    }

    fn resolve(defaults: DefaultConfig, user: Option<DeserializedConfig>) -> Self {
        let user = user.unwrap_or_default();
        Self {
            store: StoreConfig {
                base_dir: user.store.base_dir.unwrap_or(defaults.store.base_dir),
                run_id: user.store.run_id.unwrap_or(defaults.store.run_id),
            },
            agent: AgentConfig {
                backend: user.agent.backend.unwrap_or(defaults.agent.backend),
                address: user.agent.address.unwrap_or(defaults.agent.address),
                port: user.agent.port.unwrap_or(defaults.agent.port),
                timeout: user.agent.timeout.unwrap_or(defaults.agent.timeout),
                extension: user.agent.extension.unwrap_or(defaults.agent.extension),
            },
            log: LogConfig {
                enabled: user.log.enabled.unwrap_or(defaults.log.enabled),
                level: user.log.level.unwrap_or(defaults.log.level),
            },
        }
    }

    fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(run_id) = env(TESTCOV_RUN_ID_ENV) {
            debug!("testcov config: run ID `{run_id}` from {TESTCOV_RUN_ID_ENV}");
            self.store.run_id = run_id;
        }
        if let Some(base_dir) = env(TESTCOV_BASE_DIR_ENV) {
            self.store.base_dir = base_dir.into();
        }
        if let Some(address) = env(TESTCOV_AGENT_ADDRESS_ENV) {
            self.agent.address = address;
        }
        if let Some(port) = env(TESTCOV_AGENT_PORT_ENV) {
            self.agent.port = port.parse().map_err(|error| ConfigError::InvalidEnv {
                var: TESTCOV_AGENT_PORT_ENV,
                value: port.clone(),
                reason: format!("{error}"),
            })?;
        }
        Ok(())
    }
}

/// User config file contents. Every setting is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    store: DeserializedStoreConfig,
    #[serde(default)]
    agent: DeserializedAgentConfig,
    #[serde(default)]
    log: DeserializedLogConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedStoreConfig {
    #[serde(default)]
    base_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    run_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedAgentConfig {
    #[serde(default)]
    backend: Option<CoverageBackend>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    extension: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedLogConfig {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    level: Option<LogLevel>,
}

impl DeserializedConfig {
    /// Returns `Ok(None)` if the file does not exist.
    fn from_path(path: &Utf8Path) -> Result<Option<Self>, ConfigError> {
        debug!("testcov config: attempting to load from {path}");
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("testcov config: file does not exist at {path}");
                return Ok(None);
            }
            Err(error) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    error,
                });
            }
        };

        let (config, unknown) =
            Self::deserialize_toml(&contents).map_err(|error| ConfigError::Parse {
                path: path.to_owned(),
                error,
            })?;
        if !unknown.is_empty() {
            warn!(
                "in testcov config file {path}, ignoring unknown configuration keys: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        debug!("testcov config: loaded successfully from {path}");
        Ok(Some(config))
    }

    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config: DeserializedConfig = serde_ignored::deserialize(deserializer, |path| {
            unknown.insert(path.to_string());
        })?;
        Ok((config, unknown))
    }
}

/// The embedded defaults. Every setting is required.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultConfig {
    store: DefaultStoreConfig,
    agent: DefaultAgentConfig,
    log: DefaultLogConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultStoreConfig {
    base_dir: Utf8PathBuf,
    run_id: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultAgentConfig {
    backend: CoverageBackend,
    address: String,
    port: u16,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    extension: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultLogConfig {
    enabled: bool,
    level: LogLevel,
}

impl DefaultConfig {
    const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Parses the embedded defaults.
    ///
    /// Panics if the embedded TOML is invalid or contains unknown keys.
    fn from_embedded() -> Self {
        let deserializer = toml::Deserializer::parse(Self::DEFAULT_CONFIG)
            .expect("embedded default config should parse");
        let mut unknown = BTreeSet::new();
        let config: DefaultConfig =
            serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("embedded default config should be valid");

        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
        config
    }
}
