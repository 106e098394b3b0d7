// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for regrun.

use crate::errors::ConfigParseError;
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::time::Duration;

/// Overall configuration for regrun.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RegrunConfig {
    /// Configuration for running tests.
    pub runner: RunnerConfig,
}

impl RegrunConfig {
    /// The default location of the config, relative to the current directory.
    pub const CONFIG_PATH: &'static str = "regrun.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from `config_file`, or if not specified from `regrun.toml` in `cwd`.
    ///
    /// If neither exists, the default config is used.
    pub fn from_sources(
        cwd: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = cwd.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        Self::build_and_deserialize(builder).map_err(|err| ConfigParseError::new(config_file, err))
    }

    /// Parses a config from a TOML string layered over the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let builder = Self::make_default_config().add_source(File::from_str(toml, FileFormat::Toml));
        Self::build_and_deserialize(builder)
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: RegrunConfig = builder.build()?.try_deserialize()?;
        config.runner.validate()?;
        Ok(config)
    }
}

/// The `[runner]` section.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    /// The directory test file paths are made relative to.
    pub rootdir: Utf8PathBuf,

    /// The executable that runs workers. Defaults to the current executable.
    #[serde(default)]
    pub runtime: Option<Utf8PathBuf>,

    /// Arguments passed to the runtime before `--pipe-fd`.
    #[serde(default)]
    pub runtime_args: Vec<String>,

    /// Time between SIGTERM and SIGKILL when workers are canceled.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,

    /// How often worker pipes are polled.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How many times a worker that crashes before running any test is restarted.
    pub max_startup_retries: usize,
}

impl RunnerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Message(
                "runner.poll-interval must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            rootdir: Utf8PathBuf::from("."),
            runtime: None,
            runtime_args: Vec::new(),
            grace_period: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            max_startup_retries: 2,
        }
    }
}
