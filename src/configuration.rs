use crate::domain::validate_key_value;
use crate::pipeline::PipelineOptions;
use crate::store::{HttpTableClient, MAX_BATCH_SIZE, StoreError};
use reqwest::Url;
use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub store: StoreSettings,
    pub purge: PurgeSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

/// Connection identity and target table.
#[derive(Deserialize, Clone, Debug)]
pub struct StoreSettings {
    pub base_url: String,
    pub account_name: String,
    pub access_key: Secret<String>,
    pub table_name: String,
    pub timeout_milliseconds: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PurgeSettings {
    pub sentinel_row_key: String,
    pub retention_days: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelemetrySettings {
    pub name: String,
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            name: "tablepurge".into(),
            level: "info".into(),
        }
    }
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_max_parallelism() -> usize {
    16
}

fn default_queue_capacity() -> usize {
    100
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to load configuration")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn client(&self) -> Result<HttpTableClient, StoreError> {
        let base_url = Url::parse(&self.base_url)?;
        HttpTableClient::new(
            base_url,
            self.account_name.clone(),
            self.access_key.clone(),
            self.timeout(),
        )
    }
}

impl From<&PurgeSettings> for PipelineOptions {
    fn from(settings: &PurgeSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            max_parallelism: settings.max_parallelism,
            queue_capacity: settings.queue_capacity,
            dry_run: settings.dry_run,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |message: String| Err(ConfigurationError::Invalid(message));

        if let Err(e) = Url::parse(&self.store.base_url) {
            return invalid(format!("store.base_url is not a valid URL: {e}"));
        }
        if !is_valid_table_name(&self.store.table_name) {
            return invalid(format!(
                "store.table_name '{}' must be 3 to 63 alphanumeric characters starting with a letter",
                self.store.table_name
            ));
        }
        if let Err(e) = validate_key_value(&self.purge.sentinel_row_key) {
            return invalid(format!("purge.sentinel_row_key: {e}"));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.purge.batch_size) {
            return invalid(format!(
                "purge.batch_size must be between 1 and {MAX_BATCH_SIZE}"
            ));
        }
        if self.purge.max_parallelism == 0 {
            return invalid("purge.max_parallelism must be at least 1".into());
        }
        if self.purge.queue_capacity == 0 {
            return invalid("purge.queue_capacity must be at least 1".into());
        }
        Ok(())
    }
}

fn is_valid_table_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// The environment the purge job runs in.
#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local` or `production`."
            )),
        }
    }
}

/// Reads `configuration/base.yaml`, the file for `APP_ENVIRONMENT` (default
/// `local`) and `APP_`-prefixed environment variables, in that order.
pub fn get_configuration() -> Result<Settings, ConfigurationError> {
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(ConfigurationError::Invalid)?;
    let environment_file = format!("configuration/{}.yaml", environment.as_str());

    let builder = config::Config::builder()
        .add_source(config::File::new(
            "configuration/base.yaml",
            config::FileFormat::Yaml,
        ))
        .add_source(
            config::File::new(&environment_file, config::FileFormat::Yaml).required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    load(builder)
}

/// Parses settings from a YAML document.
pub fn parse_configuration(yaml: &str) -> Result<Settings, ConfigurationError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(yaml, config::FileFormat::Yaml));
    load(builder)
}

fn load(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<Settings, ConfigurationError> {
    let settings = builder.build()?.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}
