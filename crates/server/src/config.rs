//! Server configuration.
//!
//! Values are layered, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`)
//! 3. `STRATUS__`-prefixed environment variables, `__` separating nested keys
//!    (e.g. `STRATUS__ENTRYPOINT__MAX_EXECUTE_TIMEOUT=60s`)
//! 4. Command-line flags

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use stratus_types::config::{
    BrokerTopologyConfig, BundleConfig, EntrypointConfig, MESSAGE_HEADROOM_BYTES,
    TransactionRetryConfig, ValidationConfig,
};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "STRATUS";

/// Which services a process hosts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Directory and bundle storage only.
    Manager,
    /// `Call`/`Execute` only, resolving lambdas through a remote manager.
    Entrypoint,
    /// Manager, entrypoint and namespace registry in one process.
    #[default]
    All,
}

/// Log output format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable text.
    Text,
    /// One JSON object per line.
    Json,
    /// JSON when stdout is not a terminal, text otherwise.
    #[default]
    Auto,
}

/// Namespace existence checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NamespacesConfig {
    /// Namespaces served by this process's own registry.
    #[serde(default)]
    pub names: Vec<String>,
    /// Remote namespace service. When set, `Create` checks go there instead
    /// of the local registry.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// How long a positive remote answer is reused, in seconds. Default: 30.
    #[serde(default = "default_namespace_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_namespace_cache_ttl_secs() -> u64 {
    30
}

/// gRPC request limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RequestLimitsConfig {
    /// Maximum concurrent requests per connection.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Request timeout in seconds. Raised automatically above the longest
    /// `Execute` wait.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RequestLimitsConfig {
    fn default() -> Self {
        Self { max_concurrent: default_max_concurrent(), timeout_secs: default_timeout_secs() }
    }
}

fn default_max_concurrent() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 50061))
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Address to listen on for gRPC. Default: `0.0.0.0:50061`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Address to expose Prometheus metrics on. Disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
    /// Services hosted by this process.
    #[serde(default)]
    pub role: Role,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Remote manager used by the `entrypoint` role.
    #[serde(default)]
    pub manager_endpoint: Option<String>,
    /// Namespace existence checks.
    #[serde(default)]
    pub namespaces: NamespacesConfig,
    /// gRPC request limits.
    #[serde(default)]
    pub limits: RequestLimitsConfig,
    /// Transaction retry policy.
    #[serde(default)]
    pub transactions: TransactionRetryConfig,
    /// Bundle limits and hash policy.
    #[serde(default)]
    pub bundles: BundleConfig,
    /// Broker exchange names.
    #[serde(default)]
    pub broker: BrokerTopologyConfig,
    /// `Execute` timeouts.
    #[serde(default)]
    pub entrypoint: EntrypointConfig,
    /// Request field limits.
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            metrics_addr: None,
            role: Role::default(),
            log_format: LogFormat::default(),
            manager_endpoint: None,
            namespaces: NamespacesConfig::default(),
            limits: RequestLimitsConfig::default(),
            transactions: TransactionRetryConfig::default(),
            bundles: BundleConfig::default(),
            broker: BrokerTopologyConfig::default(),
            entrypoint: EntrypointConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read or a value
    /// cannot be deserialized.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        // "__" separates nesting so single underscores survive in field names
        // (STRATUS__ENTRYPOINT__MAX_EXECUTE_TIMEOUT → entrypoint.max_execute_timeout).
        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("namespaces.names")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ConfigError::Load { message: e.to_string() })
    }

    /// Checks every section and the cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |e: stratus_types::config::ConfigError| ConfigError::Invalid {
            message: e.to_string(),
        };
        self.transactions.validate().map_err(invalid)?;
        self.bundles.validate().map_err(invalid)?;
        self.broker.validate().map_err(invalid)?;
        self.entrypoint.validate().map_err(invalid)?;
        self.validation.validate().map_err(invalid)?;

        if self.role == Role::Entrypoint && self.manager_endpoint.is_none() {
            return Err(ConfigError::Invalid {
                message: "the entrypoint role requires manager_endpoint".to_string(),
            });
        }
        if self.limits.max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                message: "limits.max_concurrent must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Whether this process hosts the manager.
    pub fn hosts_manager(&self) -> bool {
        matches!(self.role, Role::Manager | Role::All)
    }

    /// Whether this process hosts the entrypoint.
    pub fn hosts_entrypoint(&self) -> bool {
        matches!(self.role, Role::Entrypoint | Role::All)
    }

    /// Per-request timeout, at least a few seconds above the longest `Execute` wait.
    pub fn request_timeout(&self) -> Duration {
        let configured = Duration::from_secs(self.limits.timeout_secs);
        if self.hosts_entrypoint() {
            configured.max(self.entrypoint.max_execute_timeout + Duration::from_secs(5))
        } else {
            configured
        }
    }

    /// Largest gRPC message the server and the manager client accept, sized
    /// for the bundle and payload caps.
    pub fn max_message_bytes(&self) -> usize {
        let payload = self.validation.max_payload_bytes.saturating_add(MESSAGE_HEADROOM_BYTES);
        self.bundles.max_message_bytes().max(payload)
    }

    /// Positive-answer cache lifetime for remote namespace checks.
    pub fn namespace_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.namespaces.cache_ttl_secs)
    }
}

/// Configuration error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// The configuration could not be read or deserialized.
    #[snafu(display("failed to load config: {message}"))]
    Load {
        /// Error description.
        message: String,
    },
    /// A value is out of range or violates a cross-field constraint.
    #[snafu(display("invalid config: {message}"))]
    Invalid {
        /// Error description.
        message: String,
    },
}

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "stratus-server", version, about = "Stratus lambda manager and entrypoint")]
pub struct Cli {
    /// Utility subcommands; the server starts when none is given.
    #[command(subcommand)]
    pub command: Option<CliCommand>,
    /// TOML configuration file.
    #[arg(long, env = "STRATUS_CONFIG")]
    pub config: Option<PathBuf>,
    /// gRPC listen address.
    #[arg(long)]
    pub listen: Option<SocketAddr>,
    /// Services hosted by this process.
    #[arg(long, value_enum)]
    pub role: Option<Role>,
    /// Remote namespace service endpoint.
    #[arg(long)]
    pub namespace_endpoint: Option<String>,
    /// Remote manager endpoint (entrypoint role).
    #[arg(long)]
    pub manager_endpoint: Option<String>,
    /// Namespace served by the local registry. Repeatable.
    #[arg(long = "namespace", value_name = "NAME")]
    pub namespaces: Vec<String>,
    /// Log output format.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
    /// Prometheus exporter address.
    #[arg(long)]
    pub metrics: Option<SocketAddr>,
}

/// Utility subcommands.
#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Configuration helpers.
    Config {
        /// Helper to run.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration helpers.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the JSON schema of the configuration file.
    Schema,
    /// Print the default configuration as JSON.
    Defaults,
}

impl Cli {
    /// Applies command-line overrides on top of `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(endpoint) = &self.namespace_endpoint {
            config.namespaces.endpoint = Some(endpoint.clone());
        }
        if let Some(endpoint) = &self.manager_endpoint {
            config.manager_endpoint = Some(endpoint.clone());
        }
        if !self.namespaces.is_empty() {
            config.namespaces.names.clone_from(&self.namespaces);
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(metrics) = self.metrics {
            config.metrics_addr = Some(metrics);
        }
        config
    }
}

/// JSON schema of [`Config`].
pub fn config_schema() -> String {
    let schema = schemars::schema_for!(Config);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// Default configuration as pretty JSON.
pub fn config_defaults() -> String {
    serde_json::to_string_pretty(&Config::default()).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.role, Role::All);
        assert_eq!(config.listen_addr.port(), 50061);
    }

    #[test]
    fn test_entrypoint_role_requires_manager_endpoint() {
        let config = Config { role: Role::Entrypoint, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let config =
            Config { manager_endpoint: Some("http://manager:50061".to_string()), ..config };
        config.validate().unwrap();
        assert!(config.hosts_entrypoint());
        assert!(!config.hosts_manager());
    }

    #[test]
    fn test_max_message_bytes_covers_bundle_and_payload_caps() {
        let config = Config::default();
        assert!(config.max_message_bytes() > config.bundles.max_bundle_bytes);
        assert!(config.max_message_bytes() > 4 * 1024 * 1024);

        let mut payload_heavy = Config::default();
        payload_heavy.bundles.max_bundle_bytes = 1024;
        payload_heavy.validation.max_payload_bytes = 8 * 1024 * 1024;
        assert!(payload_heavy.max_message_bytes() > 8 * 1024 * 1024);
    }

    #[test]
    fn test_request_timeout_exceeds_execute_cap() {
        let config = Config::default();
        assert!(config.request_timeout() > config.entrypoint.max_execute_timeout);

        let manager_only = Config { role: Role::Manager, ..Config::default() };
        assert_eq!(manager_only.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_toml_file() {
        let dir = std::env::temp_dir().join(format!("stratus-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
role = "manager"
listen_addr = "127.0.0.1:7000"

[namespaces]
names = ["acme", "globex"]

[entrypoint]
default_execute_timeout = "5s"
max_execute_timeout = "1m"

[bundles]
hash_policy = "verify_sha256"
"#
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(config.role, Role::Manager);
        assert_eq!(config.listen_addr.port(), 7000);
        assert_eq!(config.namespaces.names, vec!["acme", "globex"]);
        assert_eq!(config.entrypoint.max_execute_timeout, Duration::from_secs(60));
        assert_eq!(config.bundles.hash_policy, stratus_types::config::HashPolicy::VerifySha256);
        config.validate().unwrap();
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "stratus-server",
            "--role",
            "entrypoint",
            "--manager-endpoint",
            "http://10.0.0.2:50061",
            "--namespace",
            "acme",
            "--namespace",
            "globex",
            "--log-format",
            "json",
        ]);
        let config = cli.apply(Config::default());
        assert_eq!(config.role, Role::Entrypoint);
        assert_eq!(config.manager_endpoint.as_deref(), Some("http://10.0.0.2:50061"));
        assert_eq!(config.namespaces.names, vec!["acme", "globex"]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_schema_lists_sections() {
        let schema = config_schema();
        for section in ["entrypoint", "bundles", "broker", "namespaces"] {
            assert!(schema.contains(section), "schema is missing {section}");
        }
    }
}
