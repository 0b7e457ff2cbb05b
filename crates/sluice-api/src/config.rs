//! Configuration management for the sluice ingestion service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use sluice_core::KeySpec;
use sluice_ingest::{ClientConfig, FanoutConfig, PullSessionConfig};

const CONFIG_FILE: &str = "sluice.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`sluice.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// The pipeline settings have no built-in defaults: every one of them must
/// be provided, and [`Config::load`] rejects a configuration that leaves
/// any of them unset. Only the operational settings (bind address, log
/// filter, invoke timeout) fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Fan-out
    /// Number of parallel worker invocations per trigger.
    ///
    /// Environment variable: `NUM_OF_INSTANCES` (required)
    #[serde(default, alias = "NUM_OF_INSTANCES")]
    pub num_of_instances: u32,
    /// Session deadline in seconds, forwarded to every worker.
    ///
    /// Environment variable: `NUM_OF_SECONDS` (required)
    #[serde(default, alias = "NUM_OF_SECONDS")]
    pub num_of_seconds: u64,
    /// Worker endpoint the fan-out posts to.
    ///
    /// Environment variable: `FUNC_URL` (required)
    #[serde(default, alias = "FUNC_URL")]
    pub func_url: String,
    /// Message cap forwarded to every worker. Zero is a valid cap and makes
    /// worker sessions end immediately.
    ///
    /// Environment variable: `NUM_OF_MESSAGES` (required)
    #[serde(default, alias = "NUM_OF_MESSAGES")]
    pub num_of_messages: Option<u64>,

    // Subscription
    /// Cloud project owning the subscription.
    ///
    /// Environment variable: `PROJECT_ID` (required)
    #[serde(default, alias = "PROJECT_ID")]
    pub project_id: String,
    /// Subscription identifier pull sessions drain.
    ///
    /// Environment variable: `SUB_ID` (required)
    #[serde(default, alias = "SUB_ID")]
    pub sub_id: String,
    /// Ack-extension window in seconds for synchronous sessions.
    ///
    /// Environment variable: `MAX_EXTENSION` (required)
    #[serde(default, alias = "MAX_EXTENSION")]
    pub max_extension: u64,
    /// Cap on unacknowledged messages outstanding at once.
    ///
    /// Environment variable: `MAX_OUTSTANDING_MESSAGES` (required; the
    /// older spelling `MAX_OUTSTANDING_MSGS` is also accepted)
    #[serde(
        default,
        alias = "MAX_OUTSTANDING_MESSAGES",
        alias = "max_outstanding_msgs",
        alias = "MAX_OUTSTANDING_MSGS"
    )]
    pub max_outstanding_messages: usize,
    /// Cap on unacknowledged bytes outstanding at once.
    ///
    /// Environment variable: `MAX_OUTSTANDING_BYTES` (required)
    #[serde(default, alias = "MAX_OUTSTANDING_BYTES")]
    pub max_outstanding_bytes: usize,
    /// Concurrent delivery callbacks the broker may run.
    ///
    /// Environment variable: `PULL_PARALLELISM` (required)
    #[serde(default, alias = "PULL_PARALLELISM")]
    pub pull_parallelism: usize,

    // Storage
    /// Bucket persisted objects are written into.
    ///
    /// Environment variable: `BUCKET_ID` (required)
    #[serde(default, alias = "BUCKET_ID")]
    pub bucket_id: String,
    /// Prefix for persisted object names.
    ///
    /// Environment variable: `MSG_PREFIX` (required)
    #[serde(default, alias = "MSG_PREFIX")]
    pub msg_prefix: String,
    /// File extension for persisted object names.
    ///
    /// Environment variable: `MSG_EXTENSION` (required)
    #[serde(default, alias = "MSG_EXTENSION")]
    pub msg_extension: String,

    // Server
    /// Address the HTTP server binds to.
    ///
    /// Environment variable: `BIND_ADDR`
    #[serde(default = "default_bind_addr", alias = "BIND_ADDR")]
    pub bind_addr: String,
    /// End-to-end timeout for one worker invocation, in seconds.
    ///
    /// Environment variable: `INVOKE_TIMEOUT_SECS`
    #[serde(default = "default_invoke_timeout", alias = "INVOKE_TIMEOUT_SECS")]
    pub invoke_timeout_secs: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment
    /// variable overrides.
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (e.g., `BUCKET_ID`, `BIND_ADDR`)
    /// 2. Configuration file (`sluice.toml`)
    /// 3. Built-in defaults (operational settings only)
    ///
    /// Fails when a pipeline setting is missing or malformed; every
    /// failure names the offending variable.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the fan-out configuration for one invoke trigger.
    pub fn to_fanout_config(&self) -> FanoutConfig {
        FanoutConfig {
            instance_count: self.num_of_instances,
            worker_url: self.func_url.clone(),
            number_of_seconds: self.num_of_seconds,
            number_of_messages: self.num_of_messages.unwrap_or_default().to_string(),
        }
    }

    /// Convert to a bounded-count session configuration. The cap and
    /// deadline come from the worker request, the flow-control settings
    /// from the environment.
    pub fn to_pull_session_config(
        &self,
        max_messages: u64,
        deadline: Duration,
    ) -> PullSessionConfig {
        PullSessionConfig {
            synchronous: true,
            deadline,
            max_messages,
            max_extension: Some(Duration::from_secs(self.max_extension)),
            max_outstanding_messages: self.max_outstanding_messages,
            max_outstanding_bytes: self.max_outstanding_bytes,
            delivery_parallelism: self.pull_parallelism,
        }
    }

    /// Convert to a duration-bounded session configuration.
    pub fn to_streaming_session_config(&self, deadline: Duration) -> PullSessionConfig {
        PullSessionConfig {
            synchronous: false,
            deadline,
            max_messages: 0,
            max_extension: None,
            max_outstanding_messages: self.max_outstanding_messages,
            max_outstanding_bytes: self.max_outstanding_bytes,
            delivery_parallelism: self.pull_parallelism,
        }
    }

    /// Convert to the worker HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: Duration::from_secs(self.invoke_timeout_secs),
            ..ClientConfig::default()
        }
    }

    /// Convert to the object naming scheme.
    pub fn to_key_spec(&self) -> KeySpec {
        KeySpec::new(self.msg_prefix.clone(), self.msg_extension.clone())
    }

    /// Parse the server socket address from the bind configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        SocketAddr::from_str(&self.bind_addr).context("Invalid BIND_ADDR")
    }

    /// Outer HTTP timeout: generous enough for the longest configured
    /// operation, so the timeout layer only catches runaways.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs.max(self.num_of_seconds) + 30)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.num_of_instances == 0 {
            anyhow::bail!("NUM_OF_INSTANCES must be set and greater than 0");
        }

        if self.num_of_seconds == 0 {
            anyhow::bail!("NUM_OF_SECONDS must be set and greater than 0");
        }

        if self.func_url.is_empty() {
            anyhow::bail!("FUNC_URL must be set");
        }

        if self.num_of_messages.is_none() {
            anyhow::bail!("NUM_OF_MESSAGES must be set");
        }

        if self.project_id.is_empty() {
            anyhow::bail!("PROJECT_ID must be set");
        }

        if self.sub_id.is_empty() {
            anyhow::bail!("SUB_ID must be set");
        }

        if self.max_extension == 0 {
            anyhow::bail!("MAX_EXTENSION must be set and greater than 0");
        }

        if self.max_outstanding_messages == 0 {
            anyhow::bail!("MAX_OUTSTANDING_MESSAGES must be set and greater than 0");
        }

        if self.max_outstanding_bytes == 0 {
            anyhow::bail!("MAX_OUTSTANDING_BYTES must be set and greater than 0");
        }

        if self.pull_parallelism == 0 {
            anyhow::bail!("PULL_PARALLELISM must be set and greater than 0");
        }

        if self.bucket_id.is_empty() {
            anyhow::bail!("BUCKET_ID must be set");
        }

        if self.msg_prefix.is_empty() {
            anyhow::bail!("MSG_PREFIX must be set");
        }

        if self.msg_extension.is_empty() {
            anyhow::bail!("MSG_EXTENSION must be set");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_of_instances: 0,
            num_of_seconds: 0,
            func_url: String::new(),
            num_of_messages: None,
            project_id: String::new(),
            sub_id: String::new(),
            max_extension: 0,
            max_outstanding_messages: 0,
            max_outstanding_bytes: 0,
            pull_parallelism: 0,
            bucket_id: String::new(),
            msg_prefix: String::new(),
            msg_extension: String::new(),
            bind_addr: default_bind_addr(),
            invoke_timeout_secs: default_invoke_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_invoke_timeout() -> u64 {
    540
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        touched: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, touched: Vec::new(), originals: HashMap::new() }
        }

        fn remember(&mut self, key: &str) {
            if !self.touched.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.touched.push(key.to_string());
            }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.remember(key);
            env::set_var(key, value);
        }

        fn unset(&mut self, key: &str) {
            self.remember(key);
            env::remove_var(key);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for key in &self.touched {
                match self.originals.get(key) {
                    Some(Some(value)) => env::set_var(key, value),
                    Some(None) => env::remove_var(key),
                    None => {},
                }
            }
        }
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("NUM_OF_INSTANCES", "4"),
        ("NUM_OF_SECONDS", "30"),
        ("FUNC_URL", "https://europe-west1-acme.cloudfunctions.net/drain"),
        ("NUM_OF_MESSAGES", "5"),
        ("PROJECT_ID", "acme-ingest"),
        ("SUB_ID", "raw-events"),
        ("MAX_EXTENSION", "600"),
        ("MAX_OUTSTANDING_MESSAGES", "100"),
        ("MAX_OUTSTANDING_BYTES", "104857600"),
        ("PULL_PARALLELISM", "4"),
        ("BUCKET_ID", "acme-raw"),
        ("MSG_PREFIX", "raw"),
        ("MSG_EXTENSION", "json"),
    ];

    fn apply_required(guard: &mut TestEnvGuard) {
        for (key, value) in REQUIRED {
            guard.set(key, value);
        }
    }

    fn apply_required_except(guard: &mut TestEnvGuard, skip: &str) {
        guard.unset(skip);
        for (key, value) in REQUIRED {
            if *key != skip {
                guard.set(key, value);
            }
        }
    }

    #[test]
    fn default_configuration_is_incomplete() {
        let err = Config::default().validate().err().unwrap();
        assert!(err.to_string().contains("NUM_OF_INSTANCES"));
    }

    #[test]
    fn loads_from_a_complete_environment() {
        let mut guard = TestEnvGuard::new();
        apply_required(&mut guard);

        let config = Config::load().expect("Config should load with full environment");

        assert_eq!(config.num_of_instances, 4);
        assert_eq!(config.num_of_seconds, 30);
        assert_eq!(config.func_url, "https://europe-west1-acme.cloudfunctions.net/drain");
        assert_eq!(config.num_of_messages, Some(5));
        assert_eq!(config.project_id, "acme-ingest");
        assert_eq!(config.sub_id, "raw-events");
        assert_eq!(config.max_outstanding_messages, 100);
        assert_eq!(config.bucket_id, "acme-raw");
        assert_eq!(config.invoke_timeout_secs, 540);
    }

    #[test]
    fn effective_config_snapshot() {
        let mut guard = TestEnvGuard::new();
        apply_required(&mut guard);
        guard.set("BIND_ADDR", "0.0.0.0:8080");
        guard.set("INVOKE_TIMEOUT_SECS", "540");
        guard.set("RUST_LOG", "info");

        let config = Config::load().expect("Config should load");

        insta::assert_debug_snapshot!(config, @r#"
        Config {
            num_of_instances: 4,
            num_of_seconds: 30,
            func_url: "https://europe-west1-acme.cloudfunctions.net/drain",
            num_of_messages: Some(
                5,
            ),
            project_id: "acme-ingest",
            sub_id: "raw-events",
            max_extension: 600,
            max_outstanding_messages: 100,
            max_outstanding_bytes: 104857600,
            pull_parallelism: 4,
            bucket_id: "acme-raw",
            msg_prefix: "raw",
            msg_extension: "json",
            bind_addr: "0.0.0.0:8080",
            invoke_timeout_secs: 540,
            rust_log: "info",
        }
        "#);
    }

    #[test]
    fn zero_message_cap_is_a_valid_setting() {
        let mut guard = TestEnvGuard::new();
        apply_required(&mut guard);
        guard.set("NUM_OF_MESSAGES", "0");

        let config = Config::load().expect("Config should accept a zero cap");
        assert_eq!(config.num_of_messages, Some(0));
    }

    #[test]
    fn missing_bucket_is_named_in_the_error() {
        let mut guard = TestEnvGuard::new();
        apply_required_except(&mut guard, "BUCKET_ID");

        let err = Config::load().err().unwrap();
        assert!(err.to_string().contains("BUCKET_ID"), "unexpected error: {err}");
    }

    #[test]
    fn legacy_outstanding_message_alias_is_accepted() {
        let mut guard = TestEnvGuard::new();
        apply_required_except(&mut guard, "MAX_OUTSTANDING_MESSAGES");
        guard.set("MAX_OUTSTANDING_MSGS", "250");

        let config = Config::load().expect("Config should accept the legacy alias");
        assert_eq!(config.max_outstanding_messages, 250);
    }

    #[test]
    fn malformed_numeric_value_fails_load() {
        let mut guard = TestEnvGuard::new();
        apply_required(&mut guard);
        guard.set("NUM_OF_INSTANCES", "several");

        assert!(Config::load().is_err());
    }

    #[test]
    fn session_conversions_carry_flow_control() {
        let mut guard = TestEnvGuard::new();
        apply_required(&mut guard);

        let config = Config::load().expect("Config should load");

        let session = config.to_pull_session_config(7, Duration::from_secs(20));
        assert!(session.synchronous);
        assert_eq!(session.max_messages, 7);
        assert_eq!(session.deadline, Duration::from_secs(20));
        assert_eq!(session.max_extension, Some(Duration::from_secs(600)));
        assert_eq!(session.max_outstanding_messages, 100);
        assert_eq!(session.max_outstanding_bytes, 104_857_600);
        assert_eq!(session.delivery_parallelism, 4);

        let streaming = config.to_streaming_session_config(Duration::from_secs(15));
        assert!(!streaming.synchronous);
        assert_eq!(streaming.max_extension, None);

        let fanout = config.to_fanout_config();
        assert_eq!(fanout.instance_count, 4);
        assert_eq!(fanout.number_of_messages, "5");
        assert_eq!(fanout.number_of_seconds, 30);

        let keys = config.to_key_spec();
        assert_eq!(keys.prefix, "raw");
        assert_eq!(keys.extension, "json");
    }

    #[test]
    fn server_address_and_timeout_derivation() {
        let mut guard = TestEnvGuard::new();
        apply_required(&mut guard);
        guard.set("BIND_ADDR", "127.0.0.1:9090");

        let config = Config::load().expect("Config should load");

        let addr = config.parse_server_addr().expect("Should parse socket address");
        assert_eq!(addr.port(), 9090);
        assert_eq!(config.request_timeout(), Duration::from_secs(570));
    }
}
