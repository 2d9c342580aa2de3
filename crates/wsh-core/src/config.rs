//! Configuration management
//!
//! Settings are resolved in the following order, later sources winning:
//! 1. Built-in defaults
//! 2. `ws-harness.toml` (or an explicit path)
//! 3. `WSH_*` environment variables
//!
//! Inside the TOML file `${VAR_NAME}` is replaced with the environment value.
//! Command line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ws-harness.toml";

/// Scripted message sequence the probe sends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// One JSON frame and one text frame, sent back to back
    Minimal,
    /// Text, JSON and ping frames with a pause between sends
    #[default]
    Full,
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "full" => Ok(Self::Full),
            other => Err(Error::Config(format!("Unknown scenario: {}", other))),
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimal => f.write_str("minimal"),
            Self::Full => f.write_str("full"),
        }
    }
}

/// Upstream echo server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Interface to bind
    pub host: String,

    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,

    /// Value of the `server` field in every echo
    pub server_tag: String,

    /// Value of the `message` field in the welcome frame
    pub welcome_message: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            server_tag: "BWS WebSocket Proxy Test Server".to_string(),
            welcome_message: "Connected to BWS WebSocket Proxy Test Server".to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Proxy test client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// WebSocket endpoint fronted by the proxy under test
    pub proxy_url: String,

    pub connect_timeout_ms: u64,

    /// How long to wait for the welcome frame after the upgrade
    pub welcome_timeout_ms: u64,

    /// How long to wait for each echo
    pub exchange_timeout_ms: u64,

    /// Pause between sends in the full scenario
    pub message_pause_ms: u64,

    pub scenario: Scenario,

    /// Treat unverified round trips as failures instead of soft passes
    pub strict: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            proxy_url: "ws://localhost:8080/ws".to_string(),
            connect_timeout_ms: 5000,
            welcome_timeout_ms: 5000,
            exchange_timeout_ms: 5000,
            message_pause_ms: 500,
            scenario: Scenario::default(),
            strict: false,
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn welcome_timeout(&self) -> Duration {
        Duration::from_millis(self.welcome_timeout_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }

    pub fn message_pause(&self) -> Duration {
        Duration::from_millis(self.message_pause_ms)
    }
}

/// Orchestrated session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Upper bound on echo server startup
    pub startup_timeout_ms: u64,

    /// Delay between readiness and handing control to the operator
    pub settle_ms: u64,

    /// Keep the echo server running after the report until interrupted
    pub linger: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 5000,
            settle_ms: 1000,
            linger: true,
        }
    }
}

impl SessionConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Main configuration for the harness
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub upstream: UpstreamConfig,
    pub probe: ProbeConfig,
    pub session: SessionConfig,
}

impl HarnessConfig {
    /// Replace `${VAR_NAME}` with the value of the environment variable.
    ///
    /// Unset variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                while let Some(c) = chars.next_if(|&c| c != '}') {
                    var_name.push(c);
                }
                // closing brace
                chars.next();

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse TOML text (after environment expansion)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load a TOML configuration file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Load from an explicit path, `ws-harness.toml` if present, or defaults.
    ///
    /// A `.env` file in the working directory is read first.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            return Self::from_toml_file(path);
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            debug!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Override settings from `WSH_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(host) = env_value("WSH_UPSTREAM_HOST") {
            self.upstream.host = host;
        }
        if let Some(port) = env_parse("WSH_UPSTREAM_PORT")? {
            self.upstream.port = port;
        }
        if let Some(tag) = env_value("WSH_SERVER_TAG") {
            self.upstream.server_tag = tag;
        }
        if let Some(url) = env_value("WSH_PROXY_URL") {
            self.probe.proxy_url = url;
        }
        if let Some(timeout) = env_parse("WSH_EXCHANGE_TIMEOUT_MS")? {
            self.probe.exchange_timeout_ms = timeout;
        }
        if let Some(scenario) = env_parse("WSH_SCENARIO")? {
            self.probe.scenario = scenario;
        }
        if let Some(strict) = env_parse("WSH_STRICT")? {
            self.probe.strict = strict;
        }
        if let Some(linger) = env_parse("WSH_LINGER")? {
            self.session.linger = linger;
        }
        Ok(())
    }

    /// Reject values that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.upstream.host.trim().is_empty() {
            return Err(Error::Config("upstream.host must not be empty".to_string()));
        }
        if self.upstream.server_tag.is_empty() {
            return Err(Error::Config("upstream.server_tag must not be empty".to_string()));
        }

        let url = url::Url::parse(&self.probe.proxy_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "probe.proxy_url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(Error::Config("probe.proxy_url has no host".to_string()));
        }

        for (name, value) in [
            ("probe.connect_timeout_ms", self.probe.connect_timeout_ms),
            ("probe.welcome_timeout_ms", self.probe.welcome_timeout_ms),
            ("probe.exchange_timeout_ms", self.probe.exchange_timeout_ms),
            ("session.startup_timeout_ms", self.session.startup_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        Ok(())
    }
}

/// Non-empty environment value
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_value(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid {}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_upstream_config_default() {
        let config = UpstreamConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.bind_addr(), "127.0.0.1:3001");
        assert_eq!(config.server_tag, "BWS WebSocket Proxy Test Server");
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.proxy_url, "ws://localhost:8080/ws");
        assert_eq!(config.exchange_timeout(), Duration::from_secs(5));
        assert_eq!(config.message_pause(), Duration::from_millis(500));
        assert_eq!(config.scenario, Scenario::Full);
        assert!(!config.strict);
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.settle(), Duration::from_secs(1));
        assert!(config.linger);
    }

    #[test]
    fn test_scenario_from_str() {
        assert_eq!("minimal".parse::<Scenario>().unwrap(), Scenario::Minimal);
        assert_eq!("FULL".parse::<Scenario>().unwrap(), Scenario::Full);
        assert!("burst".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("WSH_CONFIG_TEST_VAR", "9001");
        }

        let result = HarnessConfig::expand_env_vars("port = ${WSH_CONFIG_TEST_VAR}");
        assert_eq!(result, "port = 9001");

        let result = HarnessConfig::expand_env_vars("a${WSH_DEFINITELY_UNSET_VAR}b");
        assert_eq!(result, "ab");

        unsafe {
            std::env::remove_var("WSH_CONFIG_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_plain_dollar() {
        assert_eq!(HarnessConfig::expand_env_vars("cost $5"), "cost $5");
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
[upstream]
host = "0.0.0.0"
port = 4001
server_tag = "lab upstream"

[probe]
proxy_url = "ws://proxy.local:9000/socket"
exchange_timeout_ms = 2500
scenario = "minimal"
strict = true

[session]
settle_ms = 0
linger = false
"#;

        let config = HarnessConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.upstream.bind_addr(), "0.0.0.0:4001");
        assert_eq!(config.upstream.server_tag, "lab upstream");
        // Unspecified keys keep their defaults
        assert_eq!(
            config.upstream.welcome_message,
            "Connected to BWS WebSocket Proxy Test Server"
        );
        assert_eq!(config.probe.proxy_url, "ws://proxy.local:9000/socket");
        assert_eq!(config.probe.exchange_timeout_ms, 2500);
        assert_eq!(config.probe.welcome_timeout_ms, 5000);
        assert_eq!(config.probe.scenario, Scenario::Minimal);
        assert!(config.probe.strict);
        assert!(!config.session.linger);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        let result = HarnessConfig::from_toml_str("[probe]\nproxy = \"ws://x\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[upstream]\nport = 0").unwrap();

        let config = HarnessConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.upstream.port, 0);
    }

    #[test]
    fn test_from_missing_file() {
        let result = HarnessConfig::from_toml_file("/nonexistent/ws-harness.toml");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_http_url() {
        let mut config = HarnessConfig::default();
        config.probe.proxy_url = "http://localhost:8080/ws".to_string();
        assert!(config.validate().is_err());

        config.probe.proxy_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(Error::Url(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = HarnessConfig::default();
        config.probe.exchange_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("probe.exchange_timeout_ms"));
    }

    #[test]
    fn test_env_parse_invalid_value() {
        unsafe {
            std::env::set_var("WSH_CONFIG_TEST_BAD_PORT", "not-a-port");
        }
        let result: Result<Option<u16>> = env_parse("WSH_CONFIG_TEST_BAD_PORT");
        assert!(matches!(result, Err(Error::Config(_))));
        unsafe {
            std::env::remove_var("WSH_CONFIG_TEST_BAD_PORT");
        }
    }
}
