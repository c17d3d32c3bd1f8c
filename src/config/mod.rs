pub mod toml_config;

use crate::adapters::upstream::DEFAULT_CONTENTS_ENDPOINT;
use crate::core::ConfigProvider;
use crate::domain::model::{Credential, CredentialMode, UpstreamSchema};
use crate::utils::error::{EnhanceError, Result};
use crate::utils::logger::LogFormat;
use crate::utils::validation::{
    validate_non_empty_secret, validate_positive_number, validate_range, validate_required_field,
    validate_url, Validate,
};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::time::Duration;
use toml_config::FileConfig;

pub const DEFAULT_LISTEN_PORT: u16 = 5000;
pub const DEFAULT_WINDOW_SECONDS: u64 = 3600;
pub const DEFAULT_MAX_REQUESTS: u32 = 20;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 20;

const MAX_WINDOW_SECONDS: u64 = 30 * 24 * 3600;
const MAX_UPSTREAM_TIMEOUT_SECONDS: u64 = 120;

#[derive(Debug, Clone, Parser)]
#[command(name = "text-enhancer")]
#[command(about = "Rate-limited text enhancement API backed by a generative-text model")]
pub struct ServerConfig {
    #[arg(long = "port", env = "PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    pub listen_port: u16,

    /// Use the first X-Forwarded-For hop as the client address
    #[arg(long, env = "TRUST_PROXY", value_parser = clap::builder::BoolishValueParser::new())]
    pub trust_proxy: bool,

    #[arg(long = "window-seconds", env = "RATE_LIMIT_WINDOW_SECONDS", default_value_t = DEFAULT_WINDOW_SECONDS)]
    pub window_duration_seconds: u64,

    #[arg(long = "max-requests", env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = DEFAULT_MAX_REQUESTS)]
    pub max_requests_per_window: u32,

    #[arg(long, env = "UPSTREAM_ENDPOINT", default_value = DEFAULT_CONTENTS_ENDPOINT)]
    pub upstream_endpoint: String,

    /// Upstream envelope version: contents or prompt
    #[arg(long, env = "UPSTREAM_SCHEMA", default_value = "contents")]
    pub upstream_schema: UpstreamSchema,

    #[arg(long, env = "UPSTREAM_TIMEOUT_SECONDS", default_value_t = DEFAULT_UPSTREAM_TIMEOUT_SECONDS)]
    pub upstream_timeout_seconds: u64,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<Credential>,

    /// server: one key held by this process; caller: each request sends its own apiKey
    #[arg(long, env = "CREDENTIAL_MODE", default_value = "server")]
    pub credential_mode: CredentialMode,

    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Path to an optional TOML config file
    #[arg(long, env = "ENHANCE_CONFIG")]
    pub config: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl ServerConfig {
    /// Parses the process arguments and environment, exiting on `--help` or bad flags.
    pub fn load() -> Result<Self> {
        let matches = Self::command().get_matches();
        Self::from_matches(&matches)
    }

    pub fn try_load_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command()
            .try_get_matches_from(args)
            .map_err(|e| EnhanceError::ConfigError {
                message: e.to_string(),
            })?;
        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let mut config = Self::from_arg_matches(matches).map_err(|e| EnhanceError::ConfigError {
            message: e.to_string(),
        })?;

        if let Some(path) = config.config.clone() {
            let file = FileConfig::from_file(&path)?;
            config.merge_file(file, |id| {
                matches!(
                    matches.value_source(id),
                    Some(ValueSource::CommandLine) | Some(ValueSource::EnvVariable)
                )
            });
        }

        Ok(config)
    }

    /// Applies file values to every option that was not set by flag or environment.
    pub fn merge_file(&mut self, file: FileConfig, explicitly_set: impl Fn(&str) -> bool) {
        let take = |id: &str| !explicitly_set(id);

        if let Some(server) = file.server {
            if let Some(port) = server.listen_port.filter(|_| take("listen_port")) {
                self.listen_port = port;
            }
            if let Some(trust) = server.trust_proxy.filter(|_| take("trust_proxy")) {
                self.trust_proxy = trust;
            }
        }

        if let Some(rate_limit) = file.rate_limit {
            if let Some(window) = rate_limit
                .window_duration_seconds
                .filter(|_| take("window_duration_seconds"))
            {
                self.window_duration_seconds = window;
            }
            if let Some(max) = rate_limit
                .max_requests_per_window
                .filter(|_| take("max_requests_per_window"))
            {
                self.max_requests_per_window = max;
            }
        }

        if let Some(upstream) = file.upstream {
            if let Some(endpoint) = upstream.endpoint.filter(|_| take("upstream_endpoint")) {
                self.upstream_endpoint = endpoint;
            }
            if let Some(schema) = upstream.schema.filter(|_| take("upstream_schema")) {
                self.upstream_schema = schema;
            }
            if let Some(timeout) = upstream
                .timeout_seconds
                .filter(|_| take("upstream_timeout_seconds"))
            {
                self.upstream_timeout_seconds = timeout;
            }
            if let Some(key) = upstream.api_key.filter(|_| take("api_key")) {
                self.api_key = Some(key);
            }
            if let Some(mode) = upstream.credential_mode.filter(|_| take("credential_mode")) {
                self.credential_mode = mode;
            }
        }

        if let Some(format) = file
            .logging
            .and_then(|logging| logging.format)
            .filter(|_| take("log_format"))
        {
            self.log_format = format;
        }
    }
}

impl ConfigProvider for ServerConfig {
    fn upstream_endpoint(&self) -> &str {
        &self.upstream_endpoint
    }

    fn upstream_schema(&self) -> UpstreamSchema {
        self.upstream_schema
    }

    fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_seconds)
    }

    fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_duration_seconds)
    }

    fn max_requests_per_window(&self) -> u32 {
        self.max_requests_per_window
    }

    fn credential_mode(&self) -> CredentialMode {
        self.credential_mode
    }

    fn server_credential(&self) -> Option<&Credential> {
        self.api_key.as_ref()
    }

    fn trust_proxy(&self) -> bool {
        self.trust_proxy
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<()> {
        validate_url("upstream_endpoint", &self.upstream_endpoint)?;
        validate_range(
            "window_duration_seconds",
            self.window_duration_seconds,
            1,
            MAX_WINDOW_SECONDS,
        )?;
        validate_positive_number(
            "max_requests_per_window",
            u64::from(self.max_requests_per_window),
            1,
        )?;
        validate_range(
            "upstream_timeout_seconds",
            self.upstream_timeout_seconds,
            1,
            MAX_UPSTREAM_TIMEOUT_SECONDS,
        )?;

        if self.credential_mode == CredentialMode::Server {
            let key = validate_required_field("api_key", &self.api_key)?;
            validate_non_empty_secret("api_key", key.expose())?;
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}
