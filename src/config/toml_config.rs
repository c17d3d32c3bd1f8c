use crate::domain::model::{Credential, CredentialMode, UpstreamSchema};
use crate::utils::error::{EnhanceError, Result};
use crate::utils::logger::LogFormat;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// Optional TOML config file. Every key may be omitted; flags and environment
/// variables take precedence over anything set here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerSection>,
    pub rate_limit: Option<RateLimitSection>,
    pub upstream: Option<UpstreamSection>,
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub listen_port: Option<u16>,
    pub trust_proxy: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitSection {
    pub window_duration_seconds: Option<u64>,
    pub max_requests_per_window: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamSection {
    pub endpoint: Option<String>,
    pub schema: Option<UpstreamSchema>,
    pub timeout_seconds: Option<u64>,
    pub api_key: Option<Credential>,
    pub credential_mode: Option<CredentialMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    pub format: Option<LogFormat>,
}

impl FileConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EnhanceError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GEMINI_API_KEY})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EnhanceError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}
