use std::net::SocketAddr;

use codegrant_auth::ClientConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub protection: ProtectionConfig,
    /// OAuth client settings for the single configured scheme.
    pub oauth: ClientConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if !self.server.login_path.starts_with('/') {
            return Err("server.login_path must start with '/'".into());
        }
        if self.server.login_path == self.oauth.callback_path() {
            return Err("server.login_path must differ from oauth.callback_path".into());
        }
        if self.protection.purpose.is_empty() {
            return Err("protection.purpose cannot be empty".into());
        }
        self.oauth.validate().map_err(|e| format!("oauth: {e}"))?;
        Ok(())
    }

    pub fn addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("invalid server address: {e}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path that starts a sign-in.
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_login_path() -> String {
    "/login".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            login_path: default_login_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// State protection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionConfig {
    /// 32-byte AES key, hex or base64 encoded.
    ///
    /// When unset an ephemeral key is generated, so outstanding sign-ins do
    /// not survive a restart. Prefer CODEGRANT__PROTECTION__KEY over the file.
    #[serde(default)]
    pub key: Option<String>,
    /// Purpose string the state is bound to.
    #[serde(default = "default_purpose")]
    pub purpose: String,
}

fn default_purpose() -> String {
    "codegrant.state".into()
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            key: None,
            purpose: default_purpose(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("codegrant.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., CODEGRANT__OAUTH__CLIENT_SECRET=...
        builder = builder.add_source(
            Environment::with_prefix("CODEGRANT")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
