use crate::error::{Error, Result};
use crate::registry;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct AuthConfig {
    /// Where the access token is kept. Defaults to `~/.neptune/token`.
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

/// Per-user state directory: `$HOME/.neptune`.
pub fn neptune_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".neptune")
}

// Defaults
fn default_base_url() -> String {
    std::env::var("NEPTUNE_API_URL").unwrap_or_else(|_| "http://localhost:8000".into())
}
fn default_timeout_secs() -> u64 {
    180
}
fn default_user_agent() -> String {
    concat!("neptune-chat/", env!("CARGO_PKG_VERSION")).into()
}
fn default_model() -> String {
    "gpt2_native".into()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        let url = &self.server.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::config(format!(
                "server.base_url must be an http(s) URL, got {url:?}. Set it in config.toml or export NEPTUNE_API_URL"
            )));
        }
        if self.server.timeout_secs == 0 {
            return Err(Error::config("server.timeout_secs must be positive"));
        }
        registry::resolve(&self.chat.default_model)
            .map_err(|e| Error::config(format!("chat.default_model: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml = r#"
[server]
base_url = "https://chat.example.com"
timeout_secs = 30
user_agent = "test-agent"

[chat]
default_model = "BonQuiQui"

[auth]
token_path = "/tmp/neptune-token"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.base_url, "https://chat.example.com");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.server.user_agent, "test-agent");
        assert_eq!(config.chat.default_model, "BonQuiQui");
        assert_eq!(
            config.auth.token_path.as_deref(),
            Some(Path::new("/tmp/neptune-token"))
        );
        config.validate().unwrap();
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let toml = r#"
[server]
base_url = "http://localhost:9000"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.timeout_secs, 180);
        assert!(config.server.user_agent.starts_with("neptune-chat/"));
        assert_eq!(config.chat.default_model, "gpt2_native");
        assert!(config.auth.token_path.is_none());
    }

    #[test]
    fn empty_config_is_valid_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.timeout_secs, 180);
    }

    #[test]
    fn validate_rejects_unknown_model() {
        let mut config = Config::default();
        config.server.base_url = "http://localhost:8000".into();
        config.chat.default_model = "gpt5".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = Config::default();
        config.server.base_url = "localhost:8000".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
