use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::proxy::{ProxyCredentials, ProxyEndpoint, ProxyMode, ProxyStrategy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP endpoint settings
    pub server: ServerConfig,

    /// Outbound proxy settings
    pub proxy: ProxyConfig,

    /// Transcript fetch settings
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,

    /// Allowed CORS origins; "*" allows any
    pub cors_allow_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// How proxy addresses are picked
    pub mode: ProxyMode,

    /// Provider username; without it requests go out directly
    pub username: Option<String>,

    /// Provider password
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Static pool used in `static` mode
    pub pool: Vec<ProxyEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Preferred caption languages, highest priority first
    pub languages: Vec<String>,

    /// Timeout for each individual attempt, in seconds
    pub attempt_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
                cors_allow_origins: vec!["*".to_string()],
            },
            proxy: ProxyConfig::default(),
            fetch: FetchConfig {
                languages: vec![crate::transcript::DEFAULT_LANGUAGE.to_string()],
                attempt_timeout_secs: 20,
            },
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the config file if present, then the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let content = fs_err::read_to_string(&path)
                    .context("Failed to read config file")?;

                let config: Config = serde_yaml::from_str(&content)
                    .context("Failed to parse config file")?;

                tracing::debug!("Loaded config from {}", path.display());
                config
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path().context("Could not determine config directory")?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("transcript-api").join("config.yaml"))
    }

    /// Overlay environment variables; `lookup` is injectable so tests don't touch the process env
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("LISTEN_ADDR") {
            self.server.listen_addr = addr
                .parse()
                .with_context(|| format!("Invalid LISTEN_ADDR: {}", addr))?;
        }
        if let Some(origins) = get("CORS_ALLOW_ORIGINS") {
            self.server.cors_allow_origins = split_list(&origins);
        }
        if let Some(mode) = get("PROXY_MODE") {
            self.proxy.mode = mode.parse()?;
        }
        if let Some(username) = get("PROXY_USERNAME") {
            self.proxy.username = Some(username);
        }
        if let Some(password) = get("PROXY_PASSWORD") {
            self.proxy.password = Some(password);
        }
        if let Some(pool) = get("PROXY_POOL") {
            self.proxy.pool = ProxyEndpoint::parse_list(&pool).context("Invalid PROXY_POOL")?;
        }
        if let Some(languages) = get("TRANSCRIPT_LANGUAGES") {
            self.fetch.languages = split_list(&languages);
        }
        if let Some(timeout) = get("ATTEMPT_TIMEOUT_SECS") {
            self.fetch.attempt_timeout_secs = timeout
                .parse()
                .with_context(|| format!("Invalid ATTEMPT_TIMEOUT_SECS: {}", timeout))?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetch.attempt_timeout_secs == 0 {
            anyhow::bail!("Attempt timeout must be at least one second");
        }

        if self.fetch.languages.is_empty() {
            anyhow::bail!("At least one transcript language must be configured");
        }

        Ok(())
    }

    /// Credentials, when both halves are configured. Only one half counts as none at all.
    pub fn proxy_credentials(&self) -> Option<ProxyCredentials> {
        match (&self.proxy.username, &self.proxy.password) {
            (Some(username), Some(password)) => Some(ProxyCredentials::new(username, password)),
            (None, None) => None,
            (username, _) => {
                tracing::warn!(
                    has_username = username.is_some(),
                    "Proxy username and password must be set together, ignoring partial credentials"
                );
                None
            }
        }
    }

    /// Resolve the proxy strategy once, for the lifetime of the process
    pub fn proxy_strategy(&self) -> ProxyStrategy {
        ProxyStrategy::resolve(
            self.proxy.mode,
            self.proxy_credentials(),
            self.proxy.pool.clone(),
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.attempt_timeout_secs)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Listen Address: {}", self.server.listen_addr);
        println!("  CORS Origins: {}", self.server.cors_allow_origins.join(", "));
        println!("  Proxy Mode: {}", self.proxy_strategy().label());
        if let Some(username) = &self.proxy.username {
            println!("  Proxy Username: {}", username);
            println!("  Proxy Password: ***");
        }
        if !self.proxy.pool.is_empty() {
            println!("  Proxy Pool: {} endpoints", self.proxy.pool.len());
        }
        println!("  Languages: {}", self.fetch.languages.join(", "));
        println!("  Attempt Timeout: {}s", self.fetch.attempt_timeout_secs);
    }
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
