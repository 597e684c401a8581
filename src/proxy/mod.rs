use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway used when the rotating-proxy service picks the exit address for us
pub const ROTATING_GATEWAY_HOST: &str = "p.webshare.io";
pub const ROTATING_GATEWAY_PORT: u16 = 80;

/// A single outbound proxy address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` pair
    pub fn parse(input: &str) -> crate::Result<Self> {
        let (host, port) = input
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("Proxy address must be host:port, got {:?}", input))?;

        if host.is_empty() {
            anyhow::bail!("Proxy address has an empty host: {:?}", input);
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("Invalid proxy port in {:?}", input))?;

        Ok(Self::new(host, port))
    }

    /// Parse a comma separated list of `host:port` pairs, skipping blanks
    pub fn parse_list(input: &str) -> crate::Result<Vec<Self>> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Username/password pair for the proxy provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl ProxyCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// How proxy addresses are acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Pick uniformly from a configured pool of addresses
    #[default]
    Static,
    /// Let the provider's gateway rotate the exit address
    Rotating,
}

impl std::str::FromStr for ProxyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" | "pool" => Ok(ProxyMode::Static),
            "rotating" | "rotate" | "managed" => Ok(ProxyMode::Rotating),
            other => anyhow::bail!("Unknown proxy mode: {}", other),
        }
    }
}

/// The proxy chosen for one fetch attempt
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub endpoint: ProxyEndpoint,
    pub credentials: ProxyCredentials,
}

impl ProxyRoute {
    /// Proxy URL without credentials; those are sent as a Basic `Proxy-Authorization` header
    pub fn url(&self) -> String {
        format!("http://{}", self.endpoint)
    }
}

impl fmt::Display for ProxyRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:***@{}", self.credentials.username, self.endpoint)
    }
}

impl fmt::Debug for ProxyRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyRoute({})", self)
    }
}

/// Proxy acquisition strategy, resolved once at startup and shared read-only afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyStrategy {
    /// No credentials configured; connect directly
    Direct,
    StaticPool {
        pool: Vec<ProxyEndpoint>,
        credentials: ProxyCredentials,
    },
    Rotating { credentials: ProxyCredentials },
}

impl ProxyStrategy {
    /// Resolve the strategy from configuration
    pub fn resolve(
        mode: ProxyMode,
        credentials: Option<ProxyCredentials>,
        pool: Vec<ProxyEndpoint>,
    ) -> Self {
        let Some(credentials) = credentials else {
            tracing::warn!("No proxy credentials configured, falling back to direct connections");
            return ProxyStrategy::Direct;
        };

        match mode {
            ProxyMode::Static if !pool.is_empty() => ProxyStrategy::StaticPool { pool, credentials },
            ProxyMode::Static => {
                tracing::warn!("Static proxy mode selected with an empty pool, using rotating gateway");
                ProxyStrategy::Rotating { credentials }
            }
            ProxyMode::Rotating => ProxyStrategy::Rotating { credentials },
        }
    }

    /// Pick the route for one attempt. Each call is independent; the same proxy may come up twice.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ProxyRoute> {
        match self {
            ProxyStrategy::Direct => None,
            ProxyStrategy::StaticPool { pool, credentials } => {
                pool.choose(rng).map(|endpoint| ProxyRoute {
                    endpoint: endpoint.clone(),
                    credentials: credentials.clone(),
                })
            }
            ProxyStrategy::Rotating { credentials } => Some(ProxyRoute {
                endpoint: ProxyEndpoint::new(ROTATING_GATEWAY_HOST, ROTATING_GATEWAY_PORT),
                credentials: ProxyCredentials::new(
                    rotating_username(&credentials.username),
                    credentials.password.clone(),
                ),
            }),
        }
    }

    /// Short label for logs and the health endpoint
    pub fn label(&self) -> &'static str {
        match self {
            ProxyStrategy::Direct => "direct",
            ProxyStrategy::StaticPool { .. } => "static",
            ProxyStrategy::Rotating { .. } => "rotating",
        }
    }
}

fn rotating_username(username: &str) -> String {
    if username.ends_with("-rotate") {
        username.to_string()
    } else {
        format!("{}-rotate", username)
    }
}
