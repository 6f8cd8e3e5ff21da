//! Configuration types and loading
//!
//! Precedence: CLI args > env vars > config file > defaults. Client and
//! session secrets come from env vars or secret files, never from the TOML
//! itself.

use azure_auth::{AuthorityConfig, DEFAULT_AUTHORITY_HOST, DEFAULT_RESOURCE_URL, DEFAULT_SCOPE};
use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Shortest accepted session secret, in bytes.
const MIN_SESSION_SECRET_LEN: usize = 16;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub test_mode: TestModeConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Timeout for calls to the token endpoint and the resource API
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Identity provider registration
#[derive(Debug, Deserialize)]
pub struct AzureConfig {
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_resource_url")]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(skip)]
    pub secret: Option<Secret<String>>,
    #[serde(default)]
    pub secret_file: Option<PathBuf>,
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
}

/// Offline switches. `TEST_MODE=1` turns both on.
#[derive(Debug, Default, Deserialize)]
pub struct TestModeConfig {
    #[serde(default)]
    pub mock_token_exchange: bool,
    #[serde(default)]
    pub mock_resource: bool,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    256
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/azureResponse".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.to_string()]
}

fn default_resource_url() -> String {
    DEFAULT_RESOURCE_URL.to_string()
}

fn default_state_ttl() -> u64 {
    600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            authority_host: default_authority_host(),
            tenant_id: String::new(),
            client_id: String::new(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            client_secret: None,
            client_secret_file: None,
            post_logout_redirect_uri: None,
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            url: default_resource_url(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_file: None,
            state_ttl_secs: default_state_ttl(),
        }
    }
}

impl Config {
    /// Load a TOML file, then overlay environment variables and validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse TOML text (possibly empty), overlay env vars, validate.
    ///
    /// Env vars: `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`,
    /// `SESSION_SECRET`, `PORT`, `TEST_MODE`.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(tenant) = std::env::var("AZURE_TENANT_ID") {
            config.azure.tenant_id = tenant;
        }
        if let Ok(client) = std::env::var("AZURE_CLIENT_ID") {
            config.azure.client_id = client;
        }
        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| common::Error::Config(format!("PORT must be a port number: {e}")))?;
            config.server.listen_addr.set_port(port);
        }
        if let Ok(flag) = std::env::var("TEST_MODE") {
            if matches!(flag.trim(), "1" | "true" | "yes") {
                config.test_mode.mock_token_exchange = true;
                config.test_mode.mock_resource = true;
            }
        }

        config.azure.client_secret = resolve_secret(
            "AZURE_CLIENT_SECRET",
            config.azure.client_secret_file.as_deref(),
            "client_secret_file",
        )?;
        config.session.secret = resolve_secret(
            "SESSION_SECRET",
            config.session.secret_file.as_deref(),
            "secret_file",
        )?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        for (name, value) in [
            ("authority_host", &self.azure.authority_host),
            ("redirect_uri", &self.azure.redirect_uri),
            ("resource.url", &self.resource.url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {value}"
                )));
            }
        }

        if self.azure.tenant_id.trim().is_empty() {
            return Err(common::Error::Config(
                "tenant_id must be set (config or AZURE_TENANT_ID)".into(),
            ));
        }
        if self.azure.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "client_id must be set (config or AZURE_CLIENT_ID)".into(),
            ));
        }
        if self.azure.scopes.is_empty() {
            return Err(common::Error::Config("scopes must not be empty".into()));
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.session.state_ttl_secs == 0 {
            return Err(common::Error::Config(
                "state_ttl_secs must be greater than 0".into(),
            ));
        }

        match &self.session.secret {
            None => Err(common::Error::Config(
                "session secret must be set (SESSION_SECRET or session.secret_file)".into(),
            )),
            Some(secret) if secret.len() < MIN_SESSION_SECRET_LEN => {
                Err(common::Error::Config(format!(
                    "session secret must be at least {MIN_SESSION_SECRET_LEN} bytes"
                )))
            }
            Some(_) => Ok(()),
        }
    }

    /// Authority settings handed to the URL builders and token client.
    pub fn authority(&self) -> AuthorityConfig {
        AuthorityConfig {
            authority_host: self.azure.authority_host.clone(),
            tenant_id: self.azure.tenant_id.clone(),
            client_id: self.azure.client_id.clone(),
            redirect_uri: self.azure.redirect_uri.clone(),
            scopes: self.azure.scopes.clone(),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("auth-demo.toml")
    }
}

/// Env var wins over file. An empty or whitespace-only file yields `None`;
/// a named file that cannot be read is an error.
fn resolve_secret(
    env_var: &str,
    file: Option<&Path>,
    field: &str,
) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(Some(Secret::new(value)));
    }
    let Some(path) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!("failed to read {field} {}: {e}", path.display()))
    })?;
    let value = value.trim().to_owned();
    Ok((!value.is_empty()).then(|| Secret::new(value)))
}
