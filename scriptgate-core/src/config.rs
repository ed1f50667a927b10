//! Startup configuration: a flat key-value store loaded once from YAML, and
//! the typed [`GatewaySettings`] view the server is built from.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::error::ConfigError;

/// Key holding the TCP port the gateway listens on. Required.
pub const KEY_API_PORT: &str = "api_port";
/// Key holding the value sent as `Access-Control-Allow-Origin`.
pub const KEY_CORS_ALLOWED_DOMAINS: &str = "cors_allowed_domains";
/// Key overriding the listen address (default `0.0.0.0`).
pub const KEY_API_BIND_ADDRESS: &str = "api_bind_address";
/// Key overriding the certificate chain file (default `fullchain.pem`).
pub const KEY_TLS_CERT_FILE: &str = "tls_cert_file";
/// Key overriding the private key file (default `localhost.key`).
pub const KEY_TLS_KEY_FILE: &str = "tls_key_file";
/// Key overriding the base URL used for index page links.
pub const KEY_INDEX_BASE_URL: &str = "index_base_url";
/// Key overriding the directory scripts are resolved against.
pub const KEY_SCRIPT_DIR: &str = "script_dir";

const DEFAULT_CERT_FILE: &str = "fullchain.pem";
const DEFAULT_KEY_FILE: &str = "localhost.key";

/// Immutable key-value configuration.
///
/// Lookups never fail: absent keys read as the empty string. A
/// `Configuration::default()` behaves like a store that was never loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] if the file cannot be read, or any error
    /// from [`Configuration::from_yaml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse a YAML mapping into a configuration.
    ///
    /// String keys with scalar values are kept; numbers and booleans are
    /// stored in their textual form. Sequences, nested mappings and `null`
    /// values are dropped and therefore read back as empty. An empty
    /// document yields an empty configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on invalid YAML and
    /// [`ConfigError::NotAMapping`] when the document root is not a mapping.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let mapping = match serde_yaml::from_str::<Value>(raw)? {
            Value::Mapping(m) => m,
            Value::Null => return Ok(Self::default()),
            _ => return Err(ConfigError::NotAMapping),
        };

        let values = mapping
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_owned(), scalar_text(v)?)))
            .collect();
        Ok(Self { values })
    }

    /// Return the value for `key`, or `""` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map_or("", String::as_str)
    }

    /// Return the value for `key`, failing when absent or empty.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingKey`].
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        match self.get(key) {
            "" => Err(ConfigError::MissingKey { key: key.to_owned() }),
            value => Ok(value),
        }
    }

    /// Value for `key`, or `default` when absent or empty.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.get(key) {
            "" => default,
            value => value,
        }
    }
}

impl FromIterator<(String, String)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Typed settings derived from a [`Configuration`] at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct GatewaySettings {
    /// TCP port to listen on.
    pub port: u16,
    /// Address to bind.
    pub bind_address: IpAddr,
    /// Value for `Access-Control-Allow-Origin`; may be empty.
    pub cors_allowed_origin: String,
    /// PEM certificate chain.
    pub tls_cert_file: PathBuf,
    /// PEM private key.
    pub tls_key_file: PathBuf,
    /// Base URL the index page links are built under.
    pub index_base_url: String,
    /// Directory the invoked scripts live in.
    pub script_dir: PathBuf,
}

impl GatewaySettings {
    /// Build settings from `config`, resolving relative paths against
    /// `working_dir`.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingKey`] when `api_port` is absent or empty,
    /// and [`ConfigError::InvalidValue`] when the port or bind address does
    /// not parse.
    pub fn from_config(config: &Configuration, working_dir: &Path) -> Result<Self, ConfigError> {
        let raw_port = config.require(KEY_API_PORT)?;
        let port = raw_port.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
            key: KEY_API_PORT.to_owned(),
            value: raw_port.to_owned(),
            reason: e.to_string(),
        })?;

        let bind_address = match config.get(KEY_API_BIND_ADDRESS) {
            "" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            raw => raw.trim().parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidValue {
                    key: KEY_API_BIND_ADDRESS.to_owned(),
                    value: raw.to_owned(),
                    reason: e.to_string(),
                }
            })?,
        };

        let index_base_url = match config.get(KEY_INDEX_BASE_URL) {
            "" => format!("https://localhost:{port}/"),
            url => url.to_owned(),
        };

        Ok(Self {
            port,
            bind_address,
            cors_allowed_origin: config.get(KEY_CORS_ALLOWED_DOMAINS).to_owned(),
            tls_cert_file: working_dir.join(config.get_or(KEY_TLS_CERT_FILE, DEFAULT_CERT_FILE)),
            tls_key_file: working_dir.join(config.get_or(KEY_TLS_KEY_FILE, DEFAULT_KEY_FILE)),
            index_base_url,
            script_dir: working_dir.join(config.get(KEY_SCRIPT_DIR)),
        })
    }
}
