//! YAML configuration, grounded on `conf/config.go`'s `Config`/`EtcdConfig`/
//! `YamlConfig`. Promotes the original's hardcoded JWT signing key
//! (`middleware/auth.go`'s `SignKey = "pityToken"`) into `auth.sign_key` —
//! recorded as a hardening decision in the grounding ledger.
//!
//! `scheme` (top level) and `etcd.scheme` are both recognized, matching the
//! original's `Config{Etcd, Scheme}` / `EtcdConfig{..., Scheme}` split
//! (spec.md §6): the top-level `scheme` is the namespace segment under
//! which endpoint keys are registered and resolved
//! (`/{scheme}/{service}/...`, spec.md §3/§4.3); `etcd.scheme` is the dial
//! scheme (`http`/`https`) prepended to any etcd endpoint that doesn't
//! already carry one.

use gateway_core::registry::etcd::EtcdConfig as RegistryEtcdConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct EtcdSettings {
    pub endpoints: Vec<String>,
    #[serde(default = "default_etcd_scheme")]
    pub scheme: String,
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_etcd_scheme() -> String {
    "http".to_string()
}

fn default_dial_timeout() -> u64 {
    5
}

impl From<&EtcdSettings> for RegistryEtcdConfig {
    fn from(settings: &EtcdSettings) -> Self {
        let endpoints = settings
            .endpoints
            .iter()
            .map(|endpoint| {
                if endpoint.contains("://") {
                    endpoint.clone()
                } else {
                    format!("{}://{endpoint}", settings.scheme)
                }
            })
            .collect();
        RegistryEtcdConfig {
            endpoints,
            dial_timeout_secs: settings.dial_timeout_secs,
            username: settings.username.clone(),
            password: settings.password.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    pub sign_key: String,
}

#[derive(Debug, Deserialize)]
pub struct MethodRegistration {
    pub name: String,
    #[serde(default)]
    pub authorization: bool,
}

/// One backend service this gateway process knows about at startup: the
/// methods to pre-register in the method directory
/// (`internal/service/etcd/discover.go`'s `RegisterMethod`, called in bulk
/// instead of via reflection on a Go value's method set — spec.md §9).
///
/// This carries no instance address: endpoint keys are owned and written by
/// the backend process itself via `gateway_core::membership::register_instance`
/// (spec.md §5), never by the gateway.
#[derive(Debug, Deserialize)]
pub struct ServiceRegistration {
    pub service: String,
    pub version: String,
    pub methods: Vec<MethodRegistration>,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub etcd: EtcdSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub services: Vec<ServiceRegistration>,
}

fn default_scheme() -> String {
    "grpc".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(String, serde_yaml::Error),
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(Path::new(path))
            .map_err(|e| ConfigError::Read(path.to_string(), e))?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(path.to_string(), e))
    }
}
