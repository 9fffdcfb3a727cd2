use crate::application_port::RetryPolicy;
use anyhow::{Result, anyhow};
use config::{Config, File, FileFormat};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub counter: Counter,
    pub catalog: Catalog,
    pub mysql: MySql,
    pub redis: Redis,
    pub http: Http,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub backend: String, // "memory" or "mysql"
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub guard_timeout_ms: u64,
    pub signing_kid: String,
    /// Environment variable holding the current signing secret.
    pub signing_key_env: String,
    #[serde(default)]
    pub retired_keys: Vec<RetiredKey>,
    /// Fall back to a fixed development secret when `signing_key_env` is unset.
    #[serde(default)]
    pub allow_dev_key: bool,
    /// Accounts created at startup by the `memory` backend.
    #[serde(default)]
    pub seed_users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize)]
pub struct RetiredKey {
    pub kid: String,
    pub env: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub email: String,
    #[serde(deserialize_with = "secret")]
    pub password: SecretString,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct Counter {
    pub backend: String, // "memory" or "redis"
    pub prefix: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub source: String, // "memory" or "tmdb"
    pub store: String,  // "memory" or "mysql"
    pub base_url: String,
    pub api_key_env: String,
    pub language: String,
    pub max_pages: u32,
    pub request_timeout_ms: u64,
    /// Zero disables the background scheduler.
    pub sync_interval_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
pub struct MySql {
    /// May carry credentials in its userinfo part.
    #[serde(deserialize_with = "secret")]
    pub dsn: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Redis {
    #[serde(deserialize_with = "secret")]
    pub dsn: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    /// TLS is enabled only when both paths are set.
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

pub fn parse_settings_str(toml: &str) -> Result<Settings> {
    let settings: Settings = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
