use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_APPLICATION_NAME: &str = "Census DBMS";
pub const DEFAULT_USER_NAME: &str = "census_user";

pub const ENV_DATABASE_URL: &str = "CENSUS_DATABASE_URL";
pub const ENV_USER: &str = "CENSUS_USER";
pub const ENV_APP_NAME: &str = "CENSUS_APP_NAME";

/// Where the SQLite database lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Parses `memory://` or `file://path/to/census.sqlite`.
    pub fn parse(url_str: &str) -> Result<Self> {
        let url = Url::parse(url_str).context("Invalid database URL")?;

        match url.scheme() {
            "memory" => Ok(DatabaseLocation::Memory),
            "file" => {
                // file://relative/path puts the first segment in the host.
                let path = match url.host_str() {
                    Some(host) if !host.is_empty() => format!("{}{}", host, url.path()),
                    _ => url.path().to_string(),
                };
                if path.is_empty() || path == "/" {
                    return Err(anyhow::anyhow!("file:// URL must include a path"));
                }
                Ok(DatabaseLocation::File(PathBuf::from(path)))
            }
            scheme => Err(anyhow::anyhow!(
                "Unsupported database URL scheme: {}. Use memory:// or file://",
                scheme
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CensusConfig {
    pub database: DatabaseLocation,
    pub user_name: String,
    pub application_name: String,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::Memory,
            user_name: default_user_name(),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        }
    }
}

impl CensusConfig {
    pub fn from_env() -> Result<Self> {
        let database = match std::env::var(ENV_DATABASE_URL) {
            Ok(url) => DatabaseLocation::parse(&url)?,
            Err(_) => DatabaseLocation::Memory,
        };
        let application_name = std::env::var(ENV_APP_NAME)
            .unwrap_or_else(|_| DEFAULT_APPLICATION_NAME.to_string());

        Ok(Self {
            database,
            user_name: default_user_name(),
            application_name,
        })
    }
}

fn default_user_name() -> String {
    std::env::var(ENV_USER)
        .or_else(|_| std::env::var("USER"))
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER_NAME.to_string())
}

/// Ambient identity stamped onto activity log entries and CRUD audit
/// columns. Callers never pass it explicitly.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub user_name: String,
    pub session_id: String,
    pub application_name: String,
}

impl SessionContext {
    pub fn new(user_name: &str, application_name: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            session_id: Uuid::now_v7().to_string(),
            application_name: application_name.to_string(),
        }
    }
}
