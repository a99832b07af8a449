use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::DEFAULT_ADMIN_ROLE;

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: SocketAddr,
    pub database_path: PathBuf,
    pub documents_root: PathBuf,
    pub documents_timeout: Duration,
    pub admin_role: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_path: PathBuf::from("records.db"),
            documents_root: PathBuf::from("vault"),
            documents_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    documents: DocumentsSection,
    #[serde(default)]
    auth: AuthSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ServerSection {
    bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DocumentsSection {
    root: Option<PathBuf>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthSection {
    admin_role: Option<String>,
}

impl Config {
    /// Defaults, overlaid by the TOML file at `path` (when given), overlaid
    /// by `RECORDS_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)?;
        let mut config = Self::default();
        if let Some(bind) = file.server.bind {
            config.bind = parse_bind(&bind)?;
        }
        if let Some(path) = file.database.path {
            config.database_path = path;
        }
        if let Some(root) = file.documents.root {
            config.documents_root = root;
        }
        if let Some(ms) = file.documents.timeout_ms {
            config.documents_timeout = clamp_timeout(ms);
        }
        if let Some(role) = file.auth.admin_role {
            config.admin_role = role;
        }
        Ok(config)
    }

    /// Applies `RECORDS_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bind) = lookup("RECORDS_BIND") {
            self.bind = parse_bind(&bind)?;
        }
        if let Some(path) = lookup("RECORDS_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(root) = lookup("RECORDS_DOCUMENTS_ROOT") {
            self.documents_root = PathBuf::from(root);
        }
        if let Some(ms) = lookup("RECORDS_DOCUMENTS_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .with_context(|| format!("RECORDS_DOCUMENTS_TIMEOUT_MS is not a number: {ms}"))?;
            self.documents_timeout = clamp_timeout(ms);
        }
        if let Some(role) = lookup("RECORDS_ADMIN_ROLE") {
            self.admin_role = role;
        }
        Ok(())
    }
}

fn parse_bind(value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid bind address: {value}"))
}

fn clamp_timeout(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(*TIMEOUT_RANGE_MS.start(), *TIMEOUT_RANGE_MS.end()))
}
