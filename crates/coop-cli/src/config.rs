//! `coop.toml` loading and merging with command-line flags.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use coop_migrate::{CommitMode, MigrationConfig, SchemaVersion};
use coop_store::SqliteConfig;
use serde::Deserialize;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "coop.toml";

/// Database used when neither the flag nor the config file names one.
pub const DEFAULT_DB_PATH: &str = "coop.db";

/// Storage engine behind the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Redb,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => f.write_str("SQLite"),
            Self::Redb => f.write_str("redb"),
        }
    }
}

/// Contents of `coop.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub store: StoreSection,
    pub sqlite: SqliteConfig,
    pub migrations: MigrationsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
    pub backend: Option<Backend>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationsSection {
    pub marker_namespace: Option<String>,
    pub marker_key: Option<String>,
    pub initial_version: Option<SchemaVersion>,
    pub commit: Option<CommitMode>,
}

/// Effective settings after merging flags over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db: PathBuf,
    pub backend: Backend,
    pub sqlite: SqliteConfig,
    pub migrations: MigrationConfig,
}

impl ConfigFile {
    /// Load config from a specific file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse config from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `explicit` if given, else `coop.toml` from the working directory
    /// if it exists, else the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Merge with command-line flags, which take precedence.
    pub fn resolve(self, db: Option<PathBuf>, backend: Option<Backend>) -> Settings {
        let defaults = MigrationConfig::default();
        let m = self.migrations;

        Settings {
            db: db
                .or(self.store.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            backend: backend.or(self.store.backend).unwrap_or_default(),
            sqlite: self.sqlite,
            migrations: MigrationConfig {
                marker_namespace: m.marker_namespace.unwrap_or(defaults.marker_namespace),
                marker_key: m.marker_key.unwrap_or(defaults.marker_key),
                initial_version: m.initial_version.unwrap_or(defaults.initial_version),
                commit: m.commit.unwrap_or(defaults.commit),
            },
        }
    }
}
