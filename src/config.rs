//! Configuration manager for notekeeper.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::database::{DEFAULT_DATABASE_PATH, DEFAULT_POOL_SIZE};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const TOKEN_CLEANUP_INTERVAL: u64 = 12 * 60 * 60; // 12 hours.
const REQUEST_TIMEOUT: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Directory holding the front-end files.
    pub public_dir: PathBuf,
    /// Whether anyone can create an account.
    pub registration: bool,
    /// Seconds between two expired tokens sweeps.
    pub token_cleanup_interval: u64,
    /// Seconds before a request times out.
    pub request_timeout: u64,
    /// Install the Prometheus recorder.
    pub metrics: bool,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to SQLite configuration.
    #[serde(skip_serializing)]
    pub database: Sqlite,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            public_dir: PathBuf::from("public"),
            registration: true,
            token_cleanup_interval: TOKEN_CLEANUP_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
            metrics: false,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            database: Sqlite::default(),
            argon2: None,
        }
    }
}

/// SQLite configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sqlite {
    /// Database file, created when missing.
    pub path: PathBuf,
    /// Maximum pool connections.
    pub pool_size: u32,
}

impl Default for Sqlite {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn token_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.token_cleanup_interval.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(mut config) => {
                    config.version = VERSION.to_owned();
                    config.path = file_path;
                    Arc::new(config)
                },
                Err(err) => Arc::new(self.error(err)),
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "unable to read `config.yaml`, using defaults");
        Self::default()
    }
}
