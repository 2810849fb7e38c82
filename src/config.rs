//! Runtime configuration.

use crate::errors::*;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_BACKLOG: i32 = 16;
pub const DEFAULT_ELO: u16 = 1200;
pub const DEFAULT_ELO_THRESHOLD: u16 = 200;

/// Server settings. Any field missing from the config file falls back
/// to its default.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// TCP port the server listens on.
    pub port: u16,
    /// Listen backlog for the accept socket.
    pub backlog: i32,
    /// Rating assigned to freshly registered players.
    pub default_elo: u16,
    /// Largest rating difference the matchmaker will pair.
    pub elo_threshold: u16,
    /// Path of the JSON user store.
    pub users_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            default_elo: DEFAULT_ELO,
            elo_threshold: DEFAULT_ELO_THRESHOLD,
            users_path: PathBuf::from("users.json"),
        }
    }
}

impl Config {
    /// Read settings from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> ChessdResult<Self> {
        Ok(serde_json::from_reader(fs::File::open(path)?)?)
    }
}
