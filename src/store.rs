/*!
Persistent player accounts.

The store is a write-through mirror of a single JSON document: a
top-level object keyed by username, each value `{"elo": <u16>}`. Every
mutation rewrites the document through a temp file followed by an atomic
rename, so a crash mid-write never leaves a truncated store behind.
*/

use crate::errors::*;
use crate::protocol::PlayerEntry;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[allow(unused_imports)]
use log::{debug, error, info, warn};

use serde::{Deserialize, Serialize};

/// A registered player as persisted on disk. The username is the
/// document key, not a field.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct UserProfile {
    pub elo: u16,
}

/// Why a registration was refused.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RegisterError {
    UsernameTaken,
    InvalidUsername,
}

/// A username must be non-empty printable ASCII; the wire format also
/// caps it at 255 bytes.
pub fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 255
        && username.chars().all(|c| c.is_ascii_graphic())
}

/// Username → profile map with JSON write-through persistence.
pub struct UserStore {
    path: PathBuf,
    default_elo: u16,
    users: Mutex<HashMap<String, UserProfile>>,
}

impl UserStore {
    /// Open the store backed by the document at `path`. A missing
    /// document yields an empty store; it is created on first write.
    pub fn open<P: AsRef<Path>>(path: P, default_elo: u16) -> ChessdResult<Self> {
        let path = path.as_ref().to_path_buf();

        let users = match fs::File::open(&path) {
            Ok(file) => serde_json::from_reader(file)?,
            Err(ref err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no user store at {:?}, starting empty", path);
                HashMap::new()
            }
            Err(err) => return Err(Error::from(err)),
        };

        Ok(Self {
            path,
            default_elo,
            users: Mutex::new(users),
        })
    }

    /// Create an account at the default rating and persist it.
    pub fn register(&self, username: &str) -> Result<u16, RegisterError> {
        if !valid_username(username) {
            return Err(RegisterError::InvalidUsername);
        }

        let mut users = self.users.lock().unwrap();
        if users.contains_key(username) {
            return Err(RegisterError::UsernameTaken);
        }

        users.insert(
            username.to_owned(),
            UserProfile {
                elo: self.default_elo,
            },
        );
        self.persist(&users);

        Ok(self.default_elo)
    }

    /// Whether an account exists under this username.
    pub fn validate(&self, username: &str) -> bool {
        self.users.lock().unwrap().contains_key(username)
    }

    pub fn elo(&self, username: &str) -> Option<u16> {
        self.users.lock().unwrap().get(username).map(|u| u.elo)
    }

    /// Overwrite a player's rating and persist. Returns `false` for an
    /// unknown username.
    pub fn update_elo(&self, username: &str, elo: u16) -> bool {
        let mut users = self.users.lock().unwrap();
        match users.get_mut(username) {
            Some(profile) => {
                profile.elo = elo;
                self.persist(&users);
                true
            }
            None => false,
        }
    }

    /// Value copy of the roster for enumeration outside the lock.
    pub fn snapshot(&self) -> Vec<PlayerEntry> {
        let users = self.users.lock().unwrap();
        let mut entries: Vec<PlayerEntry> = users
            .iter()
            .map(|(username, profile)| PlayerEntry {
                username: username.clone(),
                elo: profile.elo,
            })
            .collect();
        entries.sort_by(|a, b| a.username.cmp(&b.username));
        entries
    }

    // Write temp + rename so readers never observe a partial document.
    fn persist(&self, users: &HashMap<String, UserProfile>) {
        if let Err(err) = self.try_persist(users) {
            error!("failed to persist user store to {:?}: {:?}", self.path, err);
        }
    }

    fn try_persist(&self, users: &HashMap<String, UserProfile>) -> ChessdResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        let file = fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(file, users)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
