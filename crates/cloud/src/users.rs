//! Credential records and the on-disk user manager.
//!
//! One directory holds every registered user. The active default record is
//! a file called `credentials`; named users keep theirs under
//! `credentials<name>`. Sessions are explicit: callers load a record and
//! hand it to the engine they construct, there is no process-wide active
//! user.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CloudError, Result};

const DEFAULT_FILE: &str = "credentials";

/// The sentinel user name of the bare `credentials` file.
pub const DEFAULT_USER: &str = "default";

/// An OAuth credential record as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Runs the interactive authorization flow.
///
/// Implementations must leave a fresh default credential file in the
/// directory they are given.
pub trait Authenticator {
    fn authorize(&self, dir: &Path) -> Result<()>;
}

/// Manages named credential files in one directory.
#[derive(Debug, Clone)]
pub struct UserManager {
    dir: PathBuf,
}

impl UserManager {
    pub fn new(dir: impl Into<PathBuf>) -> UserManager {
        UserManager { dir: dir.into() }
    }

    /// The directory holding every credential file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        if name == DEFAULT_USER {
            self.dir.join(DEFAULT_FILE)
        } else {
            self.dir.join(format!("{DEFAULT_FILE}{name}"))
        }
    }

    /// Load a named credential record.
    ///
    /// A missing or malformed file reports the user as unregistered; the
    /// fix in both cases is to run [`UserManager::create`] again.
    pub fn load(&self, name: &str) -> Result<Credentials> {
        let text = fs::read_to_string(self.path(name))
            .map_err(|_| CloudError::UserNotRegistered(name.to_string()))?;
        serde_json::from_str(&text).map_err(|_| CloudError::UserNotRegistered(name.to_string()))
    }

    /// Register a new user through `auth`.
    ///
    /// Any existing default record is parked in a temporary directory while
    /// the authorization flow writes a fresh one; the fresh file then moves
    /// to the name-qualified path and the parked record moves back. The
    /// restore is best-effort: a crash between the two moves can leave no
    /// default record in place.
    pub fn create(&self, name: &str, auth: &dyn Authenticator) -> Result<()> {
        let default = self.dir.join(DEFAULT_FILE);
        let backup = tempfile::tempdir()?;
        let parked = backup.path().join(DEFAULT_FILE);

        let had_default = default.exists();
        if had_default {
            fs::rename(&default, &parked)?;
        }
        let outcome = auth
            .authorize(&self.dir)
            .and_then(|()| Ok(fs::rename(&default, self.path(name))?));
        if had_default {
            let _ = fs::rename(&parked, &default);
        }
        outcome
    }

    /// Delete a named credential record. A missing file is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path(name)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }

    /// Rename a credential record. A missing source is not an error.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        match fs::rename(self.path(old), self.path(new)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }

    /// Names of every registered user, sorted; the bare default file lists
    /// as [`DEFAULT_USER`].
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let file = entry?.file_name();
            let Some(file) = file.to_str() else { continue };
            if let Some(suffix) = file.strip_prefix(DEFAULT_FILE) {
                names.push(if suffix.is_empty() {
                    DEFAULT_USER.to_string()
                } else {
                    suffix.to_string()
                });
            }
        }
        names.sort();
        Ok(names)
    }
}
