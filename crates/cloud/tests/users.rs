//! Credential manager behavior over a scratch directory.

use std::fs;
use std::path::Path;

use eetools_cloud::{Authenticator, CloudError, Credentials, UserManager, DEFAULT_USER};

fn record(token: &str) -> Credentials {
    Credentials {
        refresh_token: token.to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
    }
}

fn write_record(dir: &Path, file: &str, token: &str) {
    let json = serde_json::to_string(&record(token)).unwrap();
    fs::write(dir.join(file), json).unwrap();
}

/// Writes a fixed record as the new default file.
struct FakeFlow {
    token: &'static str,
}

impl Authenticator for FakeFlow {
    fn authorize(&self, dir: &Path) -> eetools_cloud::Result<()> {
        write_record(dir, "credentials", self.token);
        Ok(())
    }
}

#[test]
fn list_derives_names_from_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    write_record(dir.path(), "credentials", "t0");
    write_record(dir.path(), "credentialsA", "t1");
    write_record(dir.path(), "credentialsB", "t2");
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let manager = UserManager::new(dir.path());
    assert_eq!(manager.list().unwrap(), vec!["A", "B", DEFAULT_USER]);
}

#[test]
fn load_returns_the_typed_record() {
    let dir = tempfile::tempdir().unwrap();
    write_record(dir.path(), "credentialsalice", "alice-token");

    let manager = UserManager::new(dir.path());
    assert_eq!(manager.load("alice").unwrap(), record("alice-token"));
}

#[test]
fn load_reports_unregistered_users() {
    let dir = tempfile::tempdir().unwrap();
    let manager = UserManager::new(dir.path());
    assert!(matches!(
        manager.load("nobody"),
        Err(CloudError::UserNotRegistered(name)) if name == "nobody"
    ));

    // malformed files count as unregistered too
    fs::write(dir.path().join("credentialsbroken"), "not json").unwrap();
    assert!(matches!(
        manager.load("broken"),
        Err(CloudError::UserNotRegistered(_))
    ));
}

#[test]
fn create_registers_the_user_and_restores_the_default() {
    let dir = tempfile::tempdir().unwrap();
    write_record(dir.path(), "credentials", "original-default");

    let manager = UserManager::new(dir.path());
    manager
        .create("alice", &FakeFlow { token: "alice-token" })
        .unwrap();

    assert_eq!(manager.load("alice").unwrap(), record("alice-token"));
    assert_eq!(manager.load(DEFAULT_USER).unwrap(), record("original-default"));
}

#[test]
fn create_works_without_a_preexisting_default() {
    let dir = tempfile::tempdir().unwrap();
    let manager = UserManager::new(dir.path());
    manager
        .create("bob", &FakeFlow { token: "bob-token" })
        .unwrap();

    assert_eq!(manager.load("bob").unwrap(), record("bob-token"));
    assert_eq!(manager.list().unwrap(), vec!["bob"]);
}

#[test]
fn delete_and_rename_ignore_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let manager = UserManager::new(dir.path());
    manager.delete("nonexistent").unwrap();
    manager.rename("nonexistent", "other").unwrap();

    write_record(dir.path(), "credentialscarol", "t");
    manager.rename("carol", "carla").unwrap();
    assert_eq!(manager.list().unwrap(), vec!["carla"]);
    manager.delete("carla").unwrap();
    assert!(manager.list().unwrap().is_empty());
}
