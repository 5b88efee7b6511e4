//! Durable cookie sessions, one JSON record per name.
//!
//! The store's job ends at persisting and handing back records. Whether a
//! caller navigates to the saved URL after a restore is the calling layer's
//! decision, not the store's.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use webgrip_core::{Error, Paths, Result};

/// One browser cookie as it crosses the persistence boundary. Field names
/// follow the DevTools wire shape so records round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Unix epoch seconds; absent for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// The on-disk session record. Field names are an external contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    /// ISO-8601 save timestamp.
    pub saved_at: String,
    pub cookies: Vec<Cookie>,
    /// Length of `cookies` at save time; handed back as stored, never
    /// recomputed on load.
    pub cookie_count: usize,
    /// Distinct cookie domains; order not significant.
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
}

pub struct SessionStore {
    paths: Paths,
}

impl SessionStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    /// Persist a cookie set under `name`, overwriting any prior record of
    /// the same name. Returns the path of the stored record.
    pub fn save(&self, cookies: &[Cookie], current_url: Option<&str>, name: &str) -> Result<PathBuf> {
        let path = self.paths.session_file(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let domains: BTreeSet<&str> = cookies.iter().map(|c| c.domain.as_str()).collect();
        let record = SessionRecord {
            name: name.to_string(),
            saved_at: Utc::now().to_rfc3339(),
            cookie_count: cookies.len(),
            cookies: cookies.to_vec(),
            domains: domains.into_iter().map(String::from).collect(),
            current_url: current_url.map(String::from),
        };

        let content = serde_json::to_string_pretty(&record)?;

        // Write-then-rename: a crash mid-save must never leave a torn
        // record where `load` can see it.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;

        info!(
            session = name,
            cookies = record.cookie_count,
            domains = record.domains.len(),
            "Session saved"
        );
        Ok(path)
    }

    /// Read the named record. Absence is the typed `Error::NotFound`, which
    /// callers handle (e.g. by offering to start a fresh session).
    pub fn load(&self, name: &str) -> Result<SessionRecord> {
        let path = self.paths.session_file(name);
        if !path.exists() {
            warn!(session = name, "Session not found");
            return Err(Error::NotFound(format!("session '{}'", name)));
        }

        let content = std::fs::read_to_string(&path)?;
        let record: SessionRecord = serde_json::from_str(&content)
            .map_err(|e| Error::Session(format!("Corrupt session record '{}': {}", name, e)))?;

        if record.cookie_count != record.cookies.len() {
            warn!(
                session = name,
                stored = record.cookie_count,
                actual = record.cookies.len(),
                "Session cookie_count disagrees with cookie list"
            );
        }

        info!(session = name, cookies = record.cookie_count, "Session loaded");
        Ok(record)
    }

    /// All stored session names, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.paths.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(name) = file_name.strip_suffix(".json") {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove a record. Deleting a nonexistent name is not an error; it
    /// just reports `false`.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.paths.session_file(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
            info!(session = name, "Session deleted");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Paths::with_base(dir.path().to_path_buf()));
        (store, dir)
    }

    fn cookie(name: &str, domain: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: "1".to_string(),
            domain: domain.to_string(),
            path: "/".to_string(),
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let (store, _dir) = test_store();
        let cookies = vec![cookie("x", "example.com")];

        store
            .save(&cookies, Some("https://example.com"), "s1")
            .unwrap();
        let record = store.load("s1").unwrap();

        assert_eq!(record.name, "s1");
        assert_eq!(record.cookie_count, 1);
        assert_eq!(record.cookies, cookies);
        assert_eq!(record.domains, vec!["example.com"]);
        assert_eq!(record.current_url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_domains_deduplicated() {
        let (store, _dir) = test_store();
        let cookies = vec![
            cookie("a", "example.com"),
            cookie("b", "example.com"),
            cookie("c", "other.org"),
        ];

        store.save(&cookies, None, "multi").unwrap();
        let record = store.load("multi").unwrap();

        assert_eq!(record.cookie_count, 3);
        let mut domains = record.domains.clone();
        domains.sort();
        assert_eq!(domains, vec!["example.com", "other.org"]);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (store, _dir) = test_store();
        let err = store.load("nonexistent").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _dir) = test_store();
        store.save(&[cookie("x", "example.com")], None, "gone").unwrap();

        assert!(store.delete("gone").unwrap());
        assert!(!store.delete("gone").unwrap());
        assert!(!store.delete("never-existed").unwrap());
    }

    #[test]
    fn test_save_overwrites_prior_record() {
        let (store, _dir) = test_store();
        store.save(&[cookie("a", "one.com")], None, "s").unwrap();
        store
            .save(&[cookie("b", "two.com"), cookie("c", "two.com")], None, "s")
            .unwrap();

        let record = store.load("s").unwrap();
        assert_eq!(record.cookie_count, 2);
        assert_eq!(record.domains, vec!["two.com"]);
        assert_eq!(store.list().unwrap(), vec!["s"]);
    }

    #[test]
    fn test_list_names_only() {
        let (store, _dir) = test_store();
        assert!(store.list().unwrap().is_empty());

        store.save(&[], None, "beta").unwrap();
        store.save(&[], None, "alpha").unwrap();
        assert_eq!(store.list().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let (store, dir) = test_store();
        store.save(&[cookie("x", "example.com")], None, "clean").unwrap();

        let entries: Vec<String> = std::fs::read_dir(dir.path().join("sessions"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["clean.json"]);
    }
}
