//! Local persisted session: token, operator, per-kind filters, banner flag.
//!
//! Stored as one JSON file. Writes are atomic via a temp-rename pattern so a
//! crash mid-write never leaves a truncated session behind.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::client::Filter;
use crate::error::SessionError;
use crate::listing::RealEstateKind;

/// The signed-in operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub user_id: String,
    pub full_name: String,
}

/// Everything persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<CurrentUser>,
    /// Last-used filter per kind, keyed by [`RealEstateKind::slug`].
    #[serde(default)]
    pub filters: BTreeMap<String, Filter>,
    #[serde(default)]
    pub subscription_banner_dismissed: bool,
}

/// Load a session file.
///
/// Returns `Ok(None)` if the file does not exist or is corrupt. A corrupt
/// session is not a hard error: the operator simply signs in again.
///
/// # Errors
///
/// Returns `io::Error` for I/O failures other than file-not-found.
pub(crate) fn load_state(path: &Path) -> io::Result<Option<SessionState>> {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "corrupt session file, starting signed out"
                );
                Ok(None)
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Save a session file atomically, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`SessionError`] if encoding, writing, or renaming fails.
pub(crate) fn save_state(path: &Path, state: &SessionState) -> Result<(), SessionError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// File-backed session shared by every service of a desk.
///
/// Reads come from memory; every change is written through to disk before
/// the method returns. `Clone` is cheap.
///
/// # Panics
///
/// Methods panic if the inner lock is poisoned.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    state: Arc<RwLock<SessionState>>,
}

impl SessionStore {
    /// Open the session at `path`, starting empty if it is missing or corrupt.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let state = load_state(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the whole session.
    pub fn state(&self) -> SessionState {
        self.state.read().expect("session lock poisoned").clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.read().expect("session lock poisoned").token.clone()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.state.read().expect("session lock poisoned").user.clone()
    }

    /// Store the token and operator after a successful login.
    pub fn sign_in(&self, token: impl Into<String>, user: CurrentUser) -> Result<(), SessionError> {
        let token = token.into();
        self.update(|s| {
            s.token = Some(token);
            s.user = Some(user);
        })
    }

    /// Last filter used for `kind`, if any.
    pub fn filter(&self, kind: RealEstateKind) -> Option<Filter> {
        self.state
            .read()
            .expect("session lock poisoned")
            .filters
            .get(kind.slug())
            .cloned()
    }

    pub fn remember_filter(&self, kind: RealEstateKind, filter: Filter) -> Result<(), SessionError> {
        self.update(|s| {
            s.filters.insert(kind.slug().to_string(), filter);
        })
    }

    pub fn subscription_banner_dismissed(&self) -> bool {
        self.state
            .read()
            .expect("session lock poisoned")
            .subscription_banner_dismissed
    }

    pub fn dismiss_subscription_banner(&self) -> Result<(), SessionError> {
        self.update(|s| s.subscription_banner_dismissed = true)
    }

    /// Forget everything and delete the session file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), SessionError> {
        *self.state.write().expect("session lock poisoned") = SessionState::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `f` and write the result through to disk while holding the
    /// write lock, so concurrent updates cannot reorder on disk.
    fn update(&self, f: impl FnOnce(&mut SessionState)) -> Result<(), SessionError> {
        let mut state = self.state.write().expect("session lock poisoned");
        f(&mut state);
        save_state(&self.path, &state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> CurrentUser {
        CurrentUser {
            user_id: "u1".into(),
            full_name: "Operator One".into(),
        }
    }

    #[test]
    fn open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let session = SessionStore::open(dir.path().join("session.json")).expect("open");
        assert_eq!(session.state(), SessionState::default());
        assert!(!session.path().exists());
    }

    #[test]
    fn sign_in_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("nested").join("session.json");
        let session = SessionStore::open(&path).expect("open");
        session.sign_in("tok-1", operator()).expect("sign in");

        let reopened = SessionStore::open(&path).expect("reopen");
        assert_eq!(reopened.token().as_deref(), Some("tok-1"));
        assert_eq!(reopened.current_user(), Some(operator()));
    }

    #[test]
    fn filters_are_kept_per_kind() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("session.json");
        let session = SessionStore::open(&path).expect("open");
        let flats = Filter::new().with("rooms", "2");
        session
            .remember_filter(RealEstateKind::Flat, flats.clone())
            .expect("remember");

        let reopened = SessionStore::open(&path).expect("reopen");
        assert_eq!(reopened.filter(RealEstateKind::Flat), Some(flats));
        assert_eq!(reopened.filter(RealEstateKind::Land), None);
    }

    #[test]
    fn banner_flag_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("session.json");
        let session = SessionStore::open(&path).expect("open");
        assert!(!session.subscription_banner_dismissed());
        session.dismiss_subscription_banner().expect("dismiss");
        assert!(SessionStore::open(&path).expect("reopen").subscription_banner_dismissed());
    }

    #[test]
    fn clear_removes_file_and_state() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("session.json");
        let session = SessionStore::open(&path).expect("open");
        session.sign_in("tok", operator()).expect("sign in");
        assert!(path.exists());

        session.clear().expect("clear");

        assert!(!path.exists());
        assert!(session.token().is_none());
        session.clear().expect("clearing twice is fine");
    }

    #[test]
    fn corrupt_file_loads_as_signed_out() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").expect("write should succeed");
        let session = SessionStore::open(&path).expect("corrupt file is not an error");
        assert!(session.token().is_none());
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("session.json");
        save_state(&path, &SessionState::default()).expect("save");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let loaded = load_state(&path).expect("load").expect("exists");
        assert_eq!(loaded, SessionState::default());
    }
}
