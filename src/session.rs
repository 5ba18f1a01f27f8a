//! Signed-in user state.
//!
//! `LocalAuth` is the auth provider: it persists the signed-in identity to a
//! session file and announces changes on a watch channel. `SessionStore`
//! subscribes to it on `init`, resolves the profile, and republishes a
//! read-only `SessionSnapshot` whenever `refresh` sees a provider change.
//! Commands receive the snapshot explicitly.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::AccessError;
use crate::models::{Profile, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: i64,
    pub email: String,
    pub signed_in_at: DateTime<Utc>,
}

/// File-backed auth provider.
pub struct LocalAuth {
    path: PathBuf,
    changes: watch::Sender<Option<AuthSession>>,
}

impl LocalAuth {
    pub fn open(path: &Path) -> Result<Self> {
        let current = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read session file {}", path.display()))?;
            Some(serde_json::from_str(&raw).context("Corrupt session file")?)
        } else {
            None
        };
        let (changes, _) = watch::channel(current);
        Ok(Self {
            path: path.to_path_buf(),
            changes,
        })
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.changes.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.changes.subscribe()
    }

    pub fn sign_in(&self, profile: &Profile) -> Result<AuthSession> {
        let session = AuthSession {
            user_id: profile.id,
            email: profile.email.clone(),
            signed_in_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&session)?)
            .with_context(|| format!("Failed to write session file {}", self.path.display()))?;
        info!(user_id = session.user_id, "signed in");
        self.changes.send_replace(Some(session.clone()));
        Ok(session)
    }

    pub fn sign_out(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove session file {}", self.path.display()))?;
        }
        info!("signed out");
        self.changes.send_replace(None);
        Ok(())
    }
}

/// Profile lookup used to resolve a session into a profile.
pub trait ProfileDirectory {
    fn profile(&self, id: i64) -> Result<Option<Profile>>;
}

impl ProfileDirectory for Database {
    fn profile(&self, id: i64) -> Result<Option<Profile>> {
        self.get_profile(id)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub user: Option<AuthSession>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn is_employer(&self) -> bool {
        self.profile
            .as_ref()
            .is_some_and(|p| p.role == Role::Employer)
    }

    /// No profile reads as a seeker.
    pub fn is_seeker(&self) -> bool {
        self.profile.as_ref().is_none_or(|p| p.role == Role::Seeker)
    }

    pub fn require_profile(&self) -> Result<&Profile, AccessError> {
        self.profile.as_ref().ok_or(AccessError::SignedOut)
    }

    pub fn require_employer(&self, action: &'static str) -> Result<&Profile, AccessError> {
        let profile = self.require_profile()?;
        if profile.role != Role::Employer {
            return Err(AccessError::EmployerOnly(action));
        }
        Ok(profile)
    }

    pub fn require_seeker(&self, action: &'static str) -> Result<&Profile, AccessError> {
        let profile = self.require_profile()?;
        if profile.role != Role::Seeker {
            return Err(AccessError::SeekerOnly(action));
        }
        Ok(profile)
    }
}

pub struct SessionStore {
    subscription: Option<watch::Receiver<Option<AuthSession>>>,
    published: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    /// Subscribe to `auth` and resolve the current session.
    pub fn init(auth: &LocalAuth, profiles: &dyn ProfileDirectory) -> Result<Self> {
        let (published, _) = watch::channel(SessionSnapshot {
            loading: true,
            ..Default::default()
        });
        let mut store = Self {
            subscription: Some(auth.subscribe()),
            published,
        };
        let current = store
            .subscription
            .as_mut()
            .map(|rx| rx.borrow_and_update().clone())
            .unwrap_or_default();
        store.publish(current, profiles)?;
        Ok(store)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.published.borrow().clone()
    }

    /// Apply a pending provider change, if any. Returns true when the
    /// snapshot was republished.
    pub fn refresh(&mut self, profiles: &dyn ProfileDirectory) -> Result<bool> {
        let Some(rx) = self.subscription.as_mut() else {
            return Ok(false);
        };
        if !rx.has_changed().unwrap_or(false) {
            return Ok(false);
        }
        let session = rx.borrow_and_update().clone();
        self.publish(session, profiles)?;
        Ok(true)
    }

    /// Unsubscribe from the provider and clear the snapshot.
    pub fn teardown(&mut self) {
        if self.subscription.take().is_some() {
            debug!("session store unsubscribed");
        }
        self.published.send_replace(SessionSnapshot::default());
    }

    fn publish(&mut self, session: Option<AuthSession>, profiles: &dyn ProfileDirectory) -> Result<()> {
        let profile = match &session {
            Some(s) => profiles.profile(s.user_id)?,
            None => None,
        };
        self.published.send_replace(SessionSnapshot {
            user: session,
            profile,
            loading: false,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let seeker = db.create_profile("Sara", "sara@mail.com", Role::Seeker, None).unwrap();
        let employer = db
            .create_profile("Karim", "karim@corp.com", Role::Employer, Some("Corp"))
            .unwrap();
        (db, seeker, employer)
    }

    #[test]
    fn test_signed_out_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (db, _, _) = seeded();
        let auth = LocalAuth::open(&dir.path().join("session.json")).unwrap();
        let store = SessionStore::init(&auth, &db).unwrap();

        let snap = store.snapshot();
        assert!(snap.user.is_none());
        assert!(!snap.loading);
        assert!(snap.is_seeker());
        assert!(!snap.is_employer());
        assert_eq!(snap.require_profile(), Err(AccessError::SignedOut));
    }

    #[test]
    fn test_session_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let (db, _, employer) = seeded();

        let auth = LocalAuth::open(&path).unwrap();
        let profile = db.get_profile(employer).unwrap().unwrap();
        auth.sign_in(&profile).unwrap();

        let reopened = LocalAuth::open(&path).unwrap();
        let store = SessionStore::init(&reopened, &db).unwrap();
        let snap = store.snapshot();
        assert!(snap.is_employer());
        assert!(!snap.is_seeker());
        assert_eq!(snap.require_employer("post jobs").unwrap().id, employer);
        assert_eq!(
            snap.require_seeker("apply"),
            Err(AccessError::SeekerOnly("apply"))
        );
    }

    #[test]
    fn test_refresh_follows_provider_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (db, seeker, _) = seeded();
        let auth = LocalAuth::open(&dir.path().join("session.json")).unwrap();
        let mut store = SessionStore::init(&auth, &db).unwrap();

        assert!(!store.refresh(&db).unwrap());

        let profile = db.get_profile(seeker).unwrap().unwrap();
        auth.sign_in(&profile).unwrap();
        assert_eq!(auth.current().map(|s| s.user_id), Some(seeker));
        assert!(store.refresh(&db).unwrap());
        assert_eq!(store.snapshot().profile.as_ref().map(|p| p.id), Some(seeker));

        auth.sign_out().unwrap();
        assert!(store.refresh(&db).unwrap());
        assert!(store.snapshot().user.is_none());
    }

    #[test]
    fn test_teardown_stops_following() {
        let dir = tempfile::tempdir().unwrap();
        let (db, seeker, _) = seeded();
        let auth = LocalAuth::open(&dir.path().join("session.json")).unwrap();
        let mut store = SessionStore::init(&auth, &db).unwrap();
        store.teardown();

        let profile = db.get_profile(seeker).unwrap().unwrap();
        auth.sign_in(&profile).unwrap();
        assert!(!store.refresh(&db).unwrap());
        assert!(store.snapshot().profile.is_none());
    }

    #[test]
    fn test_session_without_profile_reads_as_seeker() {
        let dir = tempfile::tempdir().unwrap();
        let (db, _, _) = seeded();
        let auth = LocalAuth::open(&dir.path().join("session.json")).unwrap();
        let ghost = Profile {
            id: 404,
            full_name: "Gone".into(),
            email: "gone@mail.com".into(),
            role: Role::Employer,
            company_name: None,
            created_at: String::new(),
        };
        auth.sign_in(&ghost).unwrap();
        let store = SessionStore::init(&auth, &db).unwrap();
        let snap = store.snapshot();
        assert!(snap.user.is_some());
        assert!(snap.profile.is_none());
        assert!(snap.is_seeker());
    }
}
