use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::{
    models::{Role, TokenGrant},
    persistence::{PersistenceHandle, PersistenceState},
};

/// Session
///
/// The only entity the dashboard keeps client-side. It is created or overwritten
/// wholesale by a login or a refresh, and cleared wholesale by logout.
///
/// `is_authenticated` holds exactly when both `access_token` and `role` are present.
/// The store's two actions are the only writers, and both keep that true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: Option<String>,
    pub role: Option<Role>,
    pub is_authenticated: bool,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    /// Bumped when a session starts or ends. Refreshes keep it.
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl Session {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the server says the current token stops being valid, if it said at all.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let issued_at = self.issued_at?;
        let secs = i64::try_from(self.expires_in?).ok()?;
        issued_at.checked_add_signed(ChronoDuration::seconds(secs))
    }

    /// Rehydrated data is only trusted when it satisfies the authentication invariant.
    fn normalized(self) -> Self {
        match (&self.access_token, &self.role) {
            (Some(_), Some(_)) => Self {
                is_authenticated: true,
                ..self
            },
            _ => Self::default(),
        }
    }
}

struct Inner {
    state: watch::Sender<Session>,
    persistence: Option<PersistenceHandle>,
}

/// SessionStore
///
/// Single source of truth for the session. Cloning the store clones the handle, not
/// the data: every clone observes and mutates the same session. Components receive
/// it by injection instead of reaching for a global.
///
/// Mutation goes through `set_auth` and `logout` only. The scheduler additionally uses
/// the generation-checked `apply_refresh` and `end_session`.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// An empty, unpersisted store.
    pub fn new() -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(Inner {
                state,
                persistence: None,
            }),
        }
    }

    /// with_persistence
    ///
    /// Rehydrates from `backend` before returning and mirrors every later mutation to it.
    /// A backend that cannot be read yields an empty session rather than a failed start.
    /// Inside a tokio runtime the mirroring happens on a writer task; see `flush`.
    pub fn with_persistence(backend: PersistenceState) -> Self {
        let mut session = match backend.load() {
            Ok(Some(saved)) => saved.normalized(),
            Ok(None) => Session::default(),
            Err(e) => {
                tracing::warn!(error = %e, "could not rehydrate session, starting signed out");
                Session::default()
            }
        };

        if session.is_authenticated {
            session.generation = 1;
            tracing::info!(role = ?session.role, "session rehydrated");
        }

        let (state, _) = watch::channel(session);
        Self {
            inner: Arc::new(Inner {
                state,
                persistence: Some(PersistenceHandle::new(backend)),
            }),
        }
    }

    // --- Actions ---

    /// set_auth
    ///
    /// Starts a new session from a token the server just issued. All fields are
    /// replaced. No validation of the token or the expiry is performed.
    /// Returns the new generation.
    pub fn set_auth(
        &self,
        access_token: impl Into<String>,
        role: Role,
        expires_in: Option<u64>,
    ) -> u64 {
        let access_token = access_token.into();
        let mut generation = 0;
        self.inner.state.send_modify(|session| {
            generation = session.generation + 1;
            *session = Session {
                access_token: Some(access_token),
                role: Some(role),
                is_authenticated: true,
                expires_in,
                issued_at: Some(Utc::now()),
                generation,
            };
            self.persist(session);
        });
        tracing::debug!(generation, "session authenticated");
        generation
    }

    /// logout
    ///
    /// Clears the session locally. The server is not contacted here.
    pub fn logout(&self) {
        self.inner.state.send_modify(|session| {
            *session = Session {
                generation: session.generation + 1,
                ..Session::default()
            };
            self.persist(session);
        });
        tracing::debug!("session cleared");
    }

    /// apply_refresh
    ///
    /// Writes a refreshed token into the session, but only while the session that
    /// asked for it is still the current one. Returns whether the grant was applied.
    pub(crate) fn apply_refresh(&self, generation: u64, grant: TokenGrant) -> bool {
        self.inner.state.send_if_modified(|session| {
            if !session.is_authenticated || session.generation != generation {
                return false;
            }
            session.access_token = Some(grant.access_token);
            session.role = Some(grant.role);
            session.expires_in = grant.expires_in;
            session.issued_at = Some(Utc::now());
            self.persist(session);
            true
        })
    }

    /// end_session
    ///
    /// Logs out only if `generation` is still current.
    pub(crate) fn end_session(&self, generation: u64) -> bool {
        self.inner.state.send_if_modified(|session| {
            if !session.is_authenticated || session.generation != generation {
                return false;
            }
            *session = Session {
                generation: generation + 1,
                ..Session::default()
            };
            self.persist(session);
            true
        })
    }

    // --- Readers ---

    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// The token as of this instant. Callers must not hold on to it across requests.
    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn role(&self) -> Option<Role> {
        self.inner.state.borrow().role.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.borrow().generation
    }

    /// Change feed. The receiver starts out having seen the current value.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Where the session is mirrored, if anywhere. The API client keeps its cookies there too.
    pub fn persistence(&self) -> Option<&PersistenceHandle> {
        self.inner.persistence.as_ref()
    }

    /// Waits until every mutation so far has been written to the backend.
    pub async fn flush(&self) {
        if let Some(persistence) = &self.inner.persistence {
            persistence.flush().await;
        }
    }

    // Called with the channel's write lock held, so queue order matches mutation order.
    fn persist(&self, session: &Session) {
        if let Some(persistence) = &self.inner.persistence {
            persistence.save_session(session.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizing_drops_half_populated_sessions() {
        let token_only = Session {
            access_token: Some("t".into()),
            is_authenticated: true,
            ..Session::default()
        };
        assert_eq!(token_only.normalized(), Session::default());

        let complete = Session {
            access_token: Some("t".into()),
            role: Some(Role::Admin),
            is_authenticated: false,
            ..Session::default()
        };
        assert!(complete.normalized().is_authenticated);
    }

    #[test]
    fn expires_at_needs_both_stamp_and_lifetime() {
        let issued = Utc::now();
        let session = Session {
            issued_at: Some(issued),
            expires_in: Some(900),
            ..Session::default()
        };
        assert_eq!(session.expires_at(), Some(issued + ChronoDuration::seconds(900)));

        let no_lifetime = Session {
            issued_at: Some(issued),
            ..Session::default()
        };
        assert_eq!(no_lifetime.expires_at(), None);
    }

    #[test]
    fn stale_generation_cannot_refresh() {
        let store = SessionStore::new();
        let first = store.set_auth("T1", Role::Admin, None);
        store.logout();
        store.set_auth("T3", Role::Admin, None);

        let applied = store.apply_refresh(first, TokenGrant::new("T2", Role::Admin, None));

        assert!(!applied);
        assert_eq!(store.access_token().as_deref(), Some("T3"));
    }

    #[test]
    fn end_session_ignores_newer_sessions() {
        let store = SessionStore::new();
        let first = store.set_auth("T1", Role::Admin, None);
        let second = store.set_auth("T2", Role::Admin, None);

        assert!(!store.end_session(first));
        assert!(store.is_authenticated());
        assert!(store.end_session(second));
        assert!(!store.is_authenticated());
    }
}
