use incubator_admin::{
    MemorySessionStorage, PersistenceState, Session, SessionStore, models::Role,
};
use std::sync::Arc;

fn assert_signed_out(session: &Session) {
    assert!(!session.is_authenticated);
    assert_eq!(session.access_token, None);
    assert_eq!(session.role, None);
}

#[test]
fn test_logout_after_any_login_clears_everything() {
    let store = SessionStore::new();
    let logins = [
        ("T1", Role::Admin, Some(900)),
        ("T2", Role::Mentor, None),
        ("T3", Role::from("auditor"), Some(0)),
    ];

    for (token, role, expires_in) in logins {
        store.set_auth(token, role, expires_in);
        assert!(store.is_authenticated());
        store.logout();
        assert_signed_out(&store.snapshot());
        assert_eq!(store.snapshot().expires_in, None);
        assert_eq!(store.snapshot().issued_at, None);
    }
}

#[test]
fn test_set_auth_replaces_all_fields() {
    let store = SessionStore::new();
    store.set_auth("T1", Role::Admin, Some(900));
    store.set_auth("T2", Role::Startup, None);

    let session = store.snapshot();
    assert_eq!(session.access_token.as_deref(), Some("T2"));
    assert_eq!(session.role, Some(Role::Startup));
    assert_eq!(session.expires_in, None);
    assert!(session.is_authenticated);
    assert!(session.issued_at.is_some());
}

#[test]
fn test_every_login_and_logout_starts_a_new_generation() {
    let store = SessionStore::new();
    let start = store.generation();

    let first = store.set_auth("T1", Role::Admin, None);
    store.logout();
    let second = store.set_auth("T2", Role::Admin, None);

    assert_eq!(first, start + 1);
    assert_eq!(second, start + 3);
    assert_eq!(store.generation(), second);
}

#[test]
fn test_clones_share_the_same_session() {
    let store = SessionStore::new();
    let handle = store.clone();

    handle.set_auth("T1", Role::Admin, None);
    assert_eq!(store.access_token().as_deref(), Some("T1"));

    store.logout();
    assert!(!handle.is_authenticated());
}

#[tokio::test]
async fn test_subscribers_see_each_action() {
    let store = SessionStore::new();
    let mut changes = store.subscribe();

    store.set_auth("T1", Role::Admin, None);
    changes.changed().await.unwrap();
    assert!(changes.borrow_and_update().is_authenticated);

    store.logout();
    changes.changed().await.unwrap();
    assert!(!changes.borrow_and_update().is_authenticated);
}

#[test]
fn test_actions_are_mirrored_to_persistence() {
    let storage = Arc::new(MemorySessionStorage::new());
    let store = SessionStore::with_persistence(storage.clone() as PersistenceState);
    assert!(storage.raw().is_none());

    store.set_auth("T1", Role::Admin, Some(900));
    let saved = storage.raw().unwrap();
    assert!(saved.contains("\"accessToken\":\"T1\""));
    assert!(saved.contains("\"isAuthenticated\":true"));
    assert!(saved.contains("\"role\":\"admin\""));

    store.logout();
    let saved = storage.raw().unwrap();
    assert!(saved.contains("\"accessToken\":null"));
    assert!(saved.contains("\"isAuthenticated\":false"));
}

#[test]
fn test_rehydrates_before_first_read() {
    let storage = Arc::new(MemorySessionStorage::with_raw(
        r#"{"accessToken":"saved","role":"admin","isAuthenticated":true}"#,
    ));
    let store = SessionStore::with_persistence(storage as PersistenceState);

    assert!(store.is_authenticated());
    assert_eq!(store.access_token().as_deref(), Some("saved"));
    assert_eq!(store.role(), Some(Role::Admin));
}

#[test]
fn test_rehydration_rejects_sessions_breaking_the_invariant() {
    // Flag set but no role: cannot be trusted.
    let storage = Arc::new(MemorySessionStorage::with_raw(
        r#"{"accessToken":"saved","role":null,"isAuthenticated":true}"#,
    ));
    let store = SessionStore::with_persistence(storage as PersistenceState);

    assert_signed_out(&store.snapshot());
}

#[test]
fn test_unreadable_storage_starts_signed_out() {
    let storage = Arc::new(MemorySessionStorage::with_raw("{not json"));
    let store = SessionStore::with_persistence(storage as PersistenceState);

    assert_signed_out(&store.snapshot());
}

#[test]
fn test_unknown_roles_survive_persistence() {
    let storage = Arc::new(MemorySessionStorage::new());
    let store = SessionStore::with_persistence(storage.clone() as PersistenceState);
    store.set_auth("T1", Role::from("auditor"), None);

    let reloaded = SessionStore::with_persistence(storage as PersistenceState);
    assert_eq!(reloaded.role(), Some(Role::Other("auditor".to_string())));
}
