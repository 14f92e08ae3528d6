use incubator_admin::{
    FileSessionStorage, PersistenceState, SessionStore, StoredCookie,
    models::Role,
    persistence::{COOKIE_KEY, STORAGE_KEY, SessionPersistence},
};
use serde_json::Value;
use std::{fs, path::PathBuf, sync::Arc};

/// A fresh path per test under the system temp dir.
fn temp_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "incubator-admin-{}-{}.json",
        std::process::id(),
        name
    ));
    let _ = fs::remove_file(&path);
    path
}

fn read_document(path: &PathBuf) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_missing_file_loads_nothing() {
    let storage = FileSessionStorage::new(temp_file("missing"));
    assert!(storage.load().unwrap().is_none());
}

#[test]
fn test_session_survives_a_restart() {
    let path = temp_file("restart");

    let store = SessionStore::with_persistence(
        Arc::new(FileSessionStorage::new(&path)) as PersistenceState,
    );
    store.set_auth("T1", Role::Admin, Some(900));
    drop(store);

    let restarted = SessionStore::with_persistence(
        Arc::new(FileSessionStorage::new(&path)) as PersistenceState,
    );
    assert!(restarted.is_authenticated());
    assert_eq!(restarted.access_token().as_deref(), Some("T1"));
    assert_eq!(restarted.snapshot().expires_in, Some(900));

    restarted.logout();
    let after_logout = SessionStore::with_persistence(
        Arc::new(FileSessionStorage::new(&path)) as PersistenceState,
    );
    assert!(!after_logout.is_authenticated());

    let _ = fs::remove_file(&path);
}

#[test]
fn test_session_is_stored_under_its_key_next_to_other_entries() {
    let path = temp_file("shared-document");
    fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

    let store = SessionStore::with_persistence(
        Arc::new(FileSessionStorage::new(&path)) as PersistenceState,
    );
    store.set_auth("T1", Role::Admin, None);

    let document = read_document(&path);
    assert_eq!(document["theme"], "dark");
    assert_eq!(document[STORAGE_KEY]["accessToken"], "T1");
    assert_eq!(document[STORAGE_KEY]["role"], "admin");
    assert_eq!(document[STORAGE_KEY]["isAuthenticated"], true);

    let _ = fs::remove_file(&path);
}

#[test]
fn test_custom_key() {
    let path = temp_file("custom-key");
    let storage = FileSessionStorage::new(&path).with_key("incubator-auth");

    let store = SessionStore::with_persistence(Arc::new(storage) as PersistenceState);
    store.set_auth("T1", Role::Mentor, None);

    let document = read_document(&path);
    assert!(document.get(STORAGE_KEY).is_none());
    assert_eq!(document["incubator-auth"]["role"], "mentor");

    let _ = fs::remove_file(&path);
}

#[test]
fn test_corrupt_file_is_an_error_for_the_backend_but_not_for_the_store() {
    let path = temp_file("corrupt");
    fs::write(&path, "{ definitely not json").unwrap();

    let storage = FileSessionStorage::new(&path);
    assert!(storage.load().is_err());

    let store = SessionStore::with_persistence(Arc::new(storage) as PersistenceState);
    assert!(!store.is_authenticated());

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn test_writes_inside_a_runtime_land_in_order_after_flush() {
    let path = temp_file("writer-order");
    let store = SessionStore::with_persistence(
        Arc::new(FileSessionStorage::new(&path)) as PersistenceState,
    );

    store.set_auth("T1", Role::Admin, None);
    store.set_auth("T2", Role::Admin, None);
    store.logout();
    store.set_auth("T3", Role::Mentor, Some(900));
    store.flush().await;

    let document = read_document(&path);
    assert_eq!(document[STORAGE_KEY]["accessToken"], "T3");
    assert_eq!(document[STORAGE_KEY]["role"], "mentor");

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn test_session_and_cookies_share_one_document() {
    let path = temp_file("cookies-alongside");
    let storage = Arc::new(FileSessionStorage::new(&path)) as PersistenceState;
    let store = SessionStore::with_persistence(storage.clone());

    store.set_auth("T1", Role::Admin, None);
    let cookie = StoredCookie {
        url: "http://backend.test/api/user/login".to_string(),
        set_cookie: "rt=secret; Path=/".to_string(),
    };
    store
        .persistence()
        .unwrap()
        .save_cookies(vec![cookie.clone()]);
    store.flush().await;

    let document = read_document(&path);
    assert_eq!(document[STORAGE_KEY]["accessToken"], "T1");
    assert_eq!(document[COOKIE_KEY][0]["setCookie"], "rt=secret; Path=/");
    assert_eq!(storage.load_cookies().unwrap(), vec![cookie]);

    let _ = fs::remove_file(&path);
}
