use reqwest::{
    Url,
    cookie::{CookieStore, Jar},
    header::HeaderValue,
};
use std::{collections::BTreeMap, sync::Mutex};

use crate::persistence::{PersistenceHandle, StoredCookie};

/// PersistentCookieJar
///
/// The API client's cookie store. Matching and expiry are left to reqwest's `Jar`;
/// on top of that every `Set-Cookie` the backend sends is recorded and mirrored to
/// the session's persistence, and replayed into the jar on startup. That keeps the
/// refresh cookie alive across a restart along with the session it belongs to.
pub struct PersistentCookieJar {
    jar: Jar,
    // Latest `Set-Cookie` per origin and cookie name.
    recorded: Mutex<BTreeMap<String, StoredCookie>>,
    persistence: Option<PersistenceHandle>,
}

impl PersistentCookieJar {
    /// A jar that only lives in memory.
    pub fn in_memory() -> Self {
        Self {
            jar: Jar::default(),
            recorded: Mutex::new(BTreeMap::new()),
            persistence: None,
        }
    }

    /// A jar seeded from, and mirrored to, `persistence`.
    pub fn restore(persistence: PersistenceHandle) -> Self {
        let stored = persistence.backend().load_cookies().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not restore cookies, starting without them");
            Vec::new()
        });

        let jar = Jar::default();
        let mut recorded = BTreeMap::new();
        for cookie in stored {
            let Ok(url) = Url::parse(&cookie.url) else {
                tracing::warn!(url = %cookie.url, "dropping stored cookie with a bad url");
                continue;
            };
            jar.add_cookie_str(&cookie.set_cookie, &url);
            if let Some(key) = record_key(&url, &cookie.set_cookie) {
                recorded.insert(key, cookie);
            }
        }
        tracing::debug!(cookies = recorded.len(), "cookies restored");

        Self {
            jar,
            recorded: Mutex::new(recorded),
            persistence: Some(persistence),
        }
    }

    /// Number of distinct cookies recorded so far.
    pub fn recorded(&self) -> usize {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl CookieStore for PersistentCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        self.jar.set_cookies(&mut headers.iter().copied(), url);

        let snapshot = {
            let mut recorded = self
                .recorded
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for raw in headers.iter().filter_map(|value| value.to_str().ok()) {
                if let Some(key) = record_key(url, raw) {
                    recorded.insert(
                        key,
                        StoredCookie {
                            url: url.to_string(),
                            set_cookie: raw.to_string(),
                        },
                    );
                }
            }
            recorded.values().cloned().collect::<Vec<_>>()
        };

        if let Some(persistence) = &self.persistence {
            persistence.save_cookies(snapshot);
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

fn record_key(url: &Url, set_cookie: &str) -> Option<String> {
    let name = set_cookie.split(';').next()?.split('=').next()?.trim();
    if name.is_empty() {
        return None;
    }
    Some(format!("{} {}", url.origin().ascii_serialization(), name))
}
