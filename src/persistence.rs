use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};

use crate::{error::Result, session::Session};

/// Key the session lives under inside the storage document.
pub const STORAGE_KEY: &str = "auth-storage";

/// Key the backend's cookies (the refresh credential among them) live under.
pub const COOKIE_KEY: &str = "auth-cookies";

/// StoredCookie
///
/// A `Set-Cookie` value exactly as the backend sent it, with the URL of the response
/// that carried it. Replaying both into a fresh jar restores the cookie's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub url: String,
    pub set_cookie: String,
}

// 1. Persistence Contract
/// SessionPersistence
///
/// Durable storage for the session across restarts. The store calls `save` after
/// every mutation and `load` once, before anything else reads the session.
pub trait SessionPersistence: Send + Sync {
    fn load(&self) -> Result<Option<Session>>;
    fn save(&self, session: &Session) -> Result<()>;

    /// Cookies the backend set, so the refresh credential outlives a restart too.
    fn load_cookies(&self) -> Result<Vec<StoredCookie>>;
    fn save_cookies(&self, cookies: &[StoredCookie]) -> Result<()>;
}

pub type PersistenceState = Arc<dyn SessionPersistence>;

// 2. File-backed Implementation
/// FileSessionStorage
///
/// A JSON document mapping storage keys to values, the way browser storage is laid
/// out. Other keys in the same file are preserved on save.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
    key: String,
    cookie_key: String,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: STORAGE_KEY.to_string(),
            cookie_key: COOKIE_KEY.to_string(),
        }
    }

    /// Stores the session under `key` and the cookies under `{key}-cookies`.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self.cookie_key = format!("{}-cookies", self.key);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Map::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entry(&self, key: &str, value: Value) -> Result<()> {
        let mut document = self.read_document()?;
        document.insert(key.to_string(), value);

        // Write-then-rename so a crash never leaves a truncated document behind.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&document)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionPersistence for FileSessionStorage {
    fn load(&self) -> Result<Option<Session>> {
        let mut document = self.read_document()?;
        match document.remove(&self.key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        self.write_entry(&self.key, serde_json::to_value(session)?)
    }

    fn load_cookies(&self) -> Result<Vec<StoredCookie>> {
        let mut document = self.read_document()?;
        match document.remove(&self.cookie_key) {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        self.write_entry(&self.cookie_key, serde_json::to_value(cookies)?)
    }
}

// 3. In-memory Implementation
/// MemorySessionStorage
///
/// Keeps the serialized session in memory. Goes through serde like the file backend
/// so tests see the same round trip.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<String>>,
    cookies: Mutex<Vec<StoredCookie>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the slot with an already serialized session.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
            ..Self::default()
        }
    }

    /// The serialized form currently held.
    pub fn raw(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SessionPersistence for MemorySessionStorage {
    fn load(&self) -> Result<Option<Session>> {
        match self.raw() {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(raw);
        Ok(())
    }

    fn load_cookies(&self) -> Result<Vec<StoredCookie>> {
        Ok(self
            .cookies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        *self
            .cookies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = cookies.to_vec();
        Ok(())
    }
}

// 4. Background Writer
enum WriteCommand {
    Session(Session),
    Cookies(Vec<StoredCookie>),
    Flush(oneshot::Sender<()>),
}

/// PersistenceHandle
///
/// Front for a backend that moves the actual writes onto a writer task, so callers
/// only pay for a channel send. Writes are applied in the order they were queued.
///
/// Outside a tokio runtime there is nowhere to spawn the writer, and saves happen
/// inline instead.
#[derive(Clone)]
pub struct PersistenceHandle {
    backend: PersistenceState,
    writer: Option<mpsc::UnboundedSender<WriteCommand>>,
}

impl PersistenceHandle {
    pub fn new(backend: PersistenceState) -> Self {
        let writer = Handle::try_current().ok().map(|runtime| {
            let (tx, rx) = mpsc::unbounded_channel();
            runtime.spawn(run_writer(backend.clone(), rx));
            tx
        });
        Self { backend, writer }
    }

    pub fn backend(&self) -> &PersistenceState {
        &self.backend
    }

    pub fn save_session(&self, session: Session) {
        self.enqueue(WriteCommand::Session(session));
    }

    pub fn save_cookies(&self, cookies: Vec<StoredCookie>) {
        self.enqueue(WriteCommand::Cookies(cookies));
    }

    /// Resolves once every write queued before the call has reached the backend.
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if writer.send(WriteCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    fn enqueue(&self, command: WriteCommand) {
        let command = match &self.writer {
            Some(writer) => match writer.send(command) {
                Ok(()) => return,
                // The writer went away with its runtime.
                Err(mpsc::error::SendError(command)) => command,
            },
            None => command,
        };
        write(self.backend.as_ref(), command);
    }
}

async fn run_writer(backend: PersistenceState, mut rx: mpsc::UnboundedReceiver<WriteCommand>) {
    while let Some(command) = rx.recv().await {
        let backend = backend.clone();
        let done = tokio::task::spawn_blocking(move || write(backend.as_ref(), command)).await;
        if let Err(e) = done {
            tracing::error!(error = %e, "session writer task failed");
        }
    }
}

fn write(backend: &dyn SessionPersistence, command: WriteCommand) {
    let outcome = match command {
        WriteCommand::Session(session) => backend.save(&session),
        WriteCommand::Cookies(cookies) => backend.save_cookies(&cookies),
        WriteCommand::Flush(done) => {
            let _ = done.send(());
            Ok(())
        }
    };
    if let Err(e) = outcome {
        tracing::warn!(error = %e, "failed to persist session state");
    }
}
