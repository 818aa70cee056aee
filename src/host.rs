//! Host environment abstractions for orbit-link clients.
//!
//! The session subsystem never touches ambient globals directly. Location
//! access, cookie-visible markers, and durable key-value persistence are
//! injected through the traits here, so the core logic runs identically in
//! a browser-like host, a desktop app, or a test harness.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{OrbitLinkError, Result};

/// Trait for durable key-value storage backends.
///
/// Implementations can store values in web storage, files, secure
/// keychains, or any other mechanism. Values are opaque strings; the
/// session stores serialize their own records.
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value. Returns `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, overwriting any existing one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Returns `Ok(())` even if the key was absent.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Trait for client-visible cookie markers.
///
/// Only non-sensitive values go through this store (the auth flag and the
/// CSRF token), never the access token itself. Failures here must not
/// break session operations, so the interface is infallible.
pub trait CookieStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn remove(&self, name: &str);
}

/// Trait exposing the host's addressable location, when one exists.
///
/// Non-browser hosts return `None` from [`current_url`](Self::current_url)
/// and the redirect-callback path becomes a no-op.
pub trait HostEnvironment: Send + Sync {
    /// The current location as an absolute URL, if the host has one.
    fn current_url(&self) -> Option<String>;

    /// Replace the current location without adding a history entry.
    fn replace_url(&self, url: &str);
}

/// In-memory key-value store for testing and non-persistent hosts.
///
/// Does NOT survive restarts.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// File-backed key-value store for CLI and desktop hosts.
///
/// Persists entries as a single JSON object. On Unix the file is created
/// with 0600 permissions. A corrupt or unreadable file is treated as empty
/// rather than an error.
#[derive(Debug)]
pub struct FileKeyValueStore {
    file_path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        let cache = match fs::read_to_string(&file_path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::warn!(
                    "[STORE] Ignoring corrupt store file {}: {}",
                    file_path.display(),
                    e
                );
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Ok(Self {
            file_path,
            cache: Mutex::new(cache),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| OrbitLinkError::StorageError(e.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        fs::write(&self.file_path, contents)
            .map_err(|e| OrbitLinkError::StorageError(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.file_path, perms)
                .map_err(|e| OrbitLinkError::StorageError(e.to_string()))?;
        }

        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(key.to_string(), value.to_string());
        self.persist(&cache)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        cache.remove(key);
        self.persist(&cache)
    }
}

/// In-memory cookie jar for testing and non-browser hosts.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, String>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.cookies
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str) {
        self.cookies.lock().unwrap().remove(name);
    }
}

/// In-memory host location for testing and non-browser hosts.
#[derive(Debug, Default)]
pub struct MemoryHost {
    url: Mutex<Option<String>>,
}

impl MemoryHost {
    /// A host with no addressable location.
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose location is pre-set, simulating a redirect landing.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Mutex::new(Some(url.into())),
        }
    }
}

impl HostEnvironment for MemoryHost {
    fn current_url(&self) -> Option<String> {
        self.url.lock().unwrap().clone()
    }

    fn replace_url(&self, url: &str) {
        *self.url.lock().unwrap() = Some(url.to_string());
    }
}
