use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::LoadError;

pub const BLOB_SCHEME: &str = "blob:marginalia/";

/// A temporary URL naming bytes held by a [`ResourceRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    live: HashMap<String, Arc<[u8]>>,
}

/// Shared table of live object URLs. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Vec<u8>) -> ObjectUrl {
        let mut inner = self.lock();
        inner.next_id += 1;
        let url = format!("{BLOB_SCHEME}{}", inner.next_id);
        tracing::debug!(url = %url, bytes = bytes.len(), "object url created");
        inner.live.insert(url.clone(), Arc::from(bytes));
        ObjectUrl(url)
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.lock().live.get(url).cloned()
    }

    /// Returns `false` if the URL was already revoked or never existed.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let revoked = self.lock().live.remove(url.as_str()).is_some();
        if revoked {
            tracing::debug!(url = %url, "object url revoked");
        }
        revoked
    }

    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        self.lock().live.contains_key(url.as_str())
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Resolves `blob:` URLs through the registry and anything else as a
    /// file path.
    pub async fn fetch(&self, url: &str) -> Result<Arc<[u8]>, LoadError> {
        if url.starts_with(BLOB_SCHEME) {
            return self.resolve(url).ok_or_else(|| LoadError::Unreachable {
                url: url.to_owned(),
                reason: "object url is not live".to_owned(),
            });
        }

        let path = url.to_owned();
        let read = tokio::task::spawn_blocking(move || std::fs::read(&path)).await;
        match read {
            Ok(Ok(bytes)) => Ok(Arc::from(bytes)),
            Ok(Err(err)) => Err(LoadError::Unreachable { url: url.to_owned(), reason: err.to_string() }),
            Err(err) => Err(LoadError::Unreachable {
                url: url.to_owned(),
                reason: format!("read task failed: {err}"),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
