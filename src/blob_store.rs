use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, Weak},
};

use log::debug;

pub const BLOB_SCHEME: &str = "blob:";

pub struct Blob {
    url: String,
    mime: &'static str,
    bytes: Vec<u8>,
}

impl Blob {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        debug!("Released {} ({} bytes)", self.url, self.bytes.len());
    }
}

/// Shared handle to encoded bytes minted by a [`BlobStore`].
///
/// Cloning a handle keeps the storage alive; the bytes are freed once the
/// last handle is dropped. Equality is by URL.
#[derive(Clone)]
pub struct BlobRef(Arc<Blob>);

impl BlobRef {
    pub fn url(&self) -> &str {
        self.0.url()
    }

    pub fn mime(&self) -> &'static str {
        self.0.mime()
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.bytes()
    }

    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }
}

impl PartialEq for BlobRef {
    fn eq(&self, other: &Self) -> bool {
        self.url() == other.url()
    }
}

impl Eq for BlobRef {}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobRef")
            .field("url", &self.url())
            .field("mime", &self.mime())
            .field("len", &self.len())
            .finish()
    }
}

#[derive(Default)]
struct StoreInner {
    next_id: u64,
    entries: HashMap<String, Weak<Blob>>,
}

impl StoreInner {
    fn purge(&mut self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }
}

/// Table of `blob:` URLs, cheap to clone and share across worker threads.
#[derive(Clone, Default)]
pub struct BlobStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Vec<u8>, mime: &'static str) -> BlobRef {
        let mut inner = self.lock();
        inner.purge();
        inner.next_id += 1;
        let url = format!("{BLOB_SCHEME}cutout/{}", inner.next_id);
        let blob = Arc::new(Blob {
            url: url.clone(),
            mime,
            bytes,
        });
        inner.entries.insert(url, Arc::downgrade(&blob));
        BlobRef(blob)
    }

    /// Looks up a live blob by URL. Revoked or released URLs resolve to `None`.
    pub fn resolve(&self, url: &str) -> Option<BlobRef> {
        let inner = self.lock();
        inner.entries.get(url).and_then(Weak::upgrade).map(BlobRef)
    }

    /// Forgets the URL. Existing handles keep their bytes until dropped.
    pub fn revoke(&self, url: &str) -> bool {
        self.lock().entries.remove(url).is_some()
    }

    /// Number of blobs that still have at least one live handle.
    pub fn live_count(&self) -> usize {
        let mut inner = self.lock();
        inner.purge();
        inner.entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStore")
            .field("live", &self.live_count())
            .finish()
    }
}
