//! Shared, async-friendly handle around a [`TagIndex`].
//!
//! The index itself is single-writer. Writers first take the `writer` mutex,
//! which a full rebuild holds from the start of its scan until the new index
//! is installed, so no mutation can land between the two and be overwritten.
//! Readers only need the `RwLock`: the scan runs on a blocking thread and the
//! finished index is swapped in under one write lock, so readers see either
//! the old index or the new one, never a partial scan.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::TagIndexConfig;
use crate::search::events::IndexMeta;
use crate::search::fuzzy::{TagCount, TagSearchResult};
use crate::search::{scan, TagIndex};
use crate::store::ContentStore;

#[derive(Clone)]
pub struct SharedTagIndex {
    inner: Arc<RwLock<TagIndex>>,
    writer: Arc<Mutex<()>>,
    store: Arc<dyn ContentStore>,
    root: String,
    config: TagIndexConfig,
}

impl SharedTagIndex {
    pub fn new(index: TagIndex, store: Arc<dyn ContentStore>, root: impl Into<String>) -> Self {
        let config = index.config().clone();
        Self {
            inner: Arc::new(RwLock::new(index)),
            writer: Arc::new(Mutex::new(())),
            store,
            root: root.into(),
            config,
        }
    }

    pub fn config(&self) -> &TagIndexConfig {
        &self.config
    }

    /// Direct access for callers that need several reads under one lock
    pub fn handle(&self) -> Arc<RwLock<TagIndex>> {
        Arc::clone(&self.inner)
    }

    /// Full rebuild; the current index keeps serving reads until the scan is
    /// done. Mutations issued meanwhile wait and apply on top of the new index.
    pub async fn rebuild(&self) -> Result<(), String> {
        let _writer = self.writer.lock().await;
        self.scan_and_install().await
    }

    async fn scan_and_install(&self) -> Result<(), String> {
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let config = self.config.clone();

        let data = tokio::task::spawn_blocking(move || scan(store.as_ref(), &root, &config))
            .await
            .map_err(|e| format!("Rebuild task failed: {}", e))??;

        self.inner.write().await.install(data);
        Ok(())
    }

    /// Load the persisted index and rebuild the search structure from it.
    /// Falls back to a full rebuild when nothing usable was persisted or the
    /// copy is stale. Returns `true` when the persisted copy was kept.
    pub async fn restore_or_build(&self) -> Result<bool, String> {
        let _writer = self.writer.lock().await;
        let restored = {
            let mut index = self.inner.write().await;
            if index.load() {
                index.rebuild_search();
                !index.needs_rebuild()
            } else {
                false
            }
        };

        if restored {
            return Ok(true);
        }
        log::info!("[TagIndex] No fresh persisted index, rebuilding");
        self.scan_and_install().await?;
        Ok(false)
    }

    pub async fn update_document(&self, doc: &str, content: &str) {
        let _writer = self.writer.lock().await;
        self.inner.write().await.update_document(doc, content);
    }

    pub async fn remove_document(&self, doc: &str) {
        let _writer = self.writer.lock().await;
        self.inner.write().await.remove_document(doc);
    }

    pub async fn rename_document(&self, old_doc: &str, new_doc: &str) {
        let _writer = self.writer.lock().await;
        self.inner.write().await.rename_document(old_doc, new_doc);
    }

    /// Re-read one document from the content store (removes it if gone)
    pub async fn index_document(&self, doc: &str) -> Result<(), String> {
        // Read under the writer guard so a rebuild cannot install older content
        let _writer = self.writer.lock().await;
        let store = Arc::clone(&self.store);
        let doc_owned = doc.to_string();
        let read = tokio::task::spawn_blocking(move || store.read(&doc_owned))
            .await
            .map_err(|e| format!("Read task failed: {}", e))?;

        let mut index = self.inner.write().await;
        match read {
            Ok(content) => index.update_document(doc, &content),
            Err(e) if e.is_not_found() => index.remove_document(doc),
            Err(e) => return Err(format!("Failed to read {}: {}", doc, e)),
        }
        Ok(())
    }

    pub async fn search(&self, query: &str) -> Vec<TagSearchResult> {
        self.inner.read().await.search(query)
    }

    pub async fn all_ranked_by_count(&self) -> Vec<TagCount> {
        self.inner.read().await.all_ranked_by_count()
    }

    pub async fn files_for_tag(&self, tag: &str) -> Vec<String> {
        self.inner.read().await.files_for_tag(tag).to_vec()
    }

    pub async fn meta(&self) -> IndexMeta {
        self.inner.read().await.meta()
    }

    // Blocking variants for plain threads (the vault watcher). Must not be
    // called from inside the async runtime.

    pub fn index_document_blocking(&self, doc: &str) -> Result<(), String> {
        let _writer = self.writer.blocking_lock();
        let read = self.store.read(doc);
        let mut index = self.inner.blocking_write();
        match read {
            Ok(content) => index.update_document(doc, &content),
            Err(e) if e.is_not_found() => index.remove_document(doc),
            Err(e) => return Err(format!("Failed to read {}: {}", doc, e)),
        }
        Ok(())
    }

    pub fn remove_document_blocking(&self, doc: &str) {
        let _writer = self.writer.blocking_lock();
        self.inner.blocking_write().remove_document(doc);
    }

    pub fn rename_document_blocking(&self, old_doc: &str, new_doc: &str) {
        let _writer = self.writer.blocking_lock();
        self.inner.blocking_write().rename_document(old_doc, new_doc);
    }
}
