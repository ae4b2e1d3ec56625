pub mod events;
pub mod fuzzy;
pub mod parser;
pub mod persistence;
pub mod watcher;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::TagIndexConfig;
use crate::store::{child_path, ContentStore, EntryKind, StoreError};

use events::{EventNotifier, IndexMeta, NoopNotifier, ReindexEvent, ReindexKind};
use fuzzy::{TagCount, TagSearch, TagSearchResult};
use parser::extract_tags;
use persistence::{IndexPersistence, KeyValueStore, MemoryStore};

const JOURNAL_PREFIX: &str = "journal";

/// Composite id of a journal entry that lives inside a per-day file
pub fn journal_doc_id(date: &str, entry_id: &str) -> String {
    format!("{}:{}:{}", JOURNAL_PREFIX, date, entry_id)
}

/// Split `journal:<date>:<entryId>` back into `(date, entry_id)`
pub fn parse_journal_doc_id(doc: &str) -> Option<(&str, &str)> {
    let rest = doc.strip_prefix(JOURNAL_PREFIX)?.strip_prefix(':')?;
    let (date, entry_id) = rest.split_once(':')?;
    if date.is_empty() || entry_id.is_empty() {
        return None;
    }
    Some((date, entry_id))
}

/// The three co-maintained structures.
///
/// `files` and `tags` are inverses of each other; `all_tags` is derived
/// from `tags`. A tag key only exists while at least one document uses it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexData {
    pub files: BTreeMap<String, Vec<String>>,
    pub tags: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub all_tags: Vec<TagCount>,
}

impl IndexData {
    fn recompute_all_tags(&mut self) {
        self.all_tags = self
            .tags
            .iter()
            .map(|(tag, docs)| TagCount {
                tag: tag.clone(),
                count: docs.len(),
            })
            .collect();
    }

    /// Record `doc` under `tags`. Returns tags whose bucket was created.
    fn attach(&mut self, doc: &str, tags: Vec<String>) -> Vec<String> {
        let mut created = Vec::new();
        for tag in &tags {
            let bucket = self.tags.entry(tag.clone()).or_insert_with(|| {
                created.push(tag.clone());
                Vec::new()
            });
            if !bucket.iter().any(|d| d == doc) {
                bucket.push(doc.to_string());
            }
        }
        self.files.insert(doc.to_string(), tags);
        created
    }

    /// Drop `doc` from every bucket and from `files`. Returns tags whose bucket emptied.
    fn detach(&mut self, doc: &str) -> Vec<String> {
        let mut emptied = Vec::new();
        let Some(old_tags) = self.files.remove(doc) else {
            return emptied;
        };
        for tag in old_tags {
            if let Some(bucket) = self.tags.get_mut(&tag) {
                bucket.retain(|d| d != doc);
                if bucket.is_empty() {
                    self.tags.remove(&tag);
                    emptied.push(tag);
                }
            }
        }
        emptied
    }

    /// First violated invariant, if any
    pub fn verify(&self) -> Result<(), String> {
        for (doc, tags) in &self.files {
            if tags.is_empty() {
                return Err(format!("document {} is indexed with no tags", doc));
            }
            for (i, tag) in tags.iter().enumerate() {
                if tags[..i].contains(tag) {
                    return Err(format!("document {} lists tag {} twice", doc, tag));
                }
                let listed = self.tags.get(tag).map(|docs| docs.contains(doc)).unwrap_or(false);
                if !listed {
                    return Err(format!("tag {} is missing document {}", tag, doc));
                }
            }
        }

        for (tag, docs) in &self.tags {
            if docs.is_empty() {
                return Err(format!("tag {} has an empty bucket", tag));
            }
            for (i, doc) in docs.iter().enumerate() {
                if docs[..i].contains(doc) {
                    return Err(format!("tag {} lists document {} twice", tag, doc));
                }
                let listed = self.files.get(doc).map(|tags| tags.contains(tag)).unwrap_or(false);
                if !listed {
                    return Err(format!("document {} is missing tag {}", doc, tag));
                }
            }
        }

        let mut derived = self.clone();
        derived.recompute_all_tags();
        if derived.all_tags != self.all_tags {
            return Err("all_tags is out of date".to_string());
        }
        Ok(())
    }
}

/// Order-preserving de-duplication of a document's tag list
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Elements of `a` that are not in `b`
fn difference(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|t| !b.contains(t)).cloned().collect()
}

/// Scan every document under `root` into a fresh [`IndexData`].
///
/// Only the first `config.prefix_bytes` of each document are read. A failing
/// document or sub-directory is logged and skipped; only a failure to list
/// `root` itself is returned.
pub fn scan(store: &dyn ContentStore, root: &str, config: &TagIndexConfig) -> Result<IndexData, String> {
    let mut data = IndexData::default();
    let mut skipped = 0usize;

    scan_dir(store, root, config, &mut data, &mut skipped)
        .map_err(|e| format!("Failed to list {:?}: {}", root, e))?;
    data.recompute_all_tags();

    if skipped > 0 {
        log::warn!("[TagIndex] Skipped {} unreadable entries during scan", skipped);
    }
    Ok(data)
}

fn scan_dir(
    store: &dyn ContentStore,
    dir: &str,
    config: &TagIndexConfig,
    data: &mut IndexData,
    skipped: &mut usize,
) -> Result<(), StoreError> {
    for entry in store.list_children(dir)? {
        let path = child_path(dir, &entry.name);
        match entry.kind {
            EntryKind::Directory => {
                if config.is_skipped_dir(&entry.name) {
                    continue;
                }
                if let Err(e) = scan_dir(store, &path, config, data, skipped) {
                    log::warn!("[TagIndex] Skipping directory {}: {}", path, e);
                    *skipped += 1;
                }
            }
            EntryKind::File => {
                if !config.is_document(&entry.name) {
                    continue;
                }
                match store.read_prefix(&path, config.prefix_bytes) {
                    Ok(content) => {
                        let tags = dedup_tags(extract_tags(&content));
                        if !tags.is_empty() {
                            data.attach(&path, tags);
                        }
                    }
                    Err(e) if e.is_skippable() => {
                        log::warn!("[TagIndex] Skipping {}: {}", path, e);
                        *skipped += 1;
                    }
                    Err(e) => {
                        log::error!("[TagIndex] Failed to read {}: {}", path, e);
                        *skipped += 1;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Bidirectional document <-> tag index with fuzzy tag search.
///
/// Single writer: every mutating method takes `&mut self` and runs to
/// completion before returning, so no caller can observe a torn index.
pub struct TagIndex {
    data: IndexData,
    meta: IndexMeta,
    search: TagSearch,
    persistence: IndexPersistence,
    notifier: Box<dyn EventNotifier>,
    clock: Arc<dyn Clock>,
    config: TagIndexConfig,
}

impl TagIndex {
    pub fn new(
        config: TagIndexConfig,
        kv_store: Box<dyn KeyValueStore>,
        notifier: Box<dyn EventNotifier>,
    ) -> Self {
        let persistence = IndexPersistence::new(kv_store, config.storage_key.clone());
        Self {
            data: IndexData::default(),
            meta: IndexMeta::default(),
            search: TagSearch::new(config.search_threshold),
            persistence,
            notifier,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Default config, in-memory persistence and no listeners
    pub fn in_memory() -> Self {
        Self::new(
            TagIndexConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(NoopNotifier),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TagIndexConfig {
        &self.config
    }

    // ---- full rebuild ----

    /// Destructive rebuild from every document under `root`.
    ///
    /// The previous index stays in place until the scan has finished.
    pub fn build(&mut self, store: &dyn ContentStore, root: &str) -> Result<(), String> {
        log::info!("[TagIndex] Starting full rebuild of {:?}", root);
        let data = scan(store, root, &self.config)?;
        self.install(data);
        Ok(())
    }

    /// Replace the whole index with a finished scan
    pub fn install(&mut self, mut data: IndexData) {
        data.recompute_all_tags();
        self.data = data;
        self.search.rebuild_from(&self.data.all_tags);
        self.refresh_meta();
        self.persist();

        log::info!(
            "[TagIndex] Full rebuild completed: {} files, {} tags",
            self.meta.file_count,
            self.meta.tag_count
        );

        let event = ReindexEvent::new(ReindexKind::Full, self.meta)
            .files_added(self.data.files.keys().cloned().collect())
            .tags_added(self.data.tags.keys().cloned().collect());
        self.notifier.notify(&event);
    }

    // ---- incremental operations ----

    /// Re-derive the tags of one document from its new content
    pub fn update_document(&mut self, doc: &str, content: &str) {
        let had_tags = self.data.files.contains_key(doc);
        let emptied = self.data.detach(doc);

        let new_tags = dedup_tags(extract_tags(content));
        let has_tags = !new_tags.is_empty();
        let created = if has_tags {
            self.data.attach(doc, new_tags)
        } else {
            Vec::new()
        };

        self.after_membership_change();

        let mut event = ReindexEvent::new(ReindexKind::Update, self.meta)
            .tags_added(difference(&created, &emptied))
            .tags_removed(difference(&emptied, &created));
        if !had_tags && has_tags {
            event = event.files_added(vec![doc.to_string()]);
        }
        if had_tags && !has_tags {
            event = event.files_removed(vec![doc.to_string()]);
        }
        self.notifier.notify(&event);
    }

    /// Drop a document. Absent documents are a silent no-op.
    pub fn remove_document(&mut self, doc: &str) {
        if !self.data.files.contains_key(doc) {
            return;
        }
        let emptied = self.data.detach(doc);
        self.after_membership_change();

        let event = ReindexEvent::new(ReindexKind::Remove, self.meta)
            .files_removed(vec![doc.to_string()])
            .tags_removed(emptied);
        self.notifier.notify(&event);
    }

    /// Move a document's tags to a new id, keeping each bucket's order.
    ///
    /// The tag set is unchanged, so `all_tags` and the search index are left
    /// alone unless `new_doc` was itself indexed and had to be displaced.
    pub fn rename_document(&mut self, old_doc: &str, new_doc: &str) {
        if old_doc == new_doc || !self.data.files.contains_key(old_doc) {
            return;
        }

        let displaced = self.data.files.contains_key(new_doc);
        let emptied = if displaced {
            self.data.detach(new_doc)
        } else {
            Vec::new()
        };

        let tags = self.data.files.remove(old_doc).unwrap_or_default();
        for tag in &tags {
            if let Some(bucket) = self.data.tags.get_mut(tag) {
                if let Some(pos) = bucket.iter().position(|d| d == old_doc) {
                    bucket[pos] = new_doc.to_string();
                }
            }
        }
        self.data.files.insert(new_doc.to_string(), tags);

        if displaced {
            self.after_membership_change();
        } else {
            self.refresh_meta();
            self.persist();
        }

        let event = ReindexEvent::new(ReindexKind::Rename, self.meta)
            .files_added(vec![new_doc.to_string()])
            .files_removed(vec![old_doc.to_string()])
            .tags_removed(emptied);
        self.notifier.notify(&event);
    }

    /// Read a document through the content store and update it; a missing
    /// document is removed from the index.
    pub fn index_document(&mut self, store: &dyn ContentStore, doc: &str) -> Result<(), String> {
        match store.read(doc) {
            Ok(content) => {
                self.update_document(doc, &content);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.remove_document(doc);
                Ok(())
            }
            Err(e) => Err(format!("Failed to read {}: {}", doc, e)),
        }
    }

    pub fn update_journal_entry(&mut self, date: &str, entry_id: &str, content: &str) {
        self.update_document(&journal_doc_id(date, entry_id), content);
    }

    pub fn remove_journal_entry(&mut self, date: &str, entry_id: &str) {
        self.remove_document(&journal_doc_id(date, entry_id));
    }

    /// Remove every journal entry of `date` with a single notification
    pub fn remove_journal_day(&mut self, date: &str) {
        let docs: Vec<String> = self
            .data
            .files
            .keys()
            .filter(|doc| matches!(parse_journal_doc_id(doc), Some((d, _)) if d == date))
            .cloned()
            .collect();
        if docs.is_empty() {
            return;
        }

        let mut emptied = Vec::new();
        for doc in &docs {
            emptied.extend(self.data.detach(doc));
        }
        self.after_membership_change();

        let event = ReindexEvent::new(ReindexKind::Remove, self.meta)
            .files_removed(docs)
            .tags_removed(emptied);
        self.notifier.notify(&event);
    }

    /// Empty everything in memory. Nothing is persisted or emitted.
    pub fn reset(&mut self) {
        self.data = IndexData::default();
        self.meta = IndexMeta::default();
        self.search.clear();
    }

    // ---- queries ----

    pub fn files_for_tag(&self, tag: &str) -> &[String] {
        self.data.tags.get(tag).map(|docs| docs.as_slice()).unwrap_or(&[])
    }

    pub fn tags_for_file(&self, doc: &str) -> &[String] {
        self.data.files.get(doc).map(|tags| tags.as_slice()).unwrap_or(&[])
    }

    pub fn all_tags(&self) -> &[TagCount] {
        &self.data.all_tags
    }

    /// Tags in use that start with `prefix` (e.g. a task tag family)
    pub fn tags_with_prefix(&self, prefix: &str) -> Vec<String> {
        parser::tags_with_prefix(self.data.tags.keys(), prefix)
    }

    pub fn data(&self) -> &IndexData {
        &self.data
    }

    pub fn meta(&self) -> IndexMeta {
        self.meta
    }

    pub fn file_count(&self) -> usize {
        self.data.files.len()
    }

    pub fn tag_count(&self) -> usize {
        self.data.tags.len()
    }

    pub fn search(&self, query: &str) -> Vec<TagSearchResult> {
        self.search.search(query)
    }

    pub fn all_ranked_by_count(&self) -> Vec<TagCount> {
        self.search.all_ranked_by_count()
    }

    pub fn is_search_built(&self) -> bool {
        self.search.is_built()
    }

    // ---- persistence ----

    pub fn save(&self) -> bool {
        self.persistence.save(&self.data, &self.meta)
    }

    /// Replace the in-memory index with the persisted copy.
    ///
    /// The search index is NOT rebuilt; call [`TagIndex::rebuild_search`]
    /// after a successful load.
    pub fn load(&mut self) -> bool {
        match self.persistence.load() {
            Some((mut data, meta)) => {
                // Older blobs may lack `allTags`; it is always derivable from `tags`
                data.recompute_all_tags();
                self.data = data;
                self.meta = meta;
                log::info!(
                    "[TagIndex] Loaded persisted index: {} files, {} tags",
                    meta.file_count,
                    meta.tag_count
                );
                true
            }
            None => false,
        }
    }

    pub fn rebuild_search(&mut self) {
        self.search.rebuild_from(&self.data.all_tags);
    }

    pub fn is_stale(&self, max_age_ms: i64) -> bool {
        persistence::is_stale(&self.meta, self.clock.now_ms(), max_age_ms)
    }

    /// Staleness against the configured default max age
    pub fn needs_rebuild(&self) -> bool {
        self.is_stale(self.config.stale_after_ms)
    }

    /// Check every structural invariant plus metadata accuracy
    pub fn verify(&self) -> Result<(), String> {
        self.data.verify()?;
        if self.meta.file_count != self.data.files.len() {
            return Err(format!(
                "meta.file_count is {} but {} files are indexed",
                self.meta.file_count,
                self.data.files.len()
            ));
        }
        if self.meta.tag_count != self.data.tags.len() {
            return Err(format!(
                "meta.tag_count is {} but {} tags are indexed",
                self.meta.tag_count,
                self.data.tags.len()
            ));
        }
        Ok(())
    }

    fn after_membership_change(&mut self) {
        self.data.recompute_all_tags();
        self.search.rebuild_from(&self.data.all_tags);
        self.refresh_meta();
        self.persist();
    }

    fn refresh_meta(&mut self) {
        self.meta = IndexMeta {
            file_count: self.data.files.len(),
            tag_count: self.data.tags.len(),
            last_indexed: self.clock.now_ms(),
        };
    }

    fn persist(&self) {
        if !self.save() {
            log::warn!("[TagIndex] Index changed in memory but was not persisted");
        }
    }
}
