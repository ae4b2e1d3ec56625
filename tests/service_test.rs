use std::fs;
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use note_tags::{
    ContentStore, FsContentStore, JsonFileStore, MemoryContentStore, NoopNotifier, SharedTagIndex,
    StoreEntry, StoreError, TagIndex, TagIndexConfig,
};

/// Holds the scan right after it has read `pause_on` until the test lets it go
struct PausingStore {
    inner: MemoryContentStore,
    pause_on: String,
    reached: Mutex<mpsc::Sender<()>>,
    resume: Mutex<mpsc::Receiver<()>>,
}

impl ContentStore for PausingStore {
    fn list_children(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        self.inner.list_children(path)
    }

    fn read_prefix(&self, path: &str, max_bytes: usize) -> Result<String, StoreError> {
        let content = self.inner.read_prefix(path, max_bytes)?;
        if path == self.pause_on {
            let _ = self.reached.lock().unwrap().send(());
            let _ = self.resume.lock().unwrap().recv();
        }
        Ok(content)
    }

    fn read(&self, path: &str) -> Result<String, StoreError> {
        self.inner.read(path)
    }
}

fn note(tags: &str) -> String {
    format!("---\ntags: {}\n---\n\nBody\n", tags)
}

fn shared_over(vault: &Path) -> SharedTagIndex {
    let index = TagIndex::new(
        TagIndexConfig::default(),
        Box::new(JsonFileStore::new(vault.join(".notology"))),
        Box::new(NoopNotifier),
    );
    let store: Arc<dyn ContentStore> = Arc::new(FsContentStore::new(vault));
    SharedTagIndex::new(index, store, "")
}

#[tokio::test]
async fn test_restore_or_build_rebuilds_first_time_then_restores() {
    let temp_dir = TempDir::new().unwrap();
    let vault = temp_dir.path();
    fs::write(vault.join("a.md"), note("alpha, beta")).unwrap();
    fs::write(vault.join("b.md"), note("beta")).unwrap();

    let first = shared_over(vault);
    assert!(!first.restore_or_build().await.unwrap());
    assert_eq!(first.meta().await.file_count, 2);

    let second = shared_over(vault);
    assert!(second.restore_or_build().await.unwrap());
    assert_eq!(second.files_for_tag("beta").await, vec!["a.md".to_string(), "b.md".to_string()]);
    // Search is usable straight after a restore
    assert_eq!(second.search("alpa").await[0].tag, "alpha");
}

#[tokio::test]
async fn test_rebuild_swaps_in_new_index() {
    let store = Arc::new(MemoryContentStore::new());
    store.insert("one.md", &note("first"));

    let shared = SharedTagIndex::new(TagIndex::in_memory(), store.clone(), "");
    shared.rebuild().await.unwrap();
    assert_eq!(shared.files_for_tag("first").await, vec!["one.md".to_string()]);

    store.remove("one.md");
    store.insert("two.md", &note("second"));
    shared.rebuild().await.unwrap();

    assert!(shared.files_for_tag("first").await.is_empty());
    assert_eq!(shared.files_for_tag("second").await, vec!["two.md".to_string()]);
    assert!(shared.handle().read().await.verify().is_ok());
}

#[tokio::test]
async fn test_concurrent_mutations_keep_invariants() {
    let store = Arc::new(MemoryContentStore::new());
    let shared = SharedTagIndex::new(TagIndex::in_memory(), store, "");

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                let doc = format!("w{}/note_{}.md", worker, i % 10);
                match i % 3 {
                    0 => shared.update_document(&doc, &note("shared, even")).await,
                    1 => shared.update_document(&doc, &note(&format!("worker-{}", worker))).await,
                    _ => {
                        let target = format!("w{}/moved_{}.md", worker, i % 10);
                        shared.rename_document(&doc, &target).await;
                    }
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let handle = shared.handle();
    let index = handle.read().await;
    assert!(index.verify().is_ok());
    assert!(index.file_count() > 0);
}

#[tokio::test]
async fn test_index_document_reads_through_store() {
    let store = Arc::new(MemoryContentStore::new());
    store.insert("daily.md", &note("journal"));
    let shared = SharedTagIndex::new(TagIndex::in_memory(), store.clone(), "");

    shared.index_document("daily.md").await.unwrap();
    assert_eq!(shared.files_for_tag("journal").await, vec!["daily.md".to_string()]);

    store.remove("daily.md");
    shared.index_document("daily.md").await.unwrap();
    assert!(shared.files_for_tag("journal").await.is_empty());

    shared.remove_document("never-indexed.md").await;
    assert_eq!(shared.meta().await.file_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_during_rebuild_is_not_lost() {
    let (reached_tx, reached_rx) = mpsc::channel();
    let (resume_tx, resume_rx) = mpsc::channel();
    let store = Arc::new(PausingStore {
        inner: MemoryContentStore::new(),
        pause_on: "a.md".to_string(),
        reached: Mutex::new(reached_tx),
        resume: Mutex::new(resume_rx),
    });
    store.inner.insert("a.md", &note("old"));

    let shared = SharedTagIndex::new(TagIndex::in_memory(), store.clone(), "");

    let rebuild = tokio::spawn({
        let shared = shared.clone();
        async move { shared.rebuild().await }
    });
    tokio::task::spawn_blocking(move || reached_rx.recv())
        .await
        .unwrap()
        .unwrap();

    // The scan already holds the old content; the document changes under it
    store.inner.insert("a.md", &note("new"));
    let update = tokio::spawn({
        let shared = shared.clone();
        async move { shared.index_document("a.md").await }
    });
    tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(50)))
        .await
        .unwrap();

    resume_tx.send(()).unwrap();
    rebuild.await.unwrap().unwrap();
    update.await.unwrap().unwrap();

    assert_eq!(shared.files_for_tag("new").await, vec!["a.md".to_string()]);
    assert!(shared.files_for_tag("old").await.is_empty());
    assert!(shared.handle().read().await.verify().is_ok());
}
