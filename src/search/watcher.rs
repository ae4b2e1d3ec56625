use notify::event::{ModifyKind, RenameMode};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::TagIndexConfig;
use crate::service::SharedTagIndex;
use crate::store::relative_doc_id;

static CONFLICT_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r" \(Synology(?:Drive)? [Cc]onflict[^)]*\)").expect("valid conflict regex")
});

/// Keeps the tag index in step with edits made outside the app
/// (sync clients, other editors). Dropping it stops the watch.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
}

impl VaultWatcher {
    /// Watch `vault_path` recursively and feed changes into `index`.
    ///
    /// Create/modify events are debounced until the path has been quiet for
    /// a while; removals and two-sided renames are applied immediately.
    pub fn start(vault_path: &Path, index: SharedTagIndex) -> Result<Self, String> {
        let vault = vault_path.to_path_buf();
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            tx,
            Config::default().with_poll_interval(Duration::from_millis(300)),
        )
        .map_err(|e| format!("Failed to create watcher: {}", e))?;

        watcher
            .watch(vault.as_path(), RecursiveMode::Recursive)
            .map_err(|e| format!("Failed to watch {:?}: {}", vault, e))?;

        thread::spawn(move || {
            let config = index.config().clone();
            let mut pending_paths: HashMap<PathBuf, Instant> = HashMap::new();
            let poll = Duration::from_millis(250);
            let settle = Duration::from_millis(500);

            loop {
                match rx.recv_timeout(poll) {
                    Ok(Ok(event)) => match event.kind {
                        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                            let (from, to) = (&event.paths[0], &event.paths[1]);
                            pending_paths.remove(from);
                            handle_rename(&index, &vault, &config, from, to, &mut pending_paths);
                        }
                        EventKind::Remove(_) => {
                            for path in &event.paths {
                                handle_remove(&index, &vault, &config, path, &mut pending_paths);
                            }
                        }
                        _ => {
                            let now = Instant::now();
                            for path in &event.paths {
                                if should_process_path(path, &vault, &config) {
                                    pending_paths.insert(path.clone(), now);
                                } else if let Some(original) = get_original_from_conflict(path) {
                                    log::warn!(
                                        "[Watcher] Sync conflict copy not indexed: {} (original {})",
                                        path.display(),
                                        original.display()
                                    );
                                }
                            }
                        }
                    },
                    Ok(Err(e)) => {
                        log::warn!("[Watcher] File watcher error: {}", e);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        flush_stable(&index, &vault, &mut pending_paths, Instant::now(), settle);
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        break;
                    }
                }
            }
        });

        Ok(VaultWatcher { _watcher: watcher })
    }
}

fn handle_remove(
    index: &SharedTagIndex,
    vault: &Path,
    config: &TagIndexConfig,
    path: &Path,
    pending_paths: &mut HashMap<PathBuf, Instant>,
) {
    pending_paths.remove(path);
    // Some editors save by delete + recreate; the path is back by now
    if !should_process_path(path, vault, config) || path.exists() {
        return;
    }
    if let Some(doc) = relative_doc_id(vault, path) {
        index.remove_document_blocking(&doc);
    }
}

/// Index every pending path that has been quiet for at least `settle`
fn flush_stable(
    index: &SharedTagIndex,
    vault: &Path,
    pending_paths: &mut HashMap<PathBuf, Instant>,
    now: Instant,
    settle: Duration,
) {
    let stable: Vec<PathBuf> = pending_paths
        .iter()
        .filter(|(_, last)| now.duration_since(**last) >= settle)
        .map(|(path, _)| path.clone())
        .collect();

    if !stable.is_empty() {
        log::debug!("[Watcher] Processing {} stable paths", stable.len());
    }

    for path in stable {
        pending_paths.remove(&path);
        let Some(doc) = relative_doc_id(vault, &path) else {
            continue;
        };
        if let Err(e) = index.index_document_blocking(&doc) {
            log::warn!("[Watcher] Failed to index {}: {}", doc, e);
        }
    }
}

fn handle_rename(
    index: &SharedTagIndex,
    vault: &Path,
    config: &TagIndexConfig,
    from: &Path,
    to: &Path,
    pending_paths: &mut HashMap<PathBuf, Instant>,
) {
    let from_doc = should_process_path(from, vault, config)
        .then(|| relative_doc_id(vault, from))
        .flatten();
    let to_doc = should_process_path(to, vault, config)
        .then(|| relative_doc_id(vault, to))
        .flatten();

    match (from_doc, to_doc) {
        (Some(old_doc), Some(new_doc)) => {
            index.rename_document_blocking(&old_doc, &new_doc);
            // Content may have changed along with the name
            pending_paths.insert(to.to_path_buf(), Instant::now());
        }
        (Some(old_doc), None) => index.remove_document_blocking(&old_doc),
        (None, Some(_)) => {
            pending_paths.insert(to.to_path_buf(), Instant::now());
        }
        (None, None) => {}
    }
}

/// Documents inside the vault, outside hidden or attachment folders, that
/// are not sync-conflict copies.
fn should_process_path(path: &Path, vault_path: &Path, config: &TagIndexConfig) -> bool {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !config.is_document(file_name) || is_synology_conflict_file(file_name) {
        return false;
    }

    let Ok(relative) = path.strip_prefix(vault_path) else {
        return false;
    };
    let dirs: Vec<String> = relative
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| match c {
                    Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    !dirs.iter().any(|name| config.is_skipped_dir(name))
}

/// Synology Drive conflict copies, e.g. "note (SynologyDrive Conflict 2024-01-01).md"
pub fn is_synology_conflict_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.contains("(synologydrive conflict") || lower.contains("(synology conflict")
}

/// The path a conflict copy was made from
pub fn get_original_from_conflict(conflict_path: &Path) -> Option<PathBuf> {
    let file_name = conflict_path.file_name()?.to_string_lossy().to_string();
    let original_name = CONFLICT_SUFFIX.replace(&file_name, "").to_string();

    if original_name == file_name {
        return None;
    }

    conflict_path.parent().map(|p| p.join(original_name))
}
