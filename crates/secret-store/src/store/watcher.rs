//! Directory watcher that turns file-system notifications into cache
//! invalidations.
//!
//! `notify` delivers events on its own thread. That callback only forwards
//! them into an unbounded channel; a Tokio task drains the channel and calls
//! [`SecretStore::invalidate`], which takes the per-scope load lock.

use std::path::PathBuf;

use common::SecretsError;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{is_secrets_file_name, SecretStore};

/// What happened to a file under the secrets directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
    Renamed,
}

impl ChangeKind {
    /// Map a raw `notify` event kind; access notifications are dropped.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
            EventKind::Modify(_) | EventKind::Any => Some(ChangeKind::Changed),
            EventKind::Remove(_) => Some(ChangeKind::Deleted),
            EventKind::Access(_) | EventKind::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretsChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Running watcher. Dropping it stops both the OS watch and the invalidation
/// task.
pub struct SecretsWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for SecretsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for SecretsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsWatcher")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Watch `store`'s secrets directory recursively.
pub(crate) fn spawn(store: SecretStore) -> Result<SecretsWatcher, SecretsError> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let Some(kind) = ChangeKind::from_event_kind(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    // Receiver gone means the watcher is being torn down.
                    let _ = tx.send(SecretsChange { path, kind });
                }
            }
            Err(e) => warn!(error = %e, "secrets directory watch error"),
        }
    })
    .map_err(|e| SecretsError::Watch(e.to_string()))?;

    let path = store.secrets_path().to_path_buf();
    watcher
        .watch(&path, RecursiveMode::Recursive)
        .map_err(|e| SecretsError::Watch(format!("{}: {e}", path.display())))?;

    info!(path = %path.display(), "watching secrets directory");
    let task = tokio::spawn(invalidation_loop(store, rx));

    Ok(SecretsWatcher {
        _watcher: watcher,
        task,
    })
}

/// Apply every received change to `store` until the sender side closes.
pub(crate) async fn invalidation_loop(
    store: SecretStore,
    mut rx: mpsc::UnboundedReceiver<SecretsChange>,
) {
    while let Some(change) = rx.recv().await {
        if !is_secrets_file_name(&change.path) {
            continue;
        }
        debug!(path = %change.path.display(), kind = ?change.kind, "secrets file changed");
        store.invalidate(&change.path).await;
    }
    debug!("secrets watcher channel closed");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};

    use super::*;
    use crate::convert::ConverterFactory;
    use crate::crypto::{EncryptionKeyResolver, Hosting, KeyCache};

    async fn plaintext_store() -> (tempfile::TempDir, SecretStore) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = EncryptionKeyResolver::new(
            Arc::new(HashMap::<String, String>::new()),
            Hosting::Local,
            KeyCache::new(),
        );
        let converters = ConverterFactory::probe(Arc::new(resolver)).unwrap();
        let store = SecretStore::open(dir.path(), converters).await.unwrap();
        (dir, store)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn event_kind_mapping() {
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Changed)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(ChangeKind::Renamed)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Deleted)
        );
        assert_eq!(ChangeKind::from_event_kind(&EventKind::Any), Some(ChangeKind::Changed));
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Access(AccessKind::Any)),
            None
        );
        assert_eq!(ChangeKind::from_event_kind(&EventKind::Other), None);
    }

    #[tokio::test]
    async fn channel_changes_invalidate_cache() {
        let (_dir, store) = plaintext_store().await;
        store.function_secrets("foo").await.unwrap();
        store.function_secrets("bar").await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(invalidation_loop(store.clone(), rx));

        tx.send(SecretsChange {
            path: store.secrets_path().join("foo.json.swp"),
            kind: ChangeKind::Changed,
        })
        .unwrap();
        tx.send(SecretsChange {
            path: store.secrets_path().join("FOO.json"),
            kind: ChangeKind::Changed,
        })
        .unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(store.cached_function("foo").is_none());
        assert!(store.cached_function("bar").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn external_edit_is_picked_up() {
        let (_dir, store) = plaintext_store().await;
        let first = store.function_secrets("foo").await.unwrap();
        let _watcher = store.watch().unwrap();

        let path = store.secrets_path().join("foo.json");
        let json = crate::serializer::write_function(&[common::Secret::plaintext(
            "default", "edited",
        )])
        .unwrap();
        std::fs::write(&path, json).unwrap();

        assert!(wait_until(|| store.cached_function("foo").is_none()).await);
        let reloaded = store.function_secrets("foo").await.unwrap();
        assert_ne!(first["default"], "edited");
        assert_eq!(reloaded["default"], "edited");
    }
}
