use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{Context, anyhow};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

pub const TASKS_KEY: &str = "todoTasks";
pub const SELECTED_DATE_KEY: &str = "todoSelectedDate";

const FILE_SUFFIX: &str = ".data";

pub trait KvBackend: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
    fn keys(&self) -> anyhow::Result<Vec<String>>;

    /// Directory other processes write through, if any.
    fn watch_dir(&self) -> Option<&Path> {
        None
    }
}

fn key_of(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()?.strip_suffix(FILE_SUFFIX)
}

/// One file per key under a data directory.
#[derive(Debug)]
pub struct FileKv {
    pub data_dir: PathBuf,
}

impl FileKv {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(anyhow!("invalid storage key: {key:?}"));
        }
        Ok(self.data_dir.join(format!("{key}{FILE_SUFFIX}")))
    }
}

impl KvBackend for FileKv {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            trace!(key, "key absent");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value), fields(bytes = value.len()))]
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        debug!(file = %path.display(), "writing key atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed removing {}", path.display()))?;
        }
        Ok(())
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.data_dir)
            .with_context(|| format!("failed listing {}", self.data_dir.display()))?
        {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(FILE_SUFFIX) {
                out.push(key.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    fn watch_dir(&self) -> Option<&Path> {
        Some(&self.data_dir)
    }
}

#[derive(Debug, Default)]
pub struct MemoryKv {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.map.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.map.lock().keys().cloned().collect())
    }
}

/// Identifies one page lifetime. Writes are never echoed back to the
/// context that made them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Origin of changes observed by polling rather than by an
    /// in-process write.
    pub const EXTERNAL: ContextId = ContextId(0);

    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub origin: ContextId,
    /// Value after the change, `None` once removed.
    pub value: Option<String>,
}

#[derive(Debug)]
struct Subscriber {
    origin: ContextId,
    key: String,
    tx: Sender<StorageChange>,
}

/// Publish/subscribe with one topic per storage key.
#[derive(Debug, Default)]
pub struct ChangeBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ChangeBus {
    pub fn subscribe(&self, origin: ContextId, key: &str) -> Receiver<StorageChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(Subscriber {
            origin,
            key: key.to_string(),
            tx,
        });
        rx
    }

    pub fn publish(&self, change: StorageChange) {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|sub| {
            if sub.key != change.key || sub.origin == change.origin {
                return true;
            }
            sub.tx.send(change.clone()).is_ok()
        });
        trace!(
            key = %change.key,
            origin = ?change.origin,
            dropped = before - subscribers.len(),
            "published storage change"
        );
    }
}

/// A context's view of the shared store.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KvBackend>,
    bus: Arc<ChangeBus>,
    origin: ContextId,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.backend)
            .field("origin", &self.origin)
            .finish()
    }
}

impl Storage {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            bus: Arc::new(ChangeBus::default()),
            origin: ContextId::next(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    /// Same backend and bus, new context.
    pub fn fork(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            bus: Arc::clone(&self.bus),
            origin: ContextId::next(),
        }
    }

    pub fn origin(&self) -> ContextId {
        self.origin
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.backend.get(key)
    }

    /// Writing the value already stored is a no-op and notifies nobody.
    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.backend.get(key)?.as_deref() == Some(value) {
            trace!(key, "value unchanged; skipping write");
            return Ok(());
        }
        self.backend.set(key, value)?;
        self.bus.publish(StorageChange {
            key: key.to_string(),
            origin: self.origin,
            value: Some(value.to_string()),
        });
        Ok(())
    }

    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.backend.remove(key)?;
        self.bus.publish(StorageChange {
            key: key.to_string(),
            origin: self.origin,
            value: None,
        });
        Ok(())
    }

    pub fn keys(&self) -> anyhow::Result<Vec<String>> {
        self.backend.keys()
    }

    pub fn subscribe(&self, key: &str) -> Receiver<StorageChange> {
        self.bus.subscribe(self.origin, key)
    }
}

/// Sends the keys an event touched. Access events and stray files are
/// ignored.
fn forward_event(tx: &Sender<String>, res: notify::Result<notify::Event>) {
    let event = match res {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "file watch error");
            return;
        }
    };
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }
    for key in event.paths.iter().filter_map(|path| key_of(path)) {
        let _ = tx.send(key.to_string());
    }
}

/// Publishes writes that other processes make to the backend's directory.
///
/// File events only say which key to look at. A key is published with
/// [`ContextId::EXTERNAL`] when its current value differs from the last one
/// this process wrote or announced, so the echo of an in-process write is
/// dropped while a foreign write landing after it is not.
pub struct FileWatcher {
    storage: Storage,
    known: BTreeMap<String, Option<String>>,
    local_writes: Vec<Receiver<StorageChange>>,
    touched: Receiver<String>,
    _watcher: Option<RecommendedWatcher>,
}

impl fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcher")
            .field("keys", &self.known.keys().collect::<Vec<_>>())
            .field("active", &self._watcher.is_some())
            .finish()
    }
}

impl FileWatcher {
    /// Backends without a directory (such as [`MemoryKv`]) get a watcher
    /// that never reports anything.
    #[tracing::instrument(skip(storage))]
    pub fn new(storage: &Storage, keys: &[&str]) -> anyhow::Result<Self> {
        let storage = Storage {
            backend: Arc::clone(&storage.backend),
            bus: Arc::clone(&storage.bus),
            origin: ContextId::EXTERNAL,
        };

        let mut known = BTreeMap::new();
        let mut local_writes = Vec::with_capacity(keys.len());
        for key in keys {
            known.insert(key.to_string(), storage.get(key)?);
            local_writes.push(storage.subscribe(key));
        }

        let (tx, touched) = mpsc::channel();
        let watcher = match storage.backend.watch_dir() {
            Some(dir) => {
                let forward = move |res: notify::Result<notify::Event>| forward_event(&tx, res);
                let mut watcher =
                    notify::recommended_watcher(forward).context("failed to start file watcher")?;
                watcher
                    .watch(dir, RecursiveMode::NonRecursive)
                    .with_context(|| format!("failed to watch {}", dir.display()))?;
                info!(dir = %dir.display(), "watching for external writes");
                Some(watcher)
            }
            None => {
                debug!("backend has no directory; external writes are not watched");
                None
            }
        };

        Ok(Self {
            storage,
            known,
            local_writes,
            touched,
            _watcher: watcher,
        })
    }

    /// Publishes the keys changed by other processes since the last poll and
    /// returns them.
    #[tracing::instrument(skip(self))]
    pub fn poll(&mut self) -> anyhow::Result<Vec<String>> {
        for rx in &self.local_writes {
            while let Ok(change) = rx.try_recv() {
                self.known.insert(change.key, change.value);
            }
        }

        let mut candidates = Vec::new();
        while let Ok(key) = self.touched.try_recv() {
            if self.known.contains_key(&key) && !candidates.contains(&key) {
                candidates.push(key);
            }
        }

        let mut changed = Vec::new();
        for key in candidates {
            let current = self.storage.get(&key)?;
            if self.known.get(&key) == Some(&current) {
                trace!(key = %key, "file event matches known value");
                continue;
            }
            debug!(key = %key, "external storage change");
            self.known.insert(key.clone(), current.clone());
            self.storage.bus.publish(StorageChange {
                key: key.clone(),
                origin: ContextId::EXTERNAL,
                value: current,
            });
            changed.push(key);
        }
        Ok(changed)
    }
}
