use std::{
    collections::HashMap,
    io::ErrorKind,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::{fs, sync::Mutex};

use super::error::{Error, Result};

/// Opaque optimistic-concurrency token. Captured at read time, presented at
/// write time; a mismatch means another submission landed in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Version(u64);

#[derive(Clone, Copy, Debug, Default)]
pub enum WritePrecondition {
    /// Unconditional write (last writer wins).
    #[default]
    None,
    /// The object must not exist yet.
    Absent,
    /// The object must still be at this version.
    Matches(Version),
}

/// The persistence collaborator. Filesystem-backed in production, in-memory
/// in dev mode and tests; the derivation core never sees the difference.
#[derive(Clone)]
pub enum ObjectStore {
    Fs(FsObjectStore),
    Memory(MemoryStore),
}

impl ObjectStore {
    #[must_use]
    pub fn fs(root: Utf8PathBuf) -> Self {
        Self::Fs(FsObjectStore::new(root))
    }

    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::default())
    }

    /// # Errors
    pub async fn exists(&self, key: &str) -> Result<bool> {
        use ObjectStore::{Fs, Memory};

        match self {
            Fs(store) => store.exists(key).await,
            Memory(store) => Ok(store.exists(key).await),
        }
    }

    /// # Errors
    pub async fn read(&self, key: &str) -> Result<Option<(Bytes, Version)>> {
        use ObjectStore::{Fs, Memory};

        match self {
            Fs(store) => store.read(key).await,
            Memory(store) => Ok(store.read(key).await),
        }
    }

    /// # Errors
    /// Fails with [`Error::VersionConflict`] when the precondition no longer
    /// holds.
    pub async fn write(
        &self,
        key: &str,
        bytes: Bytes,
        precondition: WritePrecondition,
    ) -> Result<Version> {
        use ObjectStore::{Fs, Memory};

        match self {
            Fs(store) => store.write(key, bytes, precondition).await,
            Memory(store) => store.write(key, bytes, precondition).await,
        }
    }
}

/// Objects as files under a root directory, with a sidecar `.v` file holding
/// the version counter. The mutex makes check-then-write atomic within the
/// process; cross-process writers are out of scope, matching the original
/// local-disk fallback.
#[derive(Clone)]
pub struct FsObjectStore {
    root: Utf8PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FsObjectStore {
    #[must_use]
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn object_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }

    fn version_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join(format!("{key}.v"))
    }

    async fn current_version(&self, key: &str) -> Result<Option<Version>> {
        if !fs::try_exists(self.object_path(key)).await? {
            return Ok(None);
        }

        let version = match fs::read_to_string(self.version_path(key)).await {
            Ok(raw) => raw.trim().parse().unwrap_or(1),
            Err(err) if err.kind() == ErrorKind::NotFound => 1,
            Err(err) => return Err(err.into()),
        };

        Ok(Some(Version(version)))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;

        Ok(fs::try_exists(self.object_path(key)).await?)
    }

    async fn read(&self, key: &str) -> Result<Option<(Bytes, Version)>> {
        let _guard = self.lock.lock().await;

        let Some(version) = self.current_version(key).await? else {
            return Ok(None);
        };

        let bytes = fs::read(self.object_path(key)).await?;

        Ok(Some((Bytes::from(bytes), version)))
    }

    async fn write(
        &self,
        key: &str,
        bytes: Bytes,
        precondition: WritePrecondition,
    ) -> Result<Version> {
        use WritePrecondition::{Absent, Matches, None as Unconditional};

        let _guard = self.lock.lock().await;

        let current = self.current_version(key).await?;
        let conflict = || Error::VersionConflict {
            key: key.to_string(),
        };

        match (precondition, current) {
            (Unconditional, _) | (Absent, None) => {}
            (Matches(expected), Some(actual)) if expected == actual => {}
            (Absent | Matches(_), _) => return Err(conflict()),
        }

        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staging = Utf8PathBuf::from(format!("{path}.tmp"));
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &path).await?;

        let Version(current) = current.unwrap_or(Version(0));
        let next = Version(current + 1);
        fs::write(self.version_path(key), format!("{}", current + 1)).await?;

        Ok(next)
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

/// Ephemeral store for dev mode and tests. `inject_conflicts` makes the next
/// N conditional writes fail as if another writer had won the race, which is
/// how tests exercise the submission retry loop deterministically.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<HashMap<String, (Bytes, u64)>>>,
    injected_conflicts: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn exists(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    async fn read(&self, key: &str) -> Option<(Bytes, Version)> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|(bytes, version)| (bytes.clone(), Version(*version)))
    }

    async fn write(
        &self,
        key: &str,
        bytes: Bytes,
        precondition: WritePrecondition,
    ) -> Result<Version> {
        use WritePrecondition::{Absent, Matches, None as Unconditional};

        let conflict = || Error::VersionConflict {
            key: key.to_string(),
        };

        if !matches!(precondition, Unconditional) && self.take_injected_conflict() {
            return Err(conflict());
        }

        let mut objects = self.objects.lock().await;
        let current = objects.get(key).map(|(_, version)| *version);

        match (precondition, current) {
            (Unconditional, _) | (Absent, None) => {}
            (Matches(Version(expected)), Some(actual)) if expected == actual => {}
            (Absent | Matches(_), _) => return Err(conflict()),
        }

        let next = current.unwrap_or(0) + 1;
        objects.insert(key.to_string(), (bytes, next));

        Ok(Version(next))
    }
}
