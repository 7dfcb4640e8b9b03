//! Persisted `ActionState` records (`.workgraph/.therapydrift/state.json`).
//!
//! Every record carries a version. Writers go through
//! [`ActionStateStore::compare_and_swap`], which fails with
//! [`DriftError::StateConflict`] when the record changed since it was read, so
//! two racing `check` runs cannot both commit an action.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::action_state::ActionState;
use crate::core::error::DriftError;

const STATE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/state.schema.json"
));
pub const STORE_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
/// A lock file older than this is left over from a crashed writer. The lock is
/// only held for one read-modify-write, which takes milliseconds.
pub const DEFAULT_STALE_LOCK_AGE: Duration = Duration::from_secs(30);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// An action state together with the version it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedState {
    /// `0` means the record does not exist yet.
    pub version: u64,
    pub state: ActionState,
}

/// Read + compare-and-swap access to per-task action state.
pub trait ActionStateStore {
    fn load(&self, task_id: &str) -> Result<VersionedState>;

    /// Replace the record for `task_id` if it is still at `expected_version`.
    ///
    /// Returns the new version. A lost race surfaces as a
    /// [`DriftError::StateConflict`] inside the `anyhow::Error`.
    fn compare_and_swap(
        &self,
        task_id: &str,
        expected_version: u64,
        next: &ActionState,
    ) -> Result<u64>;
}

/// True if `err` is a lost compare-and-swap race.
pub fn is_state_conflict(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DriftError>()
        .is_some_and(DriftError::is_conflict)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StateDocument {
    schema: u32,
    tasks: BTreeMap<String, VersionedState>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            schema: STORE_SCHEMA_VERSION,
            tasks: BTreeMap::new(),
        }
    }
}

/// JSON file store guarded by an exclusive lock file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    stale_lock_age: Duration,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        Self {
            path,
            lock_path,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_lock_age: DEFAULT_STALE_LOCK_AGE,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Age after which an existing lock file is considered abandoned and removed.
    pub fn with_stale_lock_age(mut self, age: Duration) -> Self {
        self.stale_lock_age = age;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<StateDocument> {
        if !self.path.exists() {
            return Ok(StateDocument::default());
        }
        debug!(path = %self.path.display(), "loading action state");
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read action state {}", self.path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("parse action state {}", self.path.display()))?;
        validate_schema(&value)
            .with_context(|| format!("validate action state {}", self.path.display()))?;
        serde_json::from_value(value)
            .with_context(|| format!("deserialize action state {}", self.path.display()))
    }

    fn write_document(&self, doc: &StateDocument) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(doc)?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }
}

impl ActionStateStore for FileStateStore {
    fn load(&self, task_id: &str) -> Result<VersionedState> {
        let doc = self.read_document()?;
        Ok(doc.tasks.get(task_id).cloned().unwrap_or_default())
    }

    fn compare_and_swap(
        &self,
        task_id: &str,
        expected_version: u64,
        next: &ActionState,
    ) -> Result<u64> {
        let _lock = StateLock::acquire(&self.lock_path, self.lock_timeout, self.stale_lock_age)?;
        let mut doc = self.read_document()?;
        let found = doc.tasks.get(task_id).map_or(0, |r| r.version);
        if found != expected_version {
            return Err(DriftError::StateConflict {
                task_id: task_id.to_string(),
                expected: expected_version,
                found,
            }
            .into());
        }
        let version = found + 1;
        doc.tasks.insert(
            task_id.to_string(),
            VersionedState {
                version,
                state: next.clone(),
            },
        );
        debug!(task_id, version, path = %self.path.display(), "writing action state");
        self.write_document(&doc)?;
        Ok(version)
    }
}

/// Exclusive lock held for the duration of one read-modify-write.
///
/// The lock file holds the owner's pid. A lock whose file is older than the
/// stale age is broken, so a crashed writer cannot wedge every later commit.
struct StateLock {
    path: PathBuf,
}

impl StateLock {
    fn acquire(path: &Path, timeout: Duration, stale_age: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let lock = Self {
                        path: path.to_path_buf(),
                    };
                    writeln!(file, "{}", std::process::id())
                        .with_context(|| format!("write lock {}", path.display()))?;
                    return Ok(lock);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if let Some(age) = lock_age(path).filter(|age| *age >= stale_age) {
                        warn!(
                            path = %path.display(),
                            age_secs = age.as_secs(),
                            holder = %fs::read_to_string(path).unwrap_or_default().trim(),
                            "breaking stale state lock"
                        );
                        match fs::remove_file(path) {
                            Ok(()) => continue,
                            Err(err) if err.kind() == ErrorKind::NotFound => continue,
                            Err(err) => {
                                return Err(err).with_context(|| {
                                    format!("remove stale lock {}", path.display())
                                });
                            }
                        }
                    }
                    if Instant::now() >= deadline {
                        return Err(anyhow!(
                            "timed out after {:?} waiting for state lock {} (remove it if no check is running)",
                            timeout,
                            path.display()
                        ));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("create lock {}", path.display()));
                }
            }
        }
    }
}

/// Time since the lock file was last modified; `None` if it vanished or the
/// clock disagrees.
fn lock_age(path: &Path) -> Option<Duration> {
    fs::metadata(path).ok()?.modified().ok()?.elapsed().ok()
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), err = %err, "failed to release state lock");
        }
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<BTreeMap<String, VersionedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActionStateStore for MemoryStateStore {
    fn load(&self, task_id: &str) -> Result<VersionedState> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("state store mutex poisoned"))?;
        Ok(records.get(task_id).cloned().unwrap_or_default())
    }

    fn compare_and_swap(
        &self,
        task_id: &str,
        expected_version: u64,
        next: &ActionState,
    ) -> Result<u64> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("state store mutex poisoned"))?;
        let found = records.get(task_id).map_or(0, |r| r.version);
        if found != expected_version {
            return Err(DriftError::StateConflict {
                task_id: task_id.to_string(),
                expected: expected_version,
                found,
            }
            .into());
        }
        records.insert(
            task_id.to_string(),
            VersionedState {
                version: found + 1,
                state: next.clone(),
            },
        );
        Ok(found + 1)
    }
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(STATE_SCHEMA).context("parse state schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "state schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("action state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp action state in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("write temp action state {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace action state {}", path.display()))?;
    Ok(())
}
