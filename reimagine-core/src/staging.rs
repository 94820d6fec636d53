//! Per-session artifact staging on the local filesystem.
//!
//! Every session gets its own directory under the staging root, named after
//! its [`SessionId`]. Artifacts are flat files written exactly once.
//!
//! A directory stays live while any [`SessionDir`] handle for it exists,
//! including the one held by a background artifact write. Retention sweeps
//! never remove live directories.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Directory-creation attempts before giving up on a session directory.
const MAX_CREATE_ATTEMPTS: usize = 16;

/// Session identifier: a millisecond Unix timestamp, bumped forward when
/// needed so that identifiers handed out by one [`Staging`] never repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

/// The kinds of file a session stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Artifact {
    /// The photo as submitted; carries its file extension.
    #[strum(serialize = "incoming")]
    Incoming(&'static str),
    #[strum(serialize = "raw")]
    RawDescription,
    #[strum(serialize = "processed")]
    ProcessedDescription,
    /// The image as fetched from the generation service.
    #[strum(serialize = "generated")]
    Generated(&'static str),
    /// The transcoded image delivered to the client.
    #[strum(serialize = "compressed_generated")]
    Transcoded(&'static str),
}

impl Artifact {
    /// File name inside the session directory, e.g. `raw_description1700000000000.txt`.
    pub fn file_name(&self, id: SessionId) -> String {
        let prefix: &'static str = self.into();
        match self {
            Artifact::RawDescription | Artifact::ProcessedDescription => {
                format!("{prefix}_description{id}.txt")
            }
            Artifact::Incoming(ext) | Artifact::Generated(ext) | Artifact::Transcoded(ext) => {
                format!("{prefix}_image{id}.{ext}")
            }
        }
    }
}

/// Root of the staging area and source of session identifiers.
#[derive(Debug)]
pub struct Staging {
    root: PathBuf,
    last_id: AtomicU64,
    live: Arc<Mutex<HashSet<SessionId>>>,
}

impl Staging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_id: AtomicU64::new(0),
            live: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the staging root (and parents) if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Hand out the next session identifier.
    ///
    /// Strictly greater than every identifier previously returned by this
    /// instance, even when called repeatedly within one millisecond.
    pub fn allocate(&self) -> SessionId {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut prev = self.last_id.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last_id.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return SessionId(candidate),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Create the directory for `id`.
    ///
    /// Directory creation is exclusive: if a directory with that name already
    /// exists (another process, a clock step backwards) a fresh identifier is
    /// allocated and tried instead. The returned [`SessionDir`] carries the
    /// identifier actually used.
    pub async fn create(&self, id: SessionId) -> io::Result<SessionDir> {
        let mut id = id;
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let path = self.root.join(id.to_string());
            // Marked live before the directory appears so a concurrent sweep
            // cannot see it unclaimed.
            let lease = self.lease(id);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    debug!(session = %id, path = %path.display(), "staging directory created");
                    return Ok(SessionDir {
                        id,
                        path,
                        _lease: Arc::new(lease),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(session = %id, "staging directory already exists; allocating a new id");
                    id = self.allocate();
                }
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not find a free staging directory name",
        ))
    }

    fn lease(&self, id: SessionId) -> SessionLease {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        SessionLease {
            id,
            live: Arc::clone(&self.live),
        }
    }

    /// Whether a [`SessionDir`] handle for `id` is still held.
    pub fn is_live(&self, id: SessionId) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    /// Remove session directories whose identifier is older than `max_age`.
    ///
    /// Entries whose names are not session identifiers, and sessions that are
    /// still live, are left untouched. An entry that cannot be inspected or
    /// removed is logged and skipped. Returns the number of directories
    /// removed; only failing to open the root is an error.
    pub async fn sweep(&self, max_age: Duration) -> io::Result<usize> {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        let cutoff = now.saturating_sub(max_age_ms);

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "staging listing interrupted");
                    break;
                }
            };
            let Some(stamp) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) else {
                continue;
            };
            if stamp >= cutoff || self.is_live(SessionId(stamp)) {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "cannot inspect staging entry");
                    continue;
                }
            }
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to remove expired session"),
            }
        }
        Ok(removed)
    }
}

/// Keeps a session marked live in its [`Staging`]; unmarks it on drop.
#[derive(Debug)]
struct SessionLease {
    id: SessionId,
    live: Arc<Mutex<HashSet<SessionId>>>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// The directory owned by a single session. Clones share one lease: the
/// session stays live until the last clone is dropped.
#[derive(Debug, Clone)]
pub struct SessionDir {
    id: SessionId,
    path: PathBuf,
    _lease: Arc<SessionLease>,
}

impl SessionDir {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn artifact_path(&self, artifact: Artifact) -> PathBuf {
        self.path.join(artifact.file_name(self.id))
    }

    /// Write an artifact. Fails if the artifact has already been written.
    pub async fn write(&self, artifact: Artifact, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.artifact_path(artifact);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(contents).await?;
        file.flush().await?;
        debug!(path = %path.display(), bytes = contents.len(), "artifact staged");
        Ok(path)
    }
}
