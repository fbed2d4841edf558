//! Worker-pool collaborator interface.
//!
//! Spawning, health-checking and pooling of worker processes live outside
//! this crate. Sessions consume the pool through three operations: acquire
//! a worker for an (executable, environment) key, release it back to the
//! idle pool, or destroy it. [`ReleaseState`] arbitrates which session
//! path gets to end a given worker.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};

use crate::error::Result;

/// Read half of a worker's byte stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a worker's byte stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Buffered read half, as handed to the reader sequence and record codec.
pub type WorkerReader = BufReader<BoxedReader>;

/// Buffered write half, as owned by the writer task.
pub type WorkerWriter = BufWriter<BoxedWriter>;

/// Pool key: the worker executable plus the environment it runs under.
///
/// Two tasks share a pooled worker population only when both parts match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerKey {
    /// Worker runtime executable identity.
    pub exec: String,
    /// Environment variables the worker was (or will be) started with.
    pub env: BTreeMap<String, String>,
}

impl WorkerKey {
    /// Create a new pool key.
    pub fn new(exec: impl Into<String>, env: BTreeMap<String, String>) -> Self {
        Self {
            exec: exec.into(),
            env,
        }
    }
}

/// The two directed byte streams of one worker connection.
pub struct WorkerIo {
    /// Stream carrying worker output toward the session.
    pub reader: BoxedReader,
    /// Stream carrying session input toward the worker.
    pub writer: BoxedWriter,
}

/// One acquired worker process and its private connection.
///
/// Owned by a single session for the task's duration. The streams are
/// taken exactly once at session start; the handle itself stays shared so
/// that whichever of {completion hook, reader, watchdog} ends the worker
/// can name it to the pool.
pub struct WorkerHandle {
    id: u64,
    io: Mutex<Option<WorkerIo>>,
}

impl WorkerHandle {
    /// Create a handle for a connected worker.
    pub fn new(id: u64, io: WorkerIo) -> Self {
        Self {
            id,
            io: Mutex::new(Some(io)),
        }
    }

    /// Opaque worker identifier, stable for the handle's lifetime.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the worker's streams. Yields `Some` exactly once.
    pub fn take_io(&self) -> Option<WorkerIo> {
        self.io.lock().ok()?.take()
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Pool of reusable worker processes, keyed by (executable, environment).
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Acquire an idle or freshly spawned worker for the key.
    async fn acquire(&self, key: &WorkerKey) -> Result<Arc<WorkerHandle>>;

    /// Return a healthy worker to the idle pool.
    async fn release(&self, key: &WorkerKey, worker: Arc<WorkerHandle>) -> Result<()>;

    /// Forcibly terminate a worker. It must never re-enter the pool.
    async fn destroy(&self, key: &WorkerKey, worker: Arc<WorkerHandle>) -> Result<()>;
}

/// Arbitrates which of {release, close-on-completion} wins for a worker.
///
/// Exactly one claimant observes `try_claim() == true`; every other
/// context attempting the transition sees it already performed and skips
/// its own action. The watchdog's forced destroy bypasses this flag: a
/// destroyed worker must never be returned to the idle pool, so the
/// watchdog does not participate in the race.
#[derive(Debug, Default)]
pub struct ReleaseState {
    released_or_closed: AtomicBool,
}

impl ReleaseState {
    /// Create an unclaimed flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt the released-or-closed transition.
    ///
    /// Returns `true` for exactly one caller.
    pub fn try_claim(&self) -> bool {
        self.released_or_closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether some context already released or closed the worker.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.released_or_closed.load(Ordering::Acquire)
    }
}
