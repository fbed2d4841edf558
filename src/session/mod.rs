//! Worker session orchestration.
//!
//! A session acquires one pooled worker for one task, starts the writer
//! task and the watchdog (plus, for barrier tasks, the side-channel
//! acceptor), and hands the caller a lazy [`ResultStream`] over the
//! worker's output.
//!
//! ```text
//!                  ┌─────────────────────────────────────────────┐
//!                  │                WorkerSession                │
//!                  │                                             │
//!  input records ──┼──► writer task ───► socket ───► worker      │
//!                  │                                   │         │
//!  output records ◄┼─── ResultStream ◄── socket ◄──────┘         │
//!                  │                                             │
//!                  │  watchdog ──────── destroys stuck workers   │
//!                  │  barrier channel ─ worker callbacks (opt.)  │
//!                  └─────────────────────────────────────────────┘
//! ```
//!
//! Four logically concurrent activities share one socket and one pooled
//! slot: the writer task owns the write half, the caller's pull loop
//! drives the read half, the watchdog supervises, and the barrier
//! acceptor answers worker callbacks. The worker process itself enforces
//! read-after-write ordering of the protocol, so writer and reader need
//! no mutual synchronization beyond the socket's own backpressure. The
//! three paths that may terminate the worker (completion hook, reader's
//! end-of-stream handler, watchdog) agree through one atomic
//! [`ReleaseState`] transition.

mod reader;
mod watchdog;
mod writer;

pub use reader::ResultStream;

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use tokio::io::{BufReader, BufWriter};

use crate::barrier;
use crate::codec::RecordCodec;
use crate::config::{WorkerConfig, ENV_BUFFER_SIZE, ENV_WORKER_MEMORY_MB, ENV_WORKER_REUSE};
use crate::error::{Result, WorkerError};
use crate::pool::{ReleaseState, WorkerHandle, WorkerKey, WorkerPool};
use crate::task::TaskContext;

/// Shared session internals handed to the reader sequence.
pub(crate) struct SessionState {
    pub(crate) pool: Arc<dyn WorkerPool>,
    pub(crate) key: WorkerKey,
    pub(crate) worker: Arc<WorkerHandle>,
    pub(crate) release_state: Arc<ReleaseState>,
    pub(crate) reuse: bool,
}

/// Drives one worker per task over a private socket.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use pywire::{RawRecordCodec, TaskContext, WorkerConfig, WorkerSession};
///
/// let session = WorkerSession::new(pool, Arc::new(RawRecordCodec::new(command)), WorkerConfig::default());
/// let ctx = Arc::new(TaskContext::new());
/// let mut output = session.run(env, partition, records.into_iter(), ctx.clone()).await?;
/// while let Some(record) = output.next().await {
///     handle(record?);
/// }
/// ctx.mark_completed();
/// ```
pub struct WorkerSession<C: RecordCodec> {
    pool: Arc<dyn WorkerPool>,
    codec: Arc<C>,
    config: WorkerConfig,
}

impl<C: RecordCodec> WorkerSession<C> {
    /// Create a session factory over a worker pool and a record codec.
    pub fn new(pool: Arc<dyn WorkerPool>, codec: Arc<C>, config: WorkerConfig) -> Self {
        Self {
            pool,
            codec,
            config,
        }
    }

    /// The resolved configuration this session runs with.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one task against a pooled worker.
    ///
    /// Acquires a worker keyed by (executable, environment), starts the
    /// writer task and the watchdog, and returns the lazy output
    /// sequence. The worker is returned to the pool or destroyed exactly
    /// once regardless of how the task ends.
    ///
    /// `env` is mutated once here to carry the session settings and must
    /// be treated as session-private afterwards.
    pub async fn run<I>(
        &self,
        mut env: BTreeMap<String, String>,
        partition: i32,
        input: I,
        ctx: Arc<TaskContext>,
    ) -> Result<ResultStream<C>>
    where
        I: Iterator<Item = C::Input> + Send + 'static,
    {
        env.insert(
            ENV_BUFFER_SIZE.to_string(),
            self.config.buffer_size.to_string(),
        );
        env.insert(
            ENV_WORKER_REUSE.to_string(),
            String::from(if self.config.worker_reuse { "1" } else { "0" }),
        );
        if let Some(mb) = self.config.memory_per_core_mb() {
            env.insert(ENV_WORKER_MEMORY_MB.to_string(), mb.to_string());
        }

        // No free local port is fatal to the whole session; fail before
        // any worker state is touched or protocol byte written.
        let barrier_listener = if ctx.is_barrier_capable() {
            Some(barrier::bind().await?)
        } else {
            None
        };

        let key = WorkerKey::new(self.config.worker_exec.clone(), env);
        let worker = self.pool.acquire(&key).await?;
        let Some(io) = worker.take_io() else {
            let _ = self.pool.destroy(&key, worker.clone()).await;
            return Err(WorkerError::Pool(
                "acquired worker has no usable streams".to_string(),
            ));
        };

        let reader = BufReader::with_capacity(self.config.buffer_size, io.reader);
        let out = BufWriter::with_capacity(self.config.buffer_size, io.writer);

        let release_state = Arc::new(ReleaseState::new());
        self.register_completion_hook(&ctx, &key, &worker, &release_state);

        let barrier_port = barrier_listener.map(|(listener, port)| {
            tokio::spawn(barrier::serve(listener, ctx.clone()));
            port
        });

        let failure: writer::FailureSlot = Arc::new(OnceLock::new());
        let _writer_task = writer::spawn(
            out,
            self.codec.clone(),
            input,
            partition,
            barrier_port,
            ctx.clone(),
            failure.clone(),
        );
        let _watchdog = watchdog::spawn(
            self.pool.clone(),
            key.clone(),
            worker.clone(),
            ctx.clone(),
            self.config.kill_timeout(),
            watchdog::POLL_INTERVAL,
        );

        let state = SessionState {
            pool: self.pool.clone(),
            key,
            worker,
            release_state,
            reuse: self.config.worker_reuse,
        };
        Ok(ResultStream::new(
            reader,
            self.codec.clone(),
            ctx,
            state,
            failure,
        ))
    }

    /// On task completion, whoever wins the release race closes the
    /// worker. A worker already released to the pool leaves the race
    /// settled and this hook is a no-op.
    fn register_completion_hook(
        &self,
        ctx: &Arc<TaskContext>,
        key: &WorkerKey,
        worker: &Arc<WorkerHandle>,
        release_state: &Arc<ReleaseState>,
    ) {
        let pool = self.pool.clone();
        let key = key.clone();
        let worker = worker.clone();
        let release_state = release_state.clone();
        ctx.on_complete(move || {
            if release_state.try_claim() {
                tokio::spawn(async move {
                    if let Err(err) = pool.destroy(&key, worker).await {
                        tracing::warn!(error = %err, "failed to close worker on task completion");
                    }
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::codec::RawRecordCodec;
    use crate::pool::WorkerIo;

    /// Pool that records the acquisition key and hands out a worker wired
    /// to a detached duplex peer.
    #[derive(Default)]
    struct RecordingPool {
        seen_keys: Mutex<Vec<WorkerKey>>,
        destroyed: AtomicUsize,
    }

    #[async_trait]
    impl WorkerPool for RecordingPool {
        async fn acquire(&self, key: &WorkerKey) -> Result<Arc<WorkerHandle>> {
            self.seen_keys.lock().unwrap().push(key.clone());
            let (host, peer) = tokio::io::duplex(64 * 1024);
            let (reader, writer) = tokio::io::split(host);
            // Keep the peer alive for the test's duration.
            tokio::spawn(async move {
                let _peer = peer;
                tokio::time::sleep(Duration::from_secs(5)).await;
            });
            Ok(Arc::new(WorkerHandle::new(
                1,
                WorkerIo {
                    reader: Box::new(reader),
                    writer: Box::new(writer),
                },
            )))
        }

        async fn release(&self, _key: &WorkerKey, _worker: Arc<WorkerHandle>) -> Result<()> {
            Ok(())
        }

        async fn destroy(&self, _key: &WorkerKey, _worker: Arc<WorkerHandle>) -> Result<()> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_environment_is_injected_before_acquisition() {
        let pool = Arc::new(RecordingPool::default());
        let config = WorkerConfig {
            buffer_size: 8192,
            executor_memory_mb: Some(2048),
            executor_cores: 2,
            ..WorkerConfig::default()
        };
        let session = WorkerSession::new(
            pool.clone(),
            Arc::new(RawRecordCodec::default()),
            config,
        );
        let ctx = Arc::new(TaskContext::new());

        let _stream = session
            .run(
                BTreeMap::new(),
                0,
                std::iter::empty::<Bytes>(),
                ctx.clone(),
            )
            .await
            .unwrap();

        let keys = pool.seen_keys.lock().unwrap();
        let env = &keys[0].env;
        assert_eq!(env.get(ENV_BUFFER_SIZE).unwrap(), "8192");
        assert_eq!(env.get(ENV_WORKER_REUSE).unwrap(), "1");
        assert_eq!(env.get(ENV_WORKER_MEMORY_MB).unwrap(), "1024");
        assert_eq!(keys[0].exec, "python3");

        ctx.mark_completed();
    }

    #[tokio::test]
    async fn test_completion_hook_closes_unreleased_worker() {
        let pool = Arc::new(RecordingPool::default());
        let session = WorkerSession::new(
            pool.clone(),
            Arc::new(RawRecordCodec::default()),
            WorkerConfig::default(),
        );
        let ctx = Arc::new(TaskContext::new());

        let _stream = session
            .run(
                BTreeMap::new(),
                0,
                std::iter::empty::<Bytes>(),
                ctx.clone(),
            )
            .await
            .unwrap();

        ctx.mark_completed();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(pool.destroyed.load(Ordering::SeqCst), 1);
    }
}
