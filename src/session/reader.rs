//! Reader sequence over the worker's output stream.
//!
//! A lazy, single-pass, non-restartable pull sequence: each pull decodes
//! at most one output record, demultiplexing normal result frames,
//! exception frames and stream-end markers. Clean termination triggers
//! the worker's release back to the pool (when reuse is enabled) through
//! the shared [`ReleaseState`](crate::pool::ReleaseState) race.

use std::sync::Arc;

use tokio::io::AsyncReadExt;

use super::writer::FailureSlot;
use super::SessionState;
use crate::codec::RecordCodec;
use crate::error::{Result, WorkerError};
use crate::pool::WorkerReader;
use crate::protocol::{envelope, sentinel};
use crate::task::TaskContext;

/// Lazy pull sequence of worker output records.
///
/// Produced by [`WorkerSession::run`](super::WorkerSession::run). Pulling
/// blocks on the worker socket; an interrupted task aborts the pull
/// promptly with [`WorkerError::Cancelled`] instead of hanging on a
/// stalled read.
pub struct ResultStream<C: RecordCodec> {
    reader: WorkerReader,
    codec: Arc<C>,
    ctx: Arc<TaskContext>,
    state: SessionState,
    failure: FailureSlot,
    exhausted: bool,
}

impl<C: RecordCodec> ResultStream<C> {
    pub(crate) fn new(
        reader: WorkerReader,
        codec: Arc<C>,
        ctx: Arc<TaskContext>,
        state: SessionState,
        failure: FailureSlot,
    ) -> Self {
        Self {
            reader,
            codec,
            ctx,
            state,
            failure,
            exhausted: false,
        }
    }

    /// Pull the next output record.
    ///
    /// Returns `None` forever once the stream is exhausted. A session that
    /// fails yields exactly one `Err`, already classified, and is then
    /// exhausted.
    pub async fn next(&mut self) -> Option<Result<C::Output>> {
        if self.exhausted {
            return None;
        }

        let ctx = self.ctx.clone();
        let step = tokio::select! {
            biased;
            _ = ctx.interrupted() => Err(WorkerError::Cancelled),
            result = self.advance() => result,
        };

        match step {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.exhausted = true;
                Some(Err(self.translate(err)))
            }
        }
    }

    /// Decode frames until one record, an error or end-of-stream.
    async fn advance(&mut self) -> Result<Option<C::Output>> {
        loop {
            let marker = self.reader.read_i32().await?;
            match marker {
                sentinel::WORKER_EXCEPTION => {
                    let payload = envelope::read_envelope(&mut self.reader).await?;
                    let message = String::from_utf8_lossy(&payload).into_owned();
                    let cause = self.failure.get().cloned();
                    return Err(WorkerError::WorkerRaised { message, cause });
                }
                sentinel::END_OF_DATA_SECTION => {
                    let next = self.reader.read_i32().await?;
                    if next == sentinel::END_OF_STREAM {
                        self.finish().await;
                        return Ok(None);
                    }
                    return self.decode(next).await.map(Some);
                }
                sentinel::END_OF_STREAM => {
                    self.finish().await;
                    return Ok(None);
                }
                sentinel::TIMING_DATA => {
                    let timing = envelope::read_envelope(&mut self.reader).await?;
                    tracing::debug!(bytes = timing.len(), "timing data from worker");
                }
                marker => return self.decode(marker).await.map(Some),
            }
        }
    }

    async fn decode(&mut self, marker: i32) -> Result<C::Output> {
        let codec = self.codec.clone();
        codec.read_record(marker, &mut self.reader).await
    }

    /// Clean termination: release the worker if reuse is enabled and no
    /// other context settled it first.
    async fn finish(&mut self) {
        self.exhausted = true;
        if self.state.reuse && self.state.release_state.try_claim() {
            if let Err(err) = self
                .state
                .pool
                .release(&self.state.key, self.state.worker.clone())
                .await
            {
                tracing::warn!(
                    error = %err,
                    worker = self.state.worker.id(),
                    "failed to release worker to pool"
                );
            }
        }
    }

    /// Classify a pull-time failure.
    ///
    /// Interruption wins over everything: whatever the socket reported is
    /// an artifact of the cancellation. A worker exception envelope is the
    /// primary content and passes through with its recorded cause. A
    /// recorded write-side failure wins over the reader's own symptom,
    /// which is typically the unexpected end-of-file the failure caused.
    /// A bare end-of-file means the worker died.
    fn translate(&self, err: WorkerError) -> WorkerError {
        if self.ctx.is_interrupted() {
            return WorkerError::Cancelled;
        }
        if matches!(err, WorkerError::WorkerRaised { .. }) {
            return err;
        }
        if let Some(cause) = self.failure.get() {
            return WorkerError::WriteSide(cause.clone());
        }
        match err {
            WorkerError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                WorkerError::UnexpectedExit
            }
            other => other,
        }
    }
}
