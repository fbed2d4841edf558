//! Writer task: owns the worker's write half for the session's lifetime.
//!
//! Protocol order on the wire:
//! 1. `i32` partition index
//! 2. `u8` is-barrier-session flag
//! 3. `i32` barrier callback port (0 if absent)
//! 4. opaque command section (delegated to the codec)
//! 5. opaque data frames, draining the input sequence (delegated)
//! 6. `i32` end-of-stream sentinel, then flush
//!
//! The task is interruptible at every blocking point. When the task
//! context completes mid-write, nothing is recorded and the write side is
//! half-closed quietly. Any other failure is recorded into the
//! single-assignment failure slot for the reader sequence to consult, and
//! the write side is still half-closed so a worker blocked on its input
//! read unblocks. Failures never cross this task's boundary as raised
//! errors.

use std::sync::{Arc, OnceLock};

use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::codec::RecordCodec;
use crate::error::{Result, WorkerError};
use crate::pool::WorkerWriter;
use crate::protocol::sentinel;
use crate::task::TaskContext;

/// Single-assignment slot carrying the writer's failure to the reader.
pub(crate) type FailureSlot = Arc<OnceLock<Arc<WorkerError>>>;

/// Spawn the writer task for one session.
pub(crate) fn spawn<C, I>(
    mut out: WorkerWriter,
    codec: Arc<C>,
    input: I,
    partition: i32,
    barrier_port: Option<u16>,
    ctx: Arc<TaskContext>,
    failure: FailureSlot,
) -> JoinHandle<()>
where
    C: RecordCodec,
    I: Iterator<Item = C::Input> + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = tokio::select! {
            // Task finished while we were still writing: exit quietly.
            _ = ctx.completed() => Ok(()),
            result = write_session(&mut out, codec.as_ref(), input, partition, barrier_port) => result,
        };

        if let Err(err) = outcome {
            if ctx.is_completed() {
                tracing::debug!(error = %err, "write side failed after task completion");
            } else {
                tracing::debug!(error = %err, "recording write side failure");
                let _ = failure.set(Arc::new(err));
            }
        }

        // Always half-close the write side so a worker blocked on its
        // input read unblocks.
        if let Err(err) = out.shutdown().await {
            tracing::debug!(error = %err, "failed to shut down worker write side");
        }
    })
}

async fn write_session<C: RecordCodec>(
    out: &mut WorkerWriter,
    codec: &C,
    input: impl Iterator<Item = C::Input>,
    partition: i32,
    barrier_port: Option<u16>,
) -> Result<()> {
    out.write_i32(partition).await?;
    out.write_u8(u8::from(barrier_port.is_some())).await?;
    out.write_i32(barrier_port.map_or(0, i32::from)).await?;

    codec.write_command(out).await?;

    for record in input {
        codec.write_record(out, record).await?;
    }

    out.write_i32(sentinel::END_OF_STREAM).await?;
    out.flush().await?;
    Ok(())
}
