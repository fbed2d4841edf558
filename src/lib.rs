//! # pywire
//!
//! Drives a pool of out-of-process Python compute workers over private
//! local sockets, one worker per parallel task.
//!
//! The session engine streams input records to a worker, streams computed
//! results back, and supervises the worker's lifecycle: reuse across
//! tasks, cooperative cancellation, crash recovery and forced
//! termination of unresponsive workers.
//!
//! ## Architecture
//!
//! - **Transport protocol** ([`protocol`]): sentinel section markers and
//!   length-prefixed envelopes delimiting commands, data, exceptions and
//!   end-of-stream. The payload format itself is opaque here.
//! - **Record codec** ([`codec`]): the payload-format seam; the built-in
//!   [`RawRecordCodec`] passes records through as opaque byte strings.
//! - **Worker pool** ([`pool`]): collaborator interface for acquiring,
//!   releasing and destroying worker processes, keyed by executable and
//!   environment.
//! - **Session engine** ([`session`]): the concurrent writer task, the
//!   lazy [`ResultStream`] reader sequence and the watchdog around one
//!   shared socket, with exactly-once release semantics under concurrent
//!   cancellation.
//! - **Barrier side channel** ([`barrier`]): optional per-session local
//!   listener through which a worker performs a distributed rendezvous.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pywire::{RawRecordCodec, TaskContext, WorkerConfig, WorkerSession};
//!
//! let codec = Arc::new(RawRecordCodec::new(command_bytes));
//! let session = WorkerSession::new(pool, codec, WorkerConfig::default());
//!
//! let ctx = Arc::new(TaskContext::new());
//! let mut output = session
//!     .run(task_env, partition_index, input_records, ctx.clone())
//!     .await?;
//!
//! while let Some(record) = output.next().await {
//!     sink(record?);
//! }
//! ctx.mark_completed();
//! ```

pub mod barrier;
pub mod codec;
pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod task;

pub use codec::{RawRecordCodec, RecordCodec};
pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use pool::{
    BoxedReader, BoxedWriter, ReleaseState, WorkerHandle, WorkerIo, WorkerKey, WorkerPool,
    WorkerReader, WorkerWriter,
};
pub use session::{ResultStream, WorkerSession};
pub use task::{BarrierCoordinator, TaskContext};
