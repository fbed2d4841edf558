//! Record codecs - the payload-format seam.
//!
//! The session engine owns the transport framing (section markers,
//! envelopes, end-of-stream) and delegates the bytes inside command and
//! data sections to a [`RecordCodec`]. Control markers (end-of-data,
//! exception, timing, end-of-stream) never reach the codec; format-owned
//! markers such as null, stream-start and schema sections are passed
//! through as `marker` for the codec to interpret.

mod raw;

pub use raw::RawRecordCodec;

use async_trait::async_trait;

use crate::error::Result;
use crate::pool::{WorkerReader, WorkerWriter};

/// Payload-format-specific encoding of command and record sections.
#[async_trait]
pub trait RecordCodec: Send + Sync + 'static {
    /// Input record type streamed to the worker.
    type Input: Send + 'static;
    /// Output record type produced by the worker.
    type Output: Send + 'static;

    /// Write the opaque command section.
    async fn write_command(&self, out: &mut WorkerWriter) -> Result<()>;

    /// Write one input record as an opaque data frame.
    async fn write_record(&self, out: &mut WorkerWriter, record: Self::Input) -> Result<()>;

    /// Decode one output record.
    ///
    /// `marker` is the already-read frame marker: a non-negative payload
    /// length, or a format-owned negative marker the session does not
    /// interpret itself.
    async fn read_record(&self, marker: i32, input: &mut WorkerReader) -> Result<Self::Output>;
}
