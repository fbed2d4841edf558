//! Length-prefixed opaque byte records.
//!
//! The simplest record format: every command and record is one envelope,
//! an `i32` length followed by that many raw bytes. What the bytes mean
//! is entirely up to the two endpoints.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use super::RecordCodec;
use crate::error::{Result, WorkerError};
use crate::pool::{WorkerReader, WorkerWriter};
use crate::protocol::{envelope, sentinel};

/// Codec passing records through as opaque length-prefixed byte strings.
pub struct RawRecordCodec {
    command: Bytes,
}

impl RawRecordCodec {
    /// Create a codec that writes `command` as the session's command
    /// section.
    pub fn new(command: impl Into<Bytes>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The configured command section bytes.
    pub fn command(&self) -> &Bytes {
        &self.command
    }
}

impl Default for RawRecordCodec {
    fn default() -> Self {
        Self::new(Bytes::new())
    }
}

#[async_trait]
impl RecordCodec for RawRecordCodec {
    type Input = Bytes;
    type Output = Bytes;

    async fn write_command(&self, out: &mut WorkerWriter) -> Result<()> {
        envelope::write_envelope(out, &self.command).await
    }

    async fn write_record(&self, out: &mut WorkerWriter, record: Bytes) -> Result<()> {
        envelope::write_envelope(out, &record).await
    }

    async fn read_record(&self, marker: i32, input: &mut WorkerReader) -> Result<Bytes> {
        match marker {
            sentinel::NULL_MARKER => Ok(Bytes::new()),
            len if len >= 0 => {
                let mut buf = vec![0u8; len as usize];
                input.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
            other => Err(WorkerError::Protocol(format!(
                "unexpected frame marker {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt, BufReader, BufWriter};

    use crate::pool::{BoxedReader, BoxedWriter};

    fn buffered_pair() -> (WorkerWriter, WorkerReader) {
        let (near, far) = duplex(64 * 1024);
        let (_, near_write) = tokio::io::split(near);
        let (far_read, _) = tokio::io::split(far);
        let writer = BufWriter::new(Box::new(near_write) as BoxedWriter);
        let reader = BufReader::new(Box::new(far_read) as BoxedReader);
        (writer, reader)
    }

    #[tokio::test]
    async fn test_command_and_record_roundtrip() {
        let codec = RawRecordCodec::new(&b"do-something"[..]);
        let (mut writer, mut reader) = buffered_pair();

        codec.write_command(&mut writer).await.unwrap();
        codec
            .write_record(&mut writer, Bytes::from_static(b"payload"))
            .await
            .unwrap();
        writer.flush().await.unwrap();

        let command = envelope::read_envelope(&mut reader).await.unwrap();
        assert_eq!(&command[..], b"do-something");

        let marker = reader.read_i32().await.unwrap();
        let record = codec.read_record(marker, &mut reader).await.unwrap();
        assert_eq!(&record[..], b"payload");
    }

    #[tokio::test]
    async fn test_zero_length_record() {
        let codec = RawRecordCodec::default();
        let (mut writer, mut reader) = buffered_pair();

        codec.write_record(&mut writer, Bytes::new()).await.unwrap();
        writer.flush().await.unwrap();

        let marker = reader.read_i32().await.unwrap();
        assert_eq!(marker, 0);
        let record = codec.read_record(marker, &mut reader).await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_null_marker_decodes_to_empty() {
        let codec = RawRecordCodec::default();
        let (_writer, mut reader) = buffered_pair();

        let record = codec
            .read_record(sentinel::NULL_MARKER, &mut reader)
            .await
            .unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_negative_marker_rejected() {
        let codec = RawRecordCodec::default();
        let (_writer, mut reader) = buffered_pair();

        let result = codec.read_record(-42, &mut reader).await;
        assert!(matches!(result, Err(WorkerError::Protocol(_))));
    }
}
