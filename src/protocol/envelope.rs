//! Length-prefixed byte strings ("envelopes").
//!
//! Wire format: `i32` Big Endian byte length followed by exactly that many
//! raw bytes. Zero-length is valid and encodes the empty string. Payloads
//! are UTF-8 text by convention where they carry human-readable messages
//! (exception text, barrier replies).

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, WorkerError};

/// Maximum accepted envelope payload (1 GB).
pub const MAX_ENVELOPE_LEN: i32 = 1_073_741_824;

/// Write one envelope: length prefix then payload.
///
/// Does not flush; callers own the flush policy of their stream.
pub async fn write_envelope<W>(out: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_i32(payload.len() as i32).await?;
    out.write_all(payload).await?;
    Ok(())
}

/// Read one envelope, validating the length prefix.
///
/// A negative length here is a framing violation: sentinels are never
/// valid where an envelope is expected.
pub async fn read_envelope<R>(input: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let len = input.read_i32().await?;
    if len < 0 {
        return Err(WorkerError::Protocol(format!(
            "negative envelope length {}",
            len
        )));
    }
    if len > MAX_ENVELOPE_LEN {
        return Err(WorkerError::Protocol(format!(
            "envelope length {} exceeds maximum {}",
            len, MAX_ENVELOPE_LEN
        )));
    }
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_envelope_roundtrip() {
        let (mut client, mut server) = duplex(4096);

        write_envelope(&mut client, b"hello worker").await.unwrap();
        let payload = read_envelope(&mut server).await.unwrap();

        assert_eq!(&payload[..], b"hello worker");
    }

    #[tokio::test]
    async fn test_empty_envelope_is_valid() {
        let (mut client, mut server) = duplex(64);

        write_envelope(&mut client, b"").await.unwrap();
        let payload = read_envelope(&mut server).await.unwrap();

        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_negative_length_rejected() {
        let (mut client, mut server) = duplex(64);

        client.write_i32(-3).await.unwrap();
        let result = read_envelope(&mut server).await;

        assert!(matches!(result, Err(WorkerError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut client, mut server) = duplex(64);

        client.write_i32(i32::MAX).await.unwrap();
        let result = read_envelope(&mut server).await;

        assert!(matches!(result, Err(WorkerError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_big_endian_length_prefix() {
        let (mut client, mut server) = duplex(64);

        write_envelope(&mut client, b"abcd").await.unwrap();

        let mut raw = [0u8; 8];
        server.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw[..4], &[0, 0, 0, 4]);
        assert_eq!(&raw[4..], b"abcd");
    }
}
