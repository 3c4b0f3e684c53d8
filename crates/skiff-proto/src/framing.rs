//! Record framing over a duplex byte stream.
//!
//! The rest of the workspace never sees short I/O: a record is read with
//! exactly its fixed length or the read fails with `TransportClosed`, and a
//! write either completes fully or errors.

use crate::WireError;
use crate::records::Record;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read exactly `buf.len()` bytes.
///
/// A stream that closes mid-record yields [`WireError::TransportClosed`].
pub async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
{
    reader.read_exact(buf).await?;
    Ok(())
}

/// Write all of `buf`.
pub async fn write_all<W>(writer: &mut W, buf: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one fixed-layout record.
pub async fn read_record<R, T>(reader: &mut R) -> Result<T, WireError>
where
    R: AsyncRead + Unpin,
    T: Record,
{
    let mut buf = vec![0u8; T::LEN];
    read_exact(reader, &mut buf).await?;
    T::decode(&buf)
}

/// Write one fixed-layout record.
pub async fn write_record<W, T>(writer: &mut W, record: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Record,
{
    write_all(writer, &record.to_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{KxInit, ResponseRecord};

    #[tokio::test]
    async fn test_record_roundtrip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let init = KxInit {
            public_key: [7u8; 32],
            nonce: [9u8; 24],
        };
        write_record(&mut client, &init).await.unwrap();

        let received: KxInit = read_record(&mut server).await.unwrap();
        assert_eq!(received.public_key, init.public_key);
        assert_eq!(received.nonce, init.nonce);
    }

    #[tokio::test]
    async fn test_short_read_is_transport_closed() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        // Half a response record, then EOF.
        write_all(&mut client, &[0u8; ResponseRecord::LEN / 2])
            .await
            .unwrap();
        drop(client);

        let result: Result<ResponseRecord, _> = read_record(&mut server).await;
        assert!(matches!(result, Err(WireError::TransportClosed)));
    }

    #[tokio::test]
    async fn test_eof_before_any_bytes() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result: Result<KxInit, _> = read_record(&mut server).await;
        assert!(matches!(result, Err(WireError::TransportClosed)));
    }
}
