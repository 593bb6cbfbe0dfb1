//! Wire framing shared by the control client and server
//!
//! Every message travels as a big-endian `u32` byte count followed by its
//! bincode encoding (serde, legacy configuration). Readers refuse frames
//! larger than the limit they are given before allocating for them.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ControlError, Result};

/// Encode `message` and write it as a single frame
pub async fn write_frame<W, T>(stream: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize + Sync,
{
    let bytes = bincode::serde::encode_to_vec(message, bincode::config::legacy())?;
    let len = u32::try_from(bytes.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;

    Ok(())
}

/// Read one frame of at most `max_len` bytes and decode it
///
/// `kind` names the message in the size error, e.g. "Request".
pub async fn read_frame<R, T>(stream: &mut R, max_len: u32, kind: &str) -> Result<T>
where
    R: AsyncRead + Unpin + Send,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ControlError::ConnectionClosed
        } else {
            ControlError::Io(e)
        }
    })?;

    let len = u32::from_be_bytes(len_buf);
    if len > max_len {
        return Err(ControlError::ProtocolDeserialization(
            bincode::error::DecodeError::OtherString(format!(
                "{kind} too large: {len} bytes (max {max_len})"
            )),
        ));
    }

    let mut bytes = vec![0u8; len as usize];
    stream.read_exact(&mut bytes).await?;

    let (message, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())?;
    Ok(message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_common::DeliveryRequest;

    use super::*;
    use crate::{DeliveryCommand, Request, RequestCommand};

    #[tokio::test]
    async fn test_frame_carries_a_request() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let request = Request::new(RequestCommand::Delivery(DeliveryCommand::Queue(
            DeliveryRequest::new("a@example.com", "Digest", "").with_idempotency_key("k1"),
        )));

        write_frame(&mut client, &request).await.unwrap();
        let received: Request = read_frame(&mut server, 1024, "Request").await.unwrap();

        match received.command {
            RequestCommand::Delivery(DeliveryCommand::Queue(request)) => {
                assert_eq!(request.idempotency_key(), Some("k1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_reading_body() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&500_u32.to_be_bytes()).await.unwrap();

        let result: Result<Request> = read_frame(&mut server, 100, "Request").await;
        match result {
            Err(ControlError::ProtocolDeserialization(e)) => {
                assert!(e.to_string().contains("Request too large: 500 bytes (max 100)"));
            }
            other => panic!("expected a size error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_stream_reported() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result: Result<Request> = read_frame(&mut server, 100, "Request").await;
        assert!(matches!(result, Err(ControlError::ConnectionClosed)));
    }
}
