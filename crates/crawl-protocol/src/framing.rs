/// Length-framed JSON transport for the worker socket.
///
/// Frame format: a 4-byte big-endian length prefix followed by that many
/// bytes of UTF-8 JSON. Same shape as the teacher's `bridge_ipc` framing,
/// widened from a 2-byte length (MIDI payloads are small) to 4 bytes
/// because crawled documents are not.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Refuse to allocate for a frame claiming to be larger than this. Guards
/// against a corrupt or malicious length prefix.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("frame of {0} bytes exceeds the {1}-byte limit")]
    FrameTooLarge(u32, u32),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write one length-prefixed JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FramingError>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)?;
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame, or `Err(ConnectionClosed)` if the
/// peer closed before sending a length prefix.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, FramingError>
where
    R: tokio::io::AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(FramingError::FrameTooLarge(len, MAX_FRAME_BYTES));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let message = serde_json::from_slice(&body)?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ClientMessage, WorkerRole};
    use crate::PROTOCOL_VERSION;

    #[tokio::test]
    async fn roundtrips_a_hello_message() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let msg = ClientMessage::Hello {
            v: PROTOCOL_VERSION,
            role: WorkerRole::Parser,
            id: "parser-7".to_string(),
        };
        write_frame(&mut client, &msg).await.unwrap();

        let received: ClientMessage = read_frame(&mut server).await.unwrap();
        match received {
            ClientMessage::Hello { role, id, .. } => {
                assert_eq!(role, WorkerRole::Parser);
                assert_eq!(id, "parser-7");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let huge = MAX_FRAME_BYTES + 1;
        client.write_all(&huge.to_be_bytes()).await.unwrap();

        let result: Result<ClientMessage, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(FramingError::FrameTooLarge(_, _))));
    }

    #[tokio::test]
    async fn closed_connection_before_any_bytes_is_reported() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let result: Result<ClientMessage, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }
}
