//! Frame codec for the RPC wire protocol.
//!
//! Frame format:
//! ```text
//! ┌──────────┬──────────┬────────────────────────┐
//! │ len (4B) │ type(1B) │   msgpack payload      │
//! │ u32 BE   │ u8       │                        │
//! └──────────┴──────────┴────────────────────────┘
//! ```
//! Length = sizeof(type byte) + sizeof(payload), NOT including the 4-byte prefix.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::types::{Error, Result};

/// Message type: request from client.
pub const MSG_REQUEST: u8 = 0x01;
/// Message type: successful response to client.
pub const MSG_RESPONSE: u8 = 0x02;
/// Message type: error response to client.
pub const MSG_ERROR: u8 = 0xFF;

/// One decoded frame: type byte plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Decode the payload of a client request.
    ///
    /// Frames of any other type, and payloads that are not msgpack for `T`,
    /// are validation errors; the connection stays usable after either.
    pub fn decode_request<T: DeserializeOwned>(&self) -> Result<T> {
        if self.msg_type != MSG_REQUEST {
            return Err(Error::validation(format!(
                "unexpected message type: 0x{:02X}",
                self.msg_type
            )));
        }
        rmp_serde::from_slice(&self.payload)
            .map_err(|e| Error::validation(format!("invalid msgpack: {}", e)))
    }
}

fn invalid_data(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

/// Read one frame, or `None` on clean EOF before a length prefix.
///
/// Frames whose length exceeds `max_frame_bytes`, or that lack the type
/// byte, are `InvalidData`; the stream is then out of sync and must be closed.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> std::io::Result<Option<Frame>> {
    let frame_len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if frame_len > max_frame_bytes {
        return Err(invalid_data(format!(
            "frame too large: {} bytes (limit {})",
            frame_len, max_frame_bytes
        )));
    }
    let payload_len = usize::try_from(frame_len)
        .ok()
        .and_then(|len| len.checked_sub(1))
        .ok_or_else(|| invalid_data("frame too short: missing type byte"))?;

    let msg_type = reader.read_u8().await?;
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Frame { msg_type, payload }))
}

/// Write one frame to the stream.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    let frame_len = u32::try_from(payload.len() + 1).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "payload exceeds u32 frame length")
    })?;
    writer.write_all(&frame_len.to_be_bytes()).await?;
    writer.write_all(&[msg_type]).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode a value to msgpack with named fields. Logs and returns an error on
/// failure instead of silently producing an empty vec.
pub fn encode_msgpack<T: Serialize + ?Sized>(value: &T) -> std::io::Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| {
        tracing::error!(error = %e, "msgpack_encoding_failed");
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_layout() {
        let mut buf = Vec::new();
        write_frame(&mut buf, MSG_RESPONSE, b"abc").await.unwrap();
        assert_eq!(buf, vec![0, 0, 0, 4, MSG_RESPONSE, b'a', b'b', b'c']);

        let mut reader = buf.as_slice();
        let frame = read_frame(&mut reader, 1024).await.unwrap().unwrap();
        assert_eq!(frame.msg_type, MSG_RESPONSE);
        assert_eq!(frame.payload, b"abc");
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let mut reader: &[u8] = &[];
        assert!(read_frame(&mut reader, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        write_frame(&mut buf, MSG_REQUEST, &[0u8; 64]).await.unwrap();
        let mut reader = buf.as_slice();
        let err = read_frame(&mut reader, 16).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_zero_length_frame_rejected() {
        let mut reader: &[u8] = &[0, 0, 0, 0];
        assert!(read_frame(&mut reader, 16).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_an_error() {
        let mut reader: &[u8] = &[0, 0, 0, 8, MSG_REQUEST, 1, 2];
        let err = read_frame(&mut reader, 64).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Ping {
        id: String,
    }

    #[test]
    fn test_decode_request_checks_type_then_payload() {
        let payload = encode_msgpack(&serde_json::json!({"id": "7"})).unwrap();

        let request = Frame { msg_type: MSG_REQUEST, payload: payload.clone() };
        assert_eq!(request.decode_request::<Ping>().unwrap(), Ping { id: "7".to_string() });

        let response = Frame { msg_type: MSG_RESPONSE, payload };
        let err = response.decode_request::<Ping>().unwrap_err();
        assert!(err.to_string().contains("0x02"));

        let garbage = Frame { msg_type: MSG_REQUEST, payload: vec![0xC1] };
        assert!(matches!(garbage.decode_request::<Ping>(), Err(Error::Validation(_))));
    }
}
