//! Length-prefixed JSON framing
//!
//! Every message on the wire is a 4-byte big-endian body length followed by a
//! JSON body. A whole frame fits the fixed [`FRAME_BUFFER`], so the body is at
//! most [`MAX_BODY`] bytes. Oversized messages are rejected before anything is
//! written, and an oversized header is rejected before the body is read.

use arrayvec::ArrayVec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{FRAME_BUFFER, FRAME_HEADER};

/// Largest JSON body a frame can carry.
pub const MAX_BODY: usize = FRAME_BUFFER - FRAME_HEADER;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame body of {len} bytes exceeds {max}")]
    Oversized { len: usize, max: usize },
    #[error("connection closed mid-frame")]
    Truncated,
    #[error("malformed frame body: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Serialize `value` into one complete frame.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<ArrayVec<u8, FRAME_BUFFER>, FrameError> {
    let body = serde_json::to_vec(value)?;
    let oversized = || FrameError::Oversized {
        len: body.len(),
        max: MAX_BODY,
    };
    if body.len() > MAX_BODY {
        return Err(oversized());
    }

    let mut frame = ArrayVec::<u8, FRAME_BUFFER>::new();
    let header = u32::try_from(body.len()).map_err(|_| oversized())?.to_be_bytes();
    frame.try_extend_from_slice(&header).map_err(|_| oversized())?;
    frame.try_extend_from_slice(&body).map_err(|_| oversized())?;
    Ok(frame)
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(value)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` is a clean close between frames.
///
/// A body that is not valid JSON for `T` is consumed in full before the error
/// is returned, so the stream stays aligned on frame boundaries.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; FRAME_HEADER];
    let mut filled = 0;
    while filled < FRAME_HEADER {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(FrameError::Truncated)
            };
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_BODY {
        return Err(FrameError::Oversized { len, max: MAX_BODY });
    }

    let mut body = [0u8; MAX_BODY];
    reader
        .read_exact(&mut body[..len])
        .await
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::Truncated,
            _ => FrameError::Io(err),
        })?;
    Ok(Some(serde_json::from_slice(&body[..len])?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn header_is_big_endian_body_length() {
        let frame = encode_frame(&json!({"cmd": "ping"})).unwrap();
        let body = br#"{"cmd":"ping"}"#;
        assert_eq!(&frame[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&frame[4..], body);
    }

    #[test]
    fn oversized_body_is_rejected_before_sending() {
        let big = "x".repeat(MAX_BODY);
        let err = encode_frame(&big).unwrap_err();
        assert!(matches!(err, FrameError::Oversized { len, .. } if len == MAX_BODY + 2));
    }

    #[test]
    fn body_of_exactly_max_size_fits() {
        let fits = "x".repeat(MAX_BODY - 2);
        assert_eq!(encode_frame(&fits).unwrap().len(), FRAME_BUFFER);
    }

    #[tokio::test]
    async fn reads_back_consecutive_frames() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &json!({"n": 1})).await.unwrap();
        write_frame(&mut wire, &json!({"n": 2})).await.unwrap();

        let mut reader = wire.as_slice();
        let a: Value = read_frame(&mut reader).await.unwrap().unwrap();
        let b: Value = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!((a["n"].as_u64(), b["n"].as_u64()), (Some(1), Some(2)));
        assert!(read_frame::<_, Value>(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_header_is_rejected_unread() {
        let mut wire = 5000u32.to_be_bytes().to_vec();
        wire.extend_from_slice(&[b'x'; 16]);
        let err = read_frame::<_, Value>(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, FrameError::Oversized { len: 5000, .. }));
    }

    #[tokio::test]
    async fn partial_frames_are_truncated() {
        let mut header_only = &[0u8, 0][..];
        assert!(matches!(
            read_frame::<_, Value>(&mut header_only).await,
            Err(FrameError::Truncated)
        ));

        let mut short_body = Vec::from(10u32.to_be_bytes());
        short_body.extend_from_slice(b"{}");
        assert!(matches!(
            read_frame::<_, Value>(&mut short_body.as_slice()).await,
            Err(FrameError::Truncated)
        ));
    }

    #[tokio::test]
    async fn header_split_across_reads_is_reassembled() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0, 0])
            .read(&[0, 7, b'{'])
            .read(br#""a":1}"#)
            .build();
        let v: Value = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(v["a"], 1);
    }

    #[tokio::test]
    async fn malformed_body_keeps_stream_aligned() {
        let mut wire = Vec::from(3u32.to_be_bytes());
        wire.extend_from_slice(b"{x}");
        write_frame(&mut wire, &json!("next")).await.unwrap();

        let mut reader = wire.as_slice();
        assert!(matches!(
            read_frame::<_, Value>(&mut reader).await,
            Err(FrameError::Json(_))
        ));
        let next: Value = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(next, "next");
    }
}
