// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bus bridge framing.
//!
//! Wire format: `[1 byte type][4 bytes BE length N][N bytes payload]`

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{BusError, BusMessage, QoS};

pub const FRAME_CONNECT: u8 = 0x01;
pub const FRAME_CONNACK: u8 = 0x02;
pub const FRAME_SUBSCRIBE: u8 = 0x03;
pub const FRAME_PUBLISH: u8 = 0x04;
pub const FRAME_DISCONNECT: u8 = 0x05;

/// Maximum payload size (1 MB) to reject bogus frames early.
const MAX_PAYLOAD_SIZE: u32 = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Connect {
        client_id: String,
        will: Option<BusMessage>,
    },
    ConnAck,
    Subscribe(String),
    Publish(BusMessage),
    Disconnect,
}

impl Frame {
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Connect { .. } => FRAME_CONNECT,
            Frame::ConnAck => FRAME_CONNACK,
            Frame::Subscribe(_) => FRAME_SUBSCRIBE,
            Frame::Publish(_) => FRAME_PUBLISH,
            Frame::Disconnect => FRAME_DISCONNECT,
        }
    }

    pub fn encode(&self) -> Result<Bytes, BusError> {
        let mut buf = BytesMut::new();
        match self {
            Frame::Connect { client_id, will } => {
                put_str(&mut buf, client_id)?;
                match will {
                    Some(msg) => {
                        buf.put_u8(1);
                        put_message(&mut buf, msg)?;
                    }
                    None => buf.put_u8(0),
                }
            }
            Frame::Subscribe(filter) => put_str(&mut buf, filter)?,
            Frame::Publish(msg) => put_message(&mut buf, msg)?,
            Frame::ConnAck | Frame::Disconnect => {}
        }
        Ok(buf.freeze())
    }

    pub fn decode(kind: u8, payload: &[u8]) -> Result<Self, BusError> {
        let mut buf = payload;
        let frame = match kind {
            FRAME_CONNECT => {
                let client_id = get_str(&mut buf)?;
                let will = match get_u8(&mut buf)? {
                    0 => None,
                    _ => Some(get_message(&mut buf)?),
                };
                Frame::Connect { client_id, will }
            }
            FRAME_CONNACK => Frame::ConnAck,
            FRAME_SUBSCRIBE => Frame::Subscribe(get_str(&mut buf)?),
            FRAME_PUBLISH => Frame::Publish(get_message(&mut buf)?),
            FRAME_DISCONNECT => Frame::Disconnect,
            other => return Err(BusError::Malformed(format!("unknown frame type {}", other))),
        };
        if buf.has_remaining() {
            return Err(BusError::Malformed(format!(
                "{} trailing bytes in frame type {}",
                buf.remaining(),
                kind
            )));
        }
        Ok(frame)
    }
}

fn put_str(buf: &mut BytesMut, s: &str) -> Result<(), BusError> {
    let len = u16::try_from(s.len())
        .map_err(|_| BusError::Malformed(format!("string too long ({})", s.len())))?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Topic, QoS, retain flag, then the payload up to the end of the frame.
fn put_message(buf: &mut BytesMut, msg: &BusMessage) -> Result<(), BusError> {
    put_str(buf, &msg.topic)?;
    buf.put_u8(msg.qos.as_u8());
    buf.put_u8(msg.retain as u8);
    buf.put_slice(&msg.payload);
    Ok(())
}

fn truncated() -> BusError {
    BusError::Malformed("truncated frame".to_string())
}

fn get_u8(buf: &mut &[u8]) -> Result<u8, BusError> {
    if buf.remaining() < 1 {
        return Err(truncated());
    }
    Ok(buf.get_u8())
}

fn get_str(buf: &mut &[u8]) -> Result<String, BusError> {
    if buf.remaining() < 2 {
        return Err(truncated());
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(truncated());
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    String::from_utf8(head.to_vec()).map_err(|_| BusError::Malformed("invalid UTF-8".to_string()))
}

fn get_message(buf: &mut &[u8]) -> Result<BusMessage, BusError> {
    let topic = get_str(buf)?;
    let qos = QoS::from_u8(get_u8(buf)?)
        .ok_or_else(|| BusError::Malformed("invalid QoS".to_string()))?;
    let retain = get_u8(buf)? != 0;
    let payload = Bytes::copy_from_slice(*buf);
    *buf = &[];
    Ok(BusMessage {
        topic,
        payload,
        qos,
        retain,
    })
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), BusError> {
    let payload = frame.encode()?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_SIZE)
        .ok_or_else(|| BusError::Malformed(format!("frame too large: {} bytes", payload.len())))?;
    writer.write_u8(frame.kind()).await?;
    writer.write_u32(len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Not cancel safe.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, BusError> {
    let kind = reader.read_u8().await?;
    let len = reader.read_u32().await?;
    if len > MAX_PAYLOAD_SIZE {
        return Err(BusError::Malformed(format!("frame too large: {} bytes", len)));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Frame::decode(kind, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_over_a_pipe() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let frames = vec![
            Frame::Connect {
                client_id: "srv".to_string(),
                will: Some(BusMessage::new("s/status", vec![1u8, 2, 0]).retained()),
            },
            Frame::ConnAck,
            Frame::Subscribe("s/#".to_string()),
            Frame::Publish(BusMessage::tombstone("s/state")),
            Frame::Disconnect,
        ];
        for f in &frames {
            write_frame(&mut a, f).await.unwrap();
        }
        for f in &frames {
            assert_eq!(&read_frame(&mut b).await.unwrap(), f);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Frame::decode(0x7f, &[]),
            Err(BusError::Malformed(_))
        ));
        assert!(matches!(
            Frame::decode(FRAME_SUBSCRIBE, &[0, 9, b'a']),
            Err(BusError::Malformed(_))
        ));
        assert!(matches!(
            Frame::decode(FRAME_CONNACK, &[1]),
            Err(BusError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let _ = a.write_u8(FRAME_PUBLISH).await;
            let _ = a.write_u32(MAX_PAYLOAD_SIZE + 1).await;
        });
        assert!(matches!(
            read_frame(&mut b).await,
            Err(BusError::Malformed(_))
        ));
    }
}
