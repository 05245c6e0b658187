// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Framing of bus payloads.
//!
//! Every payload is a schema version byte and a message tag followed by a
//! protobuf body (see [`crate::proto`]). A zero-length payload is a
//! tombstone and never decodes to a message.

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use catsync_core::{Capabilities, State, UpdateRequest};

use crate::proto::{CapsMsg, PingMsg, StateMsg, StatusMsg, UpdateMsg};
use crate::types::{Ping, Status};

/// Schema version written into every payload.
pub const WIRE_VERSION: u8 = 1;

const HEADER_LEN: usize = 2;

pub mod tag {
    pub const CAPS: u8 = 1;
    pub const STATE: u8 = 2;
    pub const UPDATE: u8 = 3;
    pub const STATUS: u8 = 4;
    pub const PING: u8 = 5;
}

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("payload shorter than the 2-byte header")]
    Truncated,
    #[error("expected message tag {expected}, found {found}")]
    BadTag { expected: u8, found: u8 },
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),
    #[error("malformed message body: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("failed to encode message body: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("empty payload")]
    Empty,
}

/// A domain type carried on the bus as a tagged protobuf body.
pub trait WireMessage: Sized {
    const TAG: u8;

    type Body: Message + Default;

    fn to_body(&self) -> Self::Body;

    fn from_body(body: Self::Body) -> Self;
}

/// Encode `msg` with its version and tag header.
pub fn encode<M: WireMessage>(msg: &M) -> Result<Bytes, CodecError> {
    let body = msg.to_body();
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.encoded_len());
    buf.put_u8(WIRE_VERSION);
    buf.put_u8(M::TAG);
    body.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Decode a complete payload. Empty payloads are rejected with
/// [`CodecError::Empty`]; use [`decode_retained`] where tombstones are legal.
pub fn decode<M: WireMessage>(payload: &[u8]) -> Result<M, CodecError> {
    let (version, found, body) = match payload {
        [] => return Err(CodecError::Empty),
        [version, found, body @ ..] => (*version, *found, body),
        [_] => return Err(CodecError::Truncated),
    };
    if version != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    if found != M::TAG {
        return Err(CodecError::BadTag {
            expected: M::TAG,
            found,
        });
    }
    Ok(M::from_body(M::Body::decode(body)?))
}

/// Decode a retained payload; `None` means the publisher withdrew it.
pub fn decode_retained<M: WireMessage>(payload: &[u8]) -> Result<Option<M>, CodecError> {
    if payload.is_empty() {
        return Ok(None);
    }
    decode(payload).map(Some)
}

macro_rules! wire_message {
    ($ty:ty, $body:ty, $tag:expr) => {
        impl WireMessage for $ty {
            const TAG: u8 = $tag;

            type Body = $body;

            fn to_body(&self) -> $body {
                <$body>::from(self)
            }

            fn from_body(body: $body) -> Self {
                Self::from(body)
            }
        }
    };
}

wire_message!(Capabilities, CapsMsg, tag::CAPS);
wire_message!(State, StateMsg, tag::STATE);
wire_message!(UpdateRequest, UpdateMsg, tag::UPDATE);
wire_message!(Status, StatusMsg, tag::STATUS);
wire_message!(Ping, PingMsg, tag::PING);
