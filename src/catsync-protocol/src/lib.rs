// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire format and topic scheme shared by catsync servers and clients.

pub mod codec;
pub mod proto;
pub mod topics;
pub mod types;

pub use codec::{decode, decode_retained, encode, CodecError, WireMessage, WIRE_VERSION};
pub use topics::{TopicKind, Topics};
pub use types::{Ping, Status};
