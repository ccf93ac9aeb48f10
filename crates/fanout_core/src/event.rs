/* Copyright 2023- The Binedge, Lda team. All rights reserved.
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *     http://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Parsing and validation of the line-oriented event wire format.
//!
//! A frame is one ASCII line:
//!
//! ```text
//! SEQ "|" ( "F|" UID "|" UID | "U|" UID "|" UID | "P|" UID "|" UID
//!         | "S|" UID | "B" ) "\n"
//! ```
//!
//! where `SEQ` and `UID` are nonempty decimal unsigned integers. Anything
//! else is rejected. The parsed [`Event`] keeps the original bytes; the raw
//! frame is what gets forwarded to clients, never a re-serialization.

use std::num::ParseIntError;
use std::str;

use bytes::Bytes;
use thiserror::Error;

/// A decimal unsigned 64-bit user identifier.
pub type Uid = u64;

/// Errors produced while decoding a single wire frame.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame does not match the event grammar.
    #[error("event frame is formatted incorrectly")]
    Format,
    /// A numeric field is digits-only but does not fit an unsigned 64-bit
    /// integer.
    #[error("numeric field out of range: {0}")]
    Number(#[from] ParseIntError),
}

/// Parses a decimal UID field, as it appears in event frames and in the
/// client handshake line.
pub fn parse_uid(field: &str) -> Result<Uid, ProtocolError> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::Format);
    }

    Ok(field.parse()?)
}

/// The five event kinds and the users they reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `from` starts following `to`.
    Follow {
        /// The new follower.
        from: Uid,
        /// The user being followed.
        to: Uid,
    },
    /// `from` stops following `to`.
    Unfollow {
        /// The follower leaving.
        from: Uid,
        /// The user being unfollowed.
        to: Uid,
    },
    /// A direct message from `from` to `to`.
    PrivateMessage {
        /// The sender.
        from: Uid,
        /// The recipient.
        to: Uid,
    },
    /// A status update by `from`, delivered to `from`'s followers.
    StatusUpdate {
        /// The user posting the update.
        from: Uid,
    },
    /// A message for every known user.
    Broadcast,
}

/// A parsed, sequenced event.
///
/// Immutable once parsed. Sequence numbers start at 1 and are unique within
/// one source session; ordering and de-duplication happen downstream in the
/// sequencer, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    sequence: u64,
    kind: EventKind,
    raw: Bytes,
}

impl Event {
    /// Parses one newline-terminated frame.
    pub fn parse(raw: Bytes) -> Result<Self, ProtocolError> {
        let text = str::from_utf8(&raw).map_err(|_| ProtocolError::Format)?;
        let line = text.strip_suffix('\n').ok_or(ProtocolError::Format)?;
        if line.contains('\n') {
            return Err(ProtocolError::Format);
        }

        let mut fields = line.split('|');
        let sequence = parse_uid(fields.next().ok_or(ProtocolError::Format)?)?;
        let tag = fields.next().ok_or(ProtocolError::Format)?;

        let kind = match tag {
            "B" => EventKind::Broadcast,
            "S" => EventKind::StatusUpdate {
                from: parse_uid(fields.next().ok_or(ProtocolError::Format)?)?,
            },
            "F" | "U" | "P" => {
                let from = parse_uid(fields.next().ok_or(ProtocolError::Format)?)?;
                let to = parse_uid(fields.next().ok_or(ProtocolError::Format)?)?;

                match tag {
                    "F" => EventKind::Follow { from, to },
                    "U" => EventKind::Unfollow { from, to },
                    "P" => EventKind::PrivateMessage { from, to },
                    _ => unreachable!("tag was just matched"),
                }
            }
            _ => return Err(ProtocolError::Format),
        };

        // Extra fields mean extra pipes; the grammar is exact.
        if fields.next().is_some() {
            return Err(ProtocolError::Format);
        }

        Ok(Event {
            sequence,
            kind,
            raw,
        })
    }

    /// The event's sequence number, 1-based within a source session.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Which kind of event this is, with the users it references.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The original frame bytes, trailing newline included.
    pub fn raw(&self) -> Bytes {
        self.raw.clone()
    }
}
