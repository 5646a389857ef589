//! Stream identity: ids and kinds.
//!
//! A stream id carries its kind as a prefix, so a stream's kind can be
//! checked against its inception event without any other context.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::Address;

const USER_PREFIX: &str = "user-";
const SPACE_PREFIX: &str = "space-";
const CHANNEL_PREFIX: &str = "channel-";

/// Number of random bytes in a generated space or channel id.
const UNIQUE_ID_LEN: usize = 16;

/// The kind of a stream, fixed at inception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StreamKind {
    /// A user's inbox: records which streams the user joined or was invited to.
    User = 1,
    /// A space: holds members and the channel directory.
    Space = 2,
    /// A channel inside a space: holds members and messages.
    Channel = 3,
}

impl StreamKind {
    /// Convert to u8 for encoding.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::User),
            2 => Some(Self::Space),
            3 => Some(Self::Channel),
            _ => None,
        }
    }

    /// Whether users can join, be invited to and leave this kind of stream.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Space | Self::Channel)
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::User => USER_PREFIX,
            Self::Space => SPACE_PREFIX,
            Self::Channel => CHANNEL_PREFIX,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Space => "space",
            Self::Channel => "channel",
        };
        f.write_str(name)
    }
}

/// A stream identifier such as `user-0x…`, `space-…` or `channel-…`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// The user stream for an address.
    pub fn for_user(address: &Address) -> Self {
        Self(format!("{USER_PREFIX}{}", address.to_hex()))
    }

    /// A fresh random id of the given kind.
    ///
    /// User streams are not random; they are derived with [`StreamId::for_user`].
    pub fn unique(kind: StreamKind) -> Self {
        let bytes: [u8; UNIQUE_ID_LEN] = rand::thread_rng().gen();
        Self(format!("{}{}", kind.prefix(), hex::encode(bytes)))
    }

    /// A fresh space id.
    pub fn unique_space() -> Self {
        Self::unique(StreamKind::Space)
    }

    /// A fresh channel id.
    pub fn unique_channel() -> Self {
        Self::unique(StreamKind::Channel)
    }

    /// The kind this id declares through its prefix.
    pub fn kind(&self) -> Option<StreamKind> {
        [StreamKind::User, StreamKind::Space, StreamKind::Channel]
            .into_iter()
            .find(|kind| {
                self.0
                    .strip_prefix(kind.prefix())
                    .is_some_and(|rest| !rest.is_empty())
            })
    }

    pub fn is_user(&self) -> bool {
        self.kind() == Some(StreamKind::User)
    }

    pub fn is_space(&self) -> bool {
        self.kind() == Some(StreamKind::Space)
    }

    pub fn is_channel(&self) -> bool {
        self.kind() == Some(StreamKind::Channel)
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for StreamId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.to_owned());
        match id.kind() {
            Some(_) => Ok(id),
            None => Err(CoreError::InvalidStreamId(s.to_owned())),
        }
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
