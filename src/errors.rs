//! All possible errors.

use std::io;
use std::string;

/// A value that was outside the range the protocol or an internal
/// invariant allows.
#[derive(Debug)]
pub struct InvalidValue {
    pub expected: String,
}

impl std::error::Error for InvalidValue {}

impl std::fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid value received. Expected: {}", self.expected)
    }
}

#[derive(Debug)]
pub enum Error {
    /// OS-level transport failure.
    Io(io::Error),
    /// The remote end closed the connection in an orderly fashion.
    PeerClosed,
    /// A frame or an embedded length prefix overran the received bytes.
    MalformedPacket,
    /// A string exceeded 255 bytes, or a payload exceeded 65 535 bytes.
    PayloadTooLarge(usize),
    /// A frame carried a tag outside the known message set.
    UnknownTag(u8),
    FromUtf8Error(string::FromUtf8Error),
    Serde(serde_json::Error),
    InvalidValue(InvalidValue),
}

impl From<io::Error> for Error {
    fn from(item: io::Error) -> Self {
        Self::Io(item)
    }
}

impl From<string::FromUtf8Error> for Error {
    fn from(item: string::FromUtf8Error) -> Self {
        Self::FromUtf8Error(item)
    }
}

impl From<serde_json::Error> for Error {
    fn from(item: serde_json::Error) -> Self {
        Self::Serde(item)
    }
}

impl From<InvalidValue> for Error {
    fn from(item: InvalidValue) -> Self {
        Self::InvalidValue(item)
    }
}

pub type ChessdResult<T> = Result<T, Error>;
