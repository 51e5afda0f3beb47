//! Error taxonomy.
//!
//! Interledger-level failures are a value type ([`ProtocolError`]) that is
//! carried through the quoting and forwarding paths as a plain `Err` and
//! only converted into a wire Reject packet at the message boundary.
//! Host-level faults ([`ConnectorError`]) are never masked as protocol
//! errors; they propagate to the caller.

use crate::address::Address;
use std::fmt;
use thiserror::Error;

/// A three-character ILP error code (`F..` final, `T..` temporary,
/// `R..` relative).
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct ErrorCode([u8; 3]);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Final,
    Temporary,
    Relative,
    Unknown,
}

impl ErrorCode {
    pub const fn new(bytes: [u8; 3]) -> Self {
        ErrorCode(bytes)
    }

    pub fn class(self) -> ErrorClass {
        match self.0[0] {
            b'F' => ErrorClass::Final,
            b'T' => ErrorClass::Temporary,
            b'R' => ErrorClass::Relative,
            _ => ErrorClass::Unknown,
        }
    }

    pub fn as_bytes(self) -> [u8; 3] {
        self.0
    }

    pub const F00_BAD_REQUEST: Self = ErrorCode(*b"F00");
    pub const F01_INVALID_PACKET: Self = ErrorCode(*b"F01");
    pub const F02_UNREACHABLE: Self = ErrorCode(*b"F02");
    pub const F05_WRONG_CONDITION: Self = ErrorCode(*b"F05");
    pub const T00_INTERNAL_ERROR: Self = ErrorCode(*b"T00");
    pub const T01_PEER_UNREACHABLE: Self = ErrorCode(*b"T01");
    pub const T04_INSUFFICIENT_LIQUIDITY: Self = ErrorCode(*b"T04");
    pub const R00_TRANSFER_TIMED_OUT: Self = ErrorCode(*b"R00");
    pub const R02_INSUFFICIENT_TIMEOUT: Self = ErrorCode(*b"R02");
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(std::str::from_utf8(&self.0).unwrap_or("???"))
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorCode({})", self)
    }
}

/// An Interledger-level failure: carried as a value until the boundary,
/// where it becomes a Reject packet. `forwarded_by` records the hop chain
/// the error has traversed and is mutated only by appending.
#[derive(Error, Clone, Debug, PartialEq)]
#[error("{code} {message}")]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
    pub forwarded_by: Vec<Address>,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ProtocolError {
            code,
            message: message.into(),
            forwarded_by: Vec::new(),
        }
    }

    pub fn invalid_body(message: impl Into<String>) -> Self {
        ProtocolError::new(ErrorCode::F01_INVALID_PACKET, message)
    }

    pub fn no_route(destination: &Address) -> Self {
        ProtocolError::new(
            ErrorCode::F02_UNREACHABLE,
            format!("no route found. destination={}", destination),
        )
    }

    pub fn expired(message: impl Into<String>) -> Self {
        ProtocolError::new(ErrorCode::R00_TRANSFER_TIMED_OUT, message)
    }

    pub fn insufficient_timeout(message: impl Into<String>) -> Self {
        ProtocolError::new(ErrorCode::R02_INSUFFICIENT_TIMEOUT, message)
    }

    pub fn insufficient_liquidity(message: impl Into<String>) -> Self {
        ProtocolError::new(ErrorCode::T04_INSUFFICIENT_LIQUIDITY, message)
    }

    pub fn peer_unreachable(message: impl Into<String>) -> Self {
        ProtocolError::new(ErrorCode::T01_PEER_UNREACHABLE, message)
    }
}

/// Host-level failures. These are bugs, malformed envelopes, or transport
/// faults; they are logged and rethrown, never converted to ILP error
/// packets.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("invalid request message")]
    MalformedEnvelope,
    #[error("invalid {schema}: {reason}")]
    Validation { schema: String, reason: String },
    #[error("undecodable packet: {0}")]
    InvalidPacket(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
