//! # Headers
//!
//! Typed metadata prefixing every command.

use crate::TYPE_RPC_REQUEST;
use crate::VERSION;

/// Request header: which handler, which protocol version, which call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    /// Handler type the server routes on.
    pub kind: i32,
    pub version: i32,
    /// Unique per sending peer while the request is in flight.
    pub request_id: i32,
}

impl Header {
    pub fn new(kind: i32, version: i32, request_id: i32) -> Self {
        Self { kind, version, request_id }
    }

    /// A current-version RPC request header.
    pub fn rpc_request(request_id: i32) -> Self {
        Self::new(TYPE_RPC_REQUEST, VERSION, request_id)
    }

    pub(crate) const WIRE_SIZE: usize = 12;
}

/// Outcome of a request, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Success,
    NoProvider,
    UnknownError,
    UnsupportedVersion,
    /// Any code this side does not name, preserved numerically.
    Other(i32),
}

impl Code {
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::NoProvider,
            2 => Self::UnknownError,
            3 => Self::UnsupportedVersion,
            other => Self::Other(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::NoProvider => 1,
            Self::UnknownError => 2,
            Self::UnsupportedVersion => 3,
            Self::Other(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::NoProvider => write!(f, "NO_PROVIDER"),
            Self::UnknownError => write!(f, "UNKNOWN_ERROR"),
            Self::UnsupportedVersion => write!(f, "UNSUPPORTED_VERSION"),
            Self::Other(code) => write!(f, "CODE({})", code),
        }
    }
}

/// Response header: the answered request's header plus an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub header: Header,
    pub code: Code,
    /// Empty when `code` is `Success`.
    pub error: String,
}

impl ResponseHeader {
    /// Answers `request` with `code`, echoing its type, version and id.
    pub fn answering(request: &Header, code: Code, error: impl Into<String>) -> Self {
        Self {
            header: *request,
            code,
            error: error.into(),
        }
    }

    pub fn success(request: &Header) -> Self {
        Self::answering(request, Code::Success, String::new())
    }

    pub(crate) fn wire_size(&self) -> usize {
        Header::WIRE_SIZE + 4 + 4 + self.error.len()
    }
}
