//! # Micropack
//!
//! A type-tagged, pluggable serialization registry for RPC payloads.
//!
//! ## Philosophy
//!
//! - **Tagged**: Every blob is `[Tag: 1b][Body]`. The tag names the serializer that wrote it,
//!   so a reader can dispatch without out-of-band schema.
//! - **Pluggable**: Serializers are registered by value into a [`Registry`]. A later
//!   registration for the same tag or type replaces the earlier one.
//! - **Exact**: `size` is computed up front and `serialize` writes into an exactly sized slice.
//!   Writing more or fewer bytes than promised is an error, never a silent truncation.
//!
//! ## Built-ins
//!
//! | Tag | Type | Body |
//! |-----|------|------|
//! | 0 | `String` | raw UTF-8 |
//! | 100 | [`Metadata`] | `u16` counted entries of `u16` counted ASCII URIs |
//! | 101 | [`RpcRequest`] | three `u32` length-prefixed fields |
//!
//! All integers are Big-Endian.

pub mod cursor;
pub mod metadata;
pub mod registry;
pub mod request;
pub mod string;

#[cfg(test)]
mod tests;

pub use metadata::Metadata;
pub use metadata::MetadataSerializer;
pub use registry::Registry;
pub use registry::Serializer;
pub use request::RpcRequest;
pub use request::RpcRequestSerializer;
pub use string::StringSerializer;

/// Tag of the built-in UTF-8 string serializer.
pub const STRING_TAG: u8 = 0;
/// Tag of the built-in name-service metadata serializer.
pub const METADATA_TAG: u8 = 100;
/// Tag of the built-in RPC request serializer.
pub const RPC_REQUEST_TAG: u8 = 101;

/// Serialization and parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No serializer is registered for the Rust type being written.
    UnknownSerializer(&'static str),
    /// The leading tag byte does not name a registered serializer.
    UnknownType(u8),
    /// The tag names a serializer for a different type than the caller asked for.
    TypeMismatch { expected: &'static str, found: &'static str },
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// Bytes remained after a complete value was read.
    TrailingBytes(usize),
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// A field that must be ASCII contained other bytes.
    InvalidAscii,
    /// A length or count does not fit the wire field that carries it.
    FieldTooLarge(usize),
    /// A serializer wrote a different number of bytes than its `size` promised.
    SizeMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownSerializer(name) => write!(f, "No serializer registered for type {}", name),
            Error::UnknownType(tag) => write!(f, "No serializer registered for tag {}", tag),
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            Error::TrailingBytes(n) => write!(f, "{} trailing bytes after value", n),
            Error::FieldTooLarge(n) => write!(f, "Field of size {} exceeds its wire limit", n),
            Error::SizeMismatch { expected, actual } => {
                write!(f, "Serializer wrote {} bytes, promised {}", actual, expected)
            }
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Micropack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Serializes `item` with the process-wide registry.
pub fn serialize<T: std::any::Any>(item: &T) -> Result<Vec<u8>> {
    registry::global().serialize(item)
}

/// Parses a tagged blob with the process-wide registry.
pub fn parse<T: std::any::Any + Send>(bytes: &[u8]) -> Result<T> {
    registry::global().parse(bytes)
}

/// Registers a serializer with the process-wide registry.
pub fn register<S: Serializer>(serializer: S) {
    registry::global().register(serializer)
}
