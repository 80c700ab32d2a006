//! # Microrpc
//!
//! The wire protocol: headers, commands, and length-prefixed frames.
//!
//! ## Frame Format
//!
//! ```text
//! +----------------+-----------------+--------------------+-------------------+
//! | Length (4B BE) | Header          | PayloadLen (4B BE) | Payload (N bytes) |
//! +----------------+-----------------+--------------------+-------------------+
//! ```
//!
//! `Length` counts everything after itself. The header has two shapes:
//!
//! - **Request**: `[i32 type][i32 version][i32 requestId]`
//! - **Response**: request fields, then `[i32 code][i32 errorLen][errorLen bytes UTF-8]`
//!
//! The wire carries no request/response discriminator. Each side of a connection knows
//! which shape it reads: servers decode requests, clients decode responses.
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on hostile input.
//! - **Bounded**: A frame length above the codec's maximum is rejected before any allocation.

pub mod codec;
pub mod command;
pub mod error;
pub mod header;

#[cfg(test)]
mod tests;

pub use codec::CommandCodec;
pub use codec::DEFAULT_MAX_FRAME_SIZE;
pub use command::Command;
pub use command::CommandHeader;
pub use command::Direction;
pub use command::decode_request;
pub use command::decode_response;
pub use command::encode;
pub use error::Error;
pub use error::Result;
pub use header::Code;
pub use header::Header;
pub use header::ResponseHeader;

/// Protocol version carried by every header this crate produces.
pub const VERSION: i32 = 1;

/// Command type routed to the RPC request handler.
pub const TYPE_RPC_REQUEST: i32 = 1;
