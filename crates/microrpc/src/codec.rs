//! # Frame Codec
//!
//! Adapts the command encoding to `tokio_util::codec` so a TCP stream can be wrapped in
//! `FramedRead`/`FramedWrite`. Partial frames stay buffered until complete.

use bytes::Buf;
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

use crate::command;
use crate::command::Command;
use crate::command::Direction;
use crate::error::Error;
use crate::error::Result;

/// Default upper bound on a frame's declared length (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One-directional command codec. Encodes any command; decodes one header shape.
#[derive(Debug, Clone)]
pub struct CommandCodec {
    direction: Direction,
    max_frame_size: usize,
}

impl CommandCodec {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Codec for the server side: decodes requests.
    pub fn requests() -> Self {
        Self::new(Direction::Request)
    }

    /// Codec for the client side: decodes responses.
    pub fn responses() -> Self {
        Self::new(Direction::Response)
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Decoder for CommandCodec {
    type Item = Command;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_size {
            return Err(Error::FrameTooLarge { size: length, max: self.max_frame_size });
        }

        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let body = src.split_to(length).freeze();
        command::decode(body, self.direction).map(Some)
    }
}

impl Encoder<Command> for CommandCodec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<()> {
        let size = item.body_len();
        if size > self.max_frame_size {
            return Err(Error::FrameTooLarge { size, max: self.max_frame_size });
        }
        item.encode_into(dst)
    }
}
