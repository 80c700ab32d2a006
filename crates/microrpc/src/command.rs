//! # Commands
//!
//! The on-wire unit: a header and an owned payload blob.

use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;

use crate::error::Error;
use crate::error::Result;
use crate::header::Code;
use crate::header::Header;
use crate::header::ResponseHeader;

/// Which header shape a reader expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandHeader {
    Request(Header),
    Response(ResponseHeader),
}

/// An immutable request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    header: CommandHeader,
    payload: Bytes,
}

impl Command {
    pub fn request(header: Header, payload: impl Into<Bytes>) -> Self {
        Self {
            header: CommandHeader::Request(header),
            payload: payload.into(),
        }
    }

    pub fn response(header: ResponseHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header: CommandHeader::Response(header),
            payload: payload.into(),
        }
    }

    /// A payload-less response answering `request` with a failure.
    pub fn failure(request: &Header, code: Code, error: impl Into<String>) -> Self {
        Self::response(ResponseHeader::answering(request, code, error), Bytes::new())
    }

    pub fn command_header(&self) -> &CommandHeader {
        &self.header
    }

    /// The request-shaped part of the header, present in both forms.
    pub fn header(&self) -> &Header {
        match &self.header {
            CommandHeader::Request(h) => h,
            CommandHeader::Response(r) => &r.header,
        }
    }

    pub fn response_header(&self) -> Option<&ResponseHeader> {
        match &self.header {
            CommandHeader::Response(r) => Some(r),
            CommandHeader::Request(_) => None,
        }
    }

    pub fn request_id(&self) -> i32 {
        self.header().request_id
    }

    pub fn kind(&self) -> i32 {
        self.header().kind
    }

    pub fn version(&self) -> i32 {
        self.header().version
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Bytes after the length prefix.
    pub fn body_len(&self) -> usize {
        let header = match &self.header {
            CommandHeader::Request(_) => Header::WIRE_SIZE,
            CommandHeader::Response(r) => r.wire_size(),
        };
        header + 4 + self.payload.len()
    }

    /// Appends the full frame, length prefix included.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let body_len = self.body_len();
        let length = u32::try_from(body_len)
            .map_err(|_| Error::FrameTooLarge { size: body_len, max: u32::MAX as usize })?;
        let error_len = match &self.header {
            CommandHeader::Response(r) => i32::try_from(r.error.len())
                .map_err(|_| Error::MalformedFrame("error text too long".into()))?,
            CommandHeader::Request(_) => 0,
        };

        dst.reserve(4 + body_len);
        dst.put_u32(length);

        let h = self.header();
        dst.put_i32(h.kind);
        dst.put_i32(h.version);
        dst.put_i32(h.request_id);

        if let CommandHeader::Response(r) = &self.header {
            dst.put_i32(r.code.as_i32());
            dst.put_i32(error_len);
            dst.put_slice(r.error.as_bytes());
        }

        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(&self.payload);
        Ok(())
    }
}

/// Encodes `command` as a complete frame.
pub fn encode(command: &Command) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    command.encode_into(&mut dst)?;
    Ok(dst.freeze())
}

/// Decodes a request frame body (length prefix already stripped).
pub fn decode_request(body: Bytes) -> Result<Command> {
    decode(body, Direction::Request)
}

/// Decodes a response frame body (length prefix already stripped).
pub fn decode_response(body: Bytes) -> Result<Command> {
    decode(body, Direction::Response)
}

pub(crate) fn decode(mut body: Bytes, direction: Direction) -> Result<Command> {
    let header = Header {
        kind: take_i32(&mut body, "type")?,
        version: take_i32(&mut body, "version")?,
        request_id: take_i32(&mut body, "request id")?,
    };

    let header = match direction {
        Direction::Request => CommandHeader::Request(header),
        Direction::Response => {
            let code = Code::from_i32(take_i32(&mut body, "code")?);
            let error_len = take_i32(&mut body, "error length")?;
            let error_len = usize::try_from(error_len)
                .map_err(|_| malformed(format!("negative error length {}", error_len)))?;
            if body.remaining() < error_len {
                return Err(malformed(format!(
                    "error length {} overruns {} remaining bytes",
                    error_len,
                    body.remaining()
                )));
            }
            let error = String::from_utf8(body.split_to(error_len).to_vec())
                .map_err(|_| malformed("error text is not UTF-8"))?;
            CommandHeader::Response(ResponseHeader { header, code, error })
        }
    };

    if body.remaining() < 4 {
        return Err(malformed("missing payload length"));
    }
    let payload_len = body.get_u32() as usize;
    if payload_len != body.remaining() {
        return Err(malformed(format!(
            "payload length {} does not match {} remaining bytes",
            payload_len,
            body.remaining()
        )));
    }

    Ok(Command { header, payload: body })
}

fn take_i32(body: &mut Bytes, field: &str) -> Result<i32> {
    if body.remaining() < 4 {
        return Err(malformed(format!("frame too short for {}", field)));
    }
    Ok(body.get_i32())
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedFrame(msg.into())
}
