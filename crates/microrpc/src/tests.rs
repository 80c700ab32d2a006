use bytes::Bytes;
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

use crate::*;

fn body_of(frame: &Bytes) -> Bytes {
    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(len, frame.len() - 4);
    frame.slice(4..)
}

// ============================================================================
//  ENCODE / DECODE
// ============================================================================

#[test]
fn test_request_frame_layout() -> Result<()> {
    let cmd = Command::request(Header::new(1, 1, 42), Bytes::from_static(b"abc"));
    let frame = encode(&cmd)?;

    let mut expected = Vec::new();
    expected.extend_from_slice(&19u32.to_be_bytes());
    expected.extend_from_slice(&1i32.to_be_bytes());
    expected.extend_from_slice(&1i32.to_be_bytes());
    expected.extend_from_slice(&42i32.to_be_bytes());
    expected.extend_from_slice(&3u32.to_be_bytes());
    expected.extend_from_slice(b"abc");
    assert_eq!(&frame[..], &expected[..]);

    assert_eq!(decode_request(body_of(&frame))?, cmd);
    Ok(())
}

#[test]
fn test_response_frame_carries_error_text() -> Result<()> {
    let req = Header::rpc_request(-7);
    let cmd = Command::failure(&req, Code::NoProvider, "No provider!");
    let frame = encode(&cmd)?;
    let back = decode_response(body_of(&frame))?;

    let rh = back.response_header().expect("response header");
    assert_eq!(rh.header, req);
    assert_eq!(rh.code, Code::NoProvider);
    assert_eq!(rh.error, "No provider!");
    assert!(back.payload().is_empty());
    Ok(())
}

#[test]
fn test_unknown_code_is_preserved() -> Result<()> {
    let cmd = Command::response(
        ResponseHeader::answering(&Header::rpc_request(1), Code::Other(77), "?"),
        Bytes::new(),
    );
    let back = decode_response(body_of(&encode(&cmd)?))?;
    assert_eq!(back.response_header().map(|r| r.code), Some(Code::Other(77)));
    assert_eq!(Code::from_i32(77).as_i32(), 77);
    Ok(())
}

#[test]
fn test_decode_short_header() {
    let err = decode_request(Bytes::from_static(&[0, 0, 0, 1, 0, 0])).unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

#[test]
fn test_decode_payload_length_mismatch() {
    let cmd = Command::request(Header::rpc_request(1), Bytes::from_static(b"xyz"));
    let frame = encode(&cmd).unwrap();
    let mut body = body_of(&frame).to_vec();
    body.pop();
    let err = decode_request(Bytes::from(body)).unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

#[test]
fn test_decode_negative_error_length() {
    let mut body = Vec::new();
    for v in [1i32, 1, 1, 2, -5] {
        body.extend_from_slice(&v.to_be_bytes());
    }
    body.extend_from_slice(&0u32.to_be_bytes());
    let err = decode_response(Bytes::from(body)).unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

#[test]
fn test_decode_error_length_overrun() {
    let mut body = Vec::new();
    for v in [1i32, 1, 1, 2, 100] {
        body.extend_from_slice(&v.to_be_bytes());
    }
    body.extend_from_slice(b"short");
    let err = decode_response(Bytes::from(body)).unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

#[test]
fn test_decode_invalid_utf8_error_text() {
    let mut body = Vec::new();
    for v in [1i32, 1, 1, 2, 2] {
        body.extend_from_slice(&v.to_be_bytes());
    }
    body.extend_from_slice(&[0xff, 0xfe]);
    body.extend_from_slice(&0u32.to_be_bytes());
    let err = decode_response(Bytes::from(body)).unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

// ============================================================================
//  STREAMING CODEC
// ============================================================================

#[test]
fn test_codec_buffers_partial_frames() -> anyhow::Result<()> {
    let a = Command::request(Header::rpc_request(1), Bytes::from_static(b"first"));
    let b = Command::request(Header::rpc_request(2), Bytes::from_static(b"second"));

    let mut wire = BytesMut::new();
    let mut codec = CommandCodec::requests();
    codec.encode(a.clone(), &mut wire)?;
    codec.encode(b.clone(), &mut wire)?;

    let mut src = BytesMut::new();
    let mut out = Vec::new();
    for byte in wire.iter() {
        src.extend_from_slice(&[*byte]);
        while let Some(cmd) = codec.decode(&mut src)? {
            out.push(cmd);
        }
    }

    assert_eq!(out, vec![a, b]);
    assert!(src.is_empty());
    Ok(())
}

#[test]
fn test_codec_rejects_oversized_frame_before_buffering() {
    let mut codec = CommandCodec::responses().with_max_frame_size(64);
    let mut src = BytesMut::from(&1000u32.to_be_bytes()[..]);
    let err = codec.decode(&mut src).unwrap_err();
    assert_eq!(err, Error::FrameTooLarge { size: 1000, max: 64 });
}

#[test]
fn test_codec_rejects_oversized_encode() {
    let mut codec = CommandCodec::requests().with_max_frame_size(16);
    let cmd = Command::request(Header::rpc_request(1), vec![0u8; 32]);
    let mut dst = BytesMut::new();
    assert!(matches!(codec.encode(cmd, &mut dst), Err(Error::FrameTooLarge { .. })));
}

#[test]
fn test_response_codec_reads_response_shape() -> anyhow::Result<()> {
    let cmd = Command::response(
        ResponseHeader::success(&Header::rpc_request(9)),
        Bytes::from_static(b"ok"),
    );
    let mut src = BytesMut::from(&encode(&cmd)?[..]);
    let back = CommandCodec::responses().decode(&mut src)?;
    assert_eq!(back, Some(cmd));
    Ok(())
}
