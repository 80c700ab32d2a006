use crate::*;

// ============================================================================
//  BUILT-INS
// ============================================================================

#[test]
fn test_string_blob_layout() -> Result<()> {
    let bytes = serialize(&"héllo".to_string())?;
    assert_eq!(bytes[0], STRING_TAG);
    assert_eq!(&bytes[1..], "héllo".as_bytes());
    assert_eq!(parse::<String>(&bytes)?, "héllo");
    Ok(())
}

#[test]
fn test_empty_string() -> Result<()> {
    let bytes = serialize(&String::new())?;
    assert_eq!(bytes, vec![STRING_TAG]);
    assert_eq!(parse::<String>(&bytes)?, "");
    Ok(())
}

#[test]
fn test_rpc_request_layout() -> Result<()> {
    let args = serialize(&"bob".to_string())?;
    let req = RpcRequest::new("Hello", "say", args.clone());
    let bytes = serialize(&req)?;

    let mut expected = vec![RPC_REQUEST_TAG];
    expected.extend_from_slice(&5u32.to_be_bytes());
    expected.extend_from_slice(b"Hello");
    expected.extend_from_slice(&3u32.to_be_bytes());
    expected.extend_from_slice(b"say");
    expected.extend_from_slice(&(args.len() as u32).to_be_bytes());
    expected.extend_from_slice(&args);
    assert_eq!(bytes, expected);

    let back: RpcRequest = parse(&bytes)?;
    assert_eq!(back, req);
    assert_eq!(parse::<String>(&back.serialized_arguments)?, "bob");
    Ok(())
}

#[test]
fn test_rpc_request_truncated() {
    let req = RpcRequest::new("Hello", "say", vec![0, b'x']);
    let bytes = serialize(&req).unwrap();
    let err = parse::<RpcRequest>(&bytes[..bytes.len() - 1]).unwrap_err();
    assert_eq!(err, Error::UnexpectedEnd);
}

#[test]
fn test_metadata_layout() -> Result<()> {
    let mut md = Metadata::new();
    assert!(md.add("svc", "rpc://a:1"));
    assert!(!md.add("svc", "rpc://a:1"));
    assert!(md.add("svc", "rpc://b:2"));

    let bytes = serialize(&md)?;
    let mut expected = vec![METADATA_TAG, 0, 1, 0, 3];
    expected.extend_from_slice(b"svc");
    expected.extend_from_slice(&[0, 2, 0, 9]);
    expected.extend_from_slice(b"rpc://a:1");
    expected.extend_from_slice(&[0, 9]);
    expected.extend_from_slice(b"rpc://b:2");
    assert_eq!(bytes, expected);

    let back: Metadata = parse(&bytes)?;
    assert_eq!(back.get("svc"), Some(&["rpc://a:1".to_string(), "rpc://b:2".to_string()][..]));
    Ok(())
}

#[test]
fn test_metadata_field_too_large() {
    let mut md = Metadata::new();
    md.add("svc", &"a".repeat(metadata::MAX_FIELD + 1));
    assert_eq!(serialize(&md).unwrap_err(), Error::FieldTooLarge(metadata::MAX_FIELD + 1));
}

#[test]
fn test_metadata_rejects_non_ascii_uri() {
    let mut md = Metadata::new();
    md.add("svc", "rpc://hé:1");
    assert_eq!(serialize(&md).unwrap_err(), Error::InvalidAscii);
}

// ============================================================================
//  REGISTRY DISPATCH
// ============================================================================

#[test]
fn test_unknown_tag() {
    assert_eq!(parse::<String>(&[42, 1, 2]).unwrap_err(), Error::UnknownType(42));
}

#[test]
fn test_empty_input() {
    assert_eq!(parse::<String>(&[]).unwrap_err(), Error::UnexpectedEnd);
}

#[test]
fn test_type_mismatch() {
    let bytes = serialize(&"x".to_string()).unwrap();
    assert!(matches!(parse::<RpcRequest>(&bytes), Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_unknown_serializer() {
    assert!(matches!(serialize(&7u64), Err(Error::UnknownSerializer(_))));
}

#[derive(Debug, PartialEq)]
struct Point(u16, u16);

struct PointSerializer(u8);

impl Serializer for PointSerializer {
    type Item = Point;

    fn tag(&self) -> u8 {
        self.0
    }

    fn size(&self, _: &Point) -> usize {
        4
    }

    fn serialize(&self, item: &Point, dst: &mut [u8]) -> Result<()> {
        let mut w = cursor::Writer::new(dst);
        w.put_u16(item.0)?;
        w.put_u16(item.1)?;
        w.finish()
    }

    fn parse(&self, src: &[u8]) -> Result<Point> {
        let mut r = cursor::Reader::new(src);
        let p = Point(r.u16()?, r.u16()?);
        r.finish()?;
        Ok(p)
    }
}

#[test]
fn test_custom_serializer() -> Result<()> {
    let registry = Registry::with_builtins();
    registry.register(PointSerializer(7));

    let bytes = registry.serialize(&Point(1, 2))?;
    assert_eq!(bytes, vec![7, 0, 1, 0, 2]);
    assert_eq!(registry.parse::<Point>(&bytes)?, Point(1, 2));
    Ok(())
}

#[test]
fn test_reregistration_replaces_both_indexes() -> Result<()> {
    let registry = Registry::new();
    registry.register(PointSerializer(7));
    registry.register(PointSerializer(8));

    assert!(!registry.contains_tag(7));
    assert_eq!(registry.serialize(&Point(3, 4))?[0], 8);
    assert_eq!(registry.parse::<Point>(&[7, 0, 3, 0, 4]).unwrap_err(), Error::UnknownType(7));
    Ok(())
}

#[test]
fn test_tag_takeover_evicts_old_type() {
    let registry = Registry::with_builtins();
    registry.register(PointSerializer(STRING_TAG));

    assert!(matches!(
        registry.serialize(&"x".to_string()),
        Err(Error::UnknownSerializer(_))
    ));
}
