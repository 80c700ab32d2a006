//! # RPC Request Body
//!
//! ```text
//! [u32 iLen][interface][u32 mLen][method][u32 aLen][arguments]
//! ```
//!
//! `arguments` is itself a tagged blob, opaque at this layer.

use crate::Error;
use crate::RPC_REQUEST_TAG;
use crate::Result;
use crate::Serializer;
use crate::cursor::Reader;
use crate::cursor::Writer;

/// A single remote method invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RpcRequest {
    pub interface_name: String,
    pub method_name: String,
    pub serialized_arguments: Vec<u8>,
}

impl RpcRequest {
    pub fn new(
        interface_name: impl Into<String>,
        method_name: impl Into<String>,
        serialized_arguments: Vec<u8>,
    ) -> Self {
        Self {
            interface_name: interface_name.into(),
            method_name: method_name.into(),
            serialized_arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RpcRequestSerializer;

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::FieldTooLarge(len))
}

impl Serializer for RpcRequestSerializer {
    type Item = RpcRequest;

    fn tag(&self) -> u8 {
        RPC_REQUEST_TAG
    }

    fn size(&self, item: &RpcRequest) -> usize {
        4 + item.interface_name.len()
            + 4 + item.method_name.len()
            + 4 + item.serialized_arguments.len()
    }

    fn serialize(&self, item: &RpcRequest, dst: &mut [u8]) -> Result<()> {
        let mut w = Writer::new(dst);
        w.put_u32(len_u32(item.interface_name.len())?)?;
        w.put_slice(item.interface_name.as_bytes())?;
        w.put_u32(len_u32(item.method_name.len())?)?;
        w.put_slice(item.method_name.as_bytes())?;
        w.put_u32(len_u32(item.serialized_arguments.len())?)?;
        w.put_slice(&item.serialized_arguments)?;
        w.finish()
    }

    fn parse(&self, src: &[u8]) -> Result<RpcRequest> {
        let mut r = Reader::new(src);
        let len = r.u32()? as usize;
        let interface_name = r.str(len)?.to_owned();
        let len = r.u32()? as usize;
        let method_name = r.str(len)?.to_owned();
        let len = r.u32()? as usize;
        let serialized_arguments = r.bytes(len)?.to_vec();
        r.finish()?;

        Ok(RpcRequest {
            interface_name,
            method_name,
            serialized_arguments,
        })
    }
}
