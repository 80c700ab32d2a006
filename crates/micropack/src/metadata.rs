//! # Name-Service Metadata
//!
//! The persisted directory of a name service: service name to endpoint URIs.
//!
//! ```text
//! [u16 entries]
//!   per entry: [u16 keyLen][key][u16 uriCount]
//!     per uri: [u16 uriLen][ascii uri]
//! ```
//!
//! Every size field is capped at `MAX_FIELD` (32767).

use std::collections::BTreeMap;

use crate::Error;
use crate::METADATA_TAG;
use crate::Result;
use crate::Serializer;
use crate::cursor::Reader;
use crate::cursor::Writer;

/// Largest value any metadata size field may carry.
pub const MAX_FIELD: usize = i16::MAX as usize;

/// Service name to endpoint URIs, in registration order per name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `uri` under `name`. Returns false if it was already present.
    pub fn add(&mut self, name: &str, uri: &str) -> bool {
        let uris = self.entries.entry(name.to_owned()).or_default();
        if uris.iter().any(|u| u == uri) {
            return false;
        }
        uris.push(uri.to_owned());
        true
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataSerializer;

fn field(n: usize) -> Result<u16> {
    if n > MAX_FIELD {
        return Err(Error::FieldTooLarge(n));
    }
    Ok(n as u16)
}

fn read_field(r: &mut Reader<'_>) -> Result<usize> {
    let n = r.u16()? as usize;
    if n > MAX_FIELD {
        return Err(Error::FieldTooLarge(n));
    }
    Ok(n)
}

impl Serializer for MetadataSerializer {
    type Item = Metadata;

    fn tag(&self) -> u8 {
        METADATA_TAG
    }

    fn size(&self, item: &Metadata) -> usize {
        let mut size = 2;
        for (name, uris) in &item.entries {
            size += 2 + name.len() + 2;
            size += uris.iter().map(|u| 2 + u.len()).sum::<usize>();
        }
        size
    }

    fn serialize(&self, item: &Metadata, dst: &mut [u8]) -> Result<()> {
        let mut w = Writer::new(dst);
        w.put_u16(field(item.entries.len())?)?;
        for (name, uris) in &item.entries {
            w.put_u16(field(name.len())?)?;
            w.put_slice(name.as_bytes())?;
            w.put_u16(field(uris.len())?)?;
            for uri in uris {
                if !uri.is_ascii() {
                    return Err(Error::InvalidAscii);
                }
                w.put_u16(field(uri.len())?)?;
                w.put_slice(uri.as_bytes())?;
            }
        }
        w.finish()
    }

    fn parse(&self, src: &[u8]) -> Result<Metadata> {
        let mut r = Reader::new(src);
        let mut metadata = Metadata::new();

        let entries = read_field(&mut r)?;
        for _ in 0..entries {
            let len = read_field(&mut r)?;
            let name = r.str(len)?.to_owned();
            let count = read_field(&mut r)?;
            let mut uris = Vec::with_capacity(count);
            for _ in 0..count {
                let len = read_field(&mut r)?;
                uris.push(r.ascii(len)?.to_owned());
            }
            metadata.entries.insert(name, uris);
        }
        r.finish()?;

        Ok(metadata)
    }
}
