use crate::Error;
use crate::Result;
use crate::STRING_TAG;
use crate::Serializer;

/// Raw UTF-8; the body length is the blob length minus the tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl Serializer for StringSerializer {
    type Item = String;

    fn tag(&self) -> u8 {
        STRING_TAG
    }

    fn size(&self, item: &String) -> usize {
        item.len()
    }

    fn serialize(&self, item: &String, dst: &mut [u8]) -> Result<()> {
        if dst.len() != item.len() {
            return Err(Error::SizeMismatch { expected: dst.len(), actual: item.len() });
        }
        dst.copy_from_slice(item.as_bytes());
        Ok(())
    }

    fn parse(&self, src: &[u8]) -> Result<String> {
        String::from_utf8(src.to_vec()).map_err(|_| Error::InvalidUtf8)
    }
}
