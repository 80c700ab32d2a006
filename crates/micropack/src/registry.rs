//! # Serializer Registry
//!
//! Maps both a one-byte tag and a Rust `TypeId` to the serializer that owns them.
//!
//! ## Invariants
//! - **Two Indexes, One Entry**: `by_tag[s.tag()]` and `by_type[TypeId::of::<S::Item>()]`
//!   point at the same serializer after `register(s)`.
//! - **Last Write Wins**: Re-registering a tag or type evicts the previous serializer from
//!   both indexes, so no stale half-entry survives.

use std::any::Any;
use std::any::TypeId;
use std::sync::Arc;
use std::sync::OnceLock;

use dashmap::DashMap;

use crate::Error;
use crate::Result;

/// A codec for one application type, identified on the wire by `tag`.
pub trait Serializer: Send + Sync + 'static {
    type Item: Any + Send;

    /// The tag byte prepended to every blob this serializer writes.
    fn tag(&self) -> u8;

    /// The exact body size `serialize` will write for `item`.
    fn size(&self, item: &Self::Item) -> usize;

    /// Writes the body of `item` into `dst`, which is exactly `size(item)` bytes long.
    fn serialize(&self, item: &Self::Item, dst: &mut [u8]) -> Result<()>;

    /// Reads a body (without the tag) back into an item.
    fn parse(&self, src: &[u8]) -> Result<Self::Item>;
}

/// Object-safe view of a `Serializer`, stored in the registry.
trait ErasedSerializer: Send + Sync {
    fn tag(&self) -> u8;
    fn item_type(&self) -> TypeId;
    fn item_name(&self) -> &'static str;
    fn size(&self, item: &dyn Any) -> Result<usize>;
    fn serialize(&self, item: &dyn Any, dst: &mut [u8]) -> Result<()>;
    fn parse(&self, src: &[u8]) -> Result<Box<dyn Any + Send>>;
}

struct Erased<S>(S);

impl<S: Serializer> Erased<S> {
    fn downcast<'a>(&self, item: &'a dyn Any) -> Result<&'a S::Item> {
        item.downcast_ref::<S::Item>().ok_or(Error::TypeMismatch {
            expected: std::any::type_name::<S::Item>(),
            found: "<erased>",
        })
    }
}

impl<S: Serializer> ErasedSerializer for Erased<S> {
    fn tag(&self) -> u8 {
        self.0.tag()
    }

    fn item_type(&self) -> TypeId {
        TypeId::of::<S::Item>()
    }

    fn item_name(&self) -> &'static str {
        std::any::type_name::<S::Item>()
    }

    fn size(&self, item: &dyn Any) -> Result<usize> {
        Ok(self.0.size(self.downcast(item)?))
    }

    fn serialize(&self, item: &dyn Any, dst: &mut [u8]) -> Result<()> {
        self.0.serialize(self.downcast(item)?, dst)
    }

    fn parse(&self, src: &[u8]) -> Result<Box<dyn Any + Send>> {
        Ok(Box::new(self.0.parse(src)?))
    }
}

/// A concurrent registry of serializers, indexed by tag and by type.
pub struct Registry {
    by_tag: DashMap<u8, Arc<dyn ErasedSerializer>>,
    by_type: DashMap<TypeId, Arc<dyn ErasedSerializer>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            by_tag: DashMap::new(),
            by_type: DashMap::new(),
        }
    }

    /// Creates a registry holding the string, metadata and RPC request serializers.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(crate::StringSerializer);
        registry.register(crate::MetadataSerializer);
        registry.register(crate::RpcRequestSerializer);
        registry
    }

    pub fn register<S: Serializer>(&self, serializer: S) {
        let entry: Arc<dyn ErasedSerializer> = Arc::new(Erased(serializer));
        let tag = entry.tag();
        let item_type = entry.item_type();

        if let Some(old) = self.by_tag.insert(tag, entry.clone()) {
            if old.item_type() != item_type {
                self.by_type.remove_if(&old.item_type(), |_, s| s.tag() == tag);
            }
        }
        if let Some(old) = self.by_type.insert(item_type, entry.clone()) {
            if old.tag() != tag {
                self.by_tag.remove_if(&old.tag(), |_, s| s.item_type() == item_type);
            }
        }

        tracing::debug!(tag, item = entry.item_name(), "registered serializer");
    }

    /// Returns true if a serializer is registered for `tag`.
    pub fn contains_tag(&self, tag: u8) -> bool {
        self.by_tag.contains_key(&tag)
    }

    /// Writes `[tag | body]` for `item`.
    pub fn serialize<T: Any>(&self, item: &T) -> Result<Vec<u8>> {
        let serializer = self
            .by_type
            .get(&TypeId::of::<T>())
            .map(|s| s.value().clone())
            .ok_or(Error::UnknownSerializer(std::any::type_name::<T>()))?;

        let size = serializer.size(item)?;
        let mut out = vec![0u8; 1 + size];
        out[0] = serializer.tag();
        serializer.serialize(item, &mut out[1..])?;
        Ok(out)
    }

    /// Reads a tagged blob as a `T`.
    pub fn parse<T: Any + Send>(&self, bytes: &[u8]) -> Result<T> {
        let (&tag, body) = bytes.split_first().ok_or(Error::UnexpectedEnd)?;

        let serializer = self
            .by_tag
            .get(&tag)
            .map(|s| s.value().clone())
            .ok_or(Error::UnknownType(tag))?;

        if serializer.item_type() != TypeId::of::<T>() {
            return Err(Error::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: serializer.item_name(),
            });
        }

        let item = serializer.parse(body)?;
        item.downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: serializer.item_name(),
            })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, pre-populated with the built-in serializers.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::with_builtins)
}
