//! Extension type registry
//!
//! A [`Converter`] turns typed values into plain tree nodes written under its tag,
//! and turns tagged nodes back into typed values. Converters that store binary
//! data append blocks through the [`WriteContext`] and resolve them through the
//! [`ReadContext`].
//!
//! Writers are chosen by asking each registered converter, in registration order,
//! whether it [`handles`](Converter::handles) a value; the first match wins, so
//! specific converters belong before general ones. Readers are chosen by exact tag.

mod array;

use crate::block::{BlockAccessor, BlockData, BlockSink, BlockStore, Compression};
use crate::error::{Error, Result};
use crate::parser::ReadOptions;
use crate::types::Value;
use crate::writer::WriteOptions;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use array::{NDARRAY_TAG, NdarrayConverter};

/// Conversion between a typed value and a tagged tree node
pub trait Converter: Send + Sync {
    /// Tag written on nodes this converter produces, without the leading `!`
    fn tag(&self) -> &str;

    /// Whether this converter writes `value`
    fn handles(&self, value: &Value) -> bool;

    /// Produce the node content for `value`; the caller adds the tag
    fn to_tree(&self, value: &Value, ctx: &mut WriteContext<'_>) -> Result<Value>;

    /// Rebuild a value from a node whose children are already converted
    fn from_tree(&self, tag: &str, node: Value, ctx: &ReadContext<'_>) -> Result<Value>;
}

/// Converters known to one read or write session
#[derive(Clone)]
pub struct Registry {
    converters: Vec<Arc<dyn Converter>>,
    by_tag: HashMap<String, usize>,
}

impl Registry {
    /// Registry without any converters
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
            by_tag: HashMap::new(),
        }
    }

    /// Registry holding the built-in converters
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.insert(Arc::new(NdarrayConverter));
        registry
    }

    /// Add a converter after those already registered
    pub fn register(&mut self, converter: impl Converter + 'static) -> Result<&mut Self> {
        self.register_shared(Arc::new(converter))
    }

    pub fn register_shared(&mut self, converter: Arc<dyn Converter>) -> Result<&mut Self> {
        if self.by_tag.contains_key(converter.tag()) {
            return Err(Error::DuplicateTag(converter.tag().to_string()));
        }
        self.insert(converter);
        Ok(self)
    }

    fn insert(&mut self, converter: Arc<dyn Converter>) {
        self.by_tag
            .insert(converter.tag().to_string(), self.converters.len());
        self.converters.push(converter);
    }

    /// First converter whose predicate accepts `value`
    pub fn resolve_writer(&self, value: &Value) -> Option<&dyn Converter> {
        self.converters
            .iter()
            .find(|c| c.handles(value))
            .map(|c| c.as_ref())
    }

    /// Converter registered for `tag`
    pub fn resolve_reader(&self, tag: &str) -> Option<&dyn Converter> {
        self.by_tag.get(tag).map(|&i| self.converters[i].as_ref())
    }

    /// Registered tags in registration order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.converters.iter().map(|c| c.tag())
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tags()).finish()
    }
}

/// State available to [`Converter::to_tree`]
pub struct WriteContext<'a> {
    sink: &'a mut BlockSink,
    options: &'a WriteOptions,
    path: String,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(sink: &'a mut BlockSink, options: &'a WriteOptions) -> Self {
        Self {
            sink,
            options,
            path: String::new(),
        }
    }

    pub fn options(&self) -> &WriteOptions {
        self.options
    }

    /// Slash-separated path of the value being converted
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn set_path(&mut self, path: &str) {
        self.path.clear();
        self.path.push_str(path);
    }

    /// Queue a block and return its number
    pub fn append_block(&mut self, data: BlockData, compression: Compression) -> Result<usize> {
        self.sink.append(data, compression)
    }

    /// Queue the streamed block; it must be the last block of the file
    pub fn append_streamed(&mut self, data: BlockData) -> Result<usize> {
        self.sink.append_streamed(data)
    }
}

/// State available to [`Converter::from_tree`]
pub struct ReadContext<'a> {
    store: &'a Arc<BlockStore>,
    options: &'a ReadOptions,
    path: String,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(store: &'a Arc<BlockStore>, options: &'a ReadOptions) -> Self {
        Self {
            store,
            options,
            path: String::new(),
        }
    }

    pub fn options(&self) -> &ReadOptions {
        self.options
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn set_path(&mut self, path: &str) {
        self.path.clear();
        self.path.push_str(path);
    }

    pub fn store(&self) -> &Arc<BlockStore> {
        self.store
    }

    /// Lazy handle to block `index`
    ///
    /// Blocks past an unreadable frame still resolve; the error surfaces when the
    /// payload is requested.
    pub fn block(&self, index: usize) -> Result<BlockAccessor> {
        if index >= self.store.len() && self.store.recovery_error().is_some() {
            return Ok(BlockAccessor::new(Arc::clone(self.store), index));
        }
        self.store.read(index)
    }

    /// Logical payload length of block `index`
    pub fn block_len(&self, index: usize) -> Result<u64> {
        self.store.payload_len(index)
    }

    /// Payload length of block `index` when the header alone gives it
    ///
    /// `None` for compressed blocks and for frames that cannot be read yet.
    pub fn known_block_len(&self, index: usize) -> Option<u64> {
        if index >= self.store.len() {
            return None;
        }
        let header = self.store.header(index).ok()?;
        match header.compression() {
            Ok(Compression::None) => self.store.stored_len(index).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Converter for Named {
        fn tag(&self) -> &str {
            self.0
        }

        fn handles(&self, value: &Value) -> bool {
            value.as_str() == Some(self.0)
        }

        fn to_tree(&self, value: &Value, _ctx: &mut WriteContext<'_>) -> Result<Value> {
            Ok(value.clone())
        }

        fn from_tree(&self, _tag: &str, node: Value, _ctx: &ReadContext<'_>) -> Result<Value> {
            Ok(node)
        }
    }

    #[test]
    fn builtins_registered_by_default() {
        let registry = Registry::default();
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec![NDARRAY_TAG]);
        assert!(registry.resolve_reader(NDARRAY_TAG).is_some());
        assert!(Registry::empty().is_empty());
    }

    #[test]
    fn duplicate_tag_rejected() {
        let mut registry = Registry::empty();
        registry.register(Named("test/a-1.0.0")).unwrap();
        let err = registry.register(Named("test/a-1.0.0")).unwrap_err();
        assert!(matches!(err, Error::DuplicateTag(tag) if tag == "test/a-1.0.0"));
    }

    #[test]
    fn first_matching_writer_wins() {
        struct Any;
        impl Converter for Any {
            fn tag(&self) -> &str {
                "test/any-1.0.0"
            }
            fn handles(&self, value: &Value) -> bool {
                value.as_str().is_some()
            }
            fn to_tree(&self, value: &Value, _ctx: &mut WriteContext<'_>) -> Result<Value> {
                Ok(value.clone())
            }
            fn from_tree(&self, _tag: &str, node: Value, _ctx: &ReadContext<'_>) -> Result<Value> {
                Ok(node)
            }
        }

        let mut registry = Registry::empty();
        registry.register(Named("specific")).unwrap().register(Any).unwrap();
        let value = Value::from("specific");
        assert_eq!(registry.resolve_writer(&value).unwrap().tag(), "specific");
        let other = Value::from("other");
        assert_eq!(registry.resolve_writer(&other).unwrap().tag(), "test/any-1.0.0");
        assert!(registry.resolve_writer(&Value::Int(1)).is_none());
    }
}
