//! Typed tree to YAML document

use super::WriteOptions;
use crate::block::BlockSink;
use crate::error::{Error, Result, display_path};
use crate::extension::{Registry, WriteContext};
use crate::types::Value;
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value as Yaml};

/// Nesting limit for trees and converter output
pub const MAX_DEPTH: usize = 512;

/// Convert `tree` into a document, queueing binary payloads on `sink`
///
/// Nodes are visited depth-first in mapping and sequence order, so block numbers
/// follow document order and equal trees give equal output.
pub fn serialize(
    tree: &Value,
    registry: &Registry,
    sink: &mut BlockSink,
    options: &WriteOptions,
) -> Result<Yaml> {
    let mut serializer = Serializer {
        registry,
        ctx: WriteContext::new(sink, options),
        path: String::new(),
    };
    serializer.node(tree, 0)
}

struct Serializer<'a> {
    registry: &'a Registry,
    ctx: WriteContext<'a>,
    path: String,
}

impl Serializer<'_> {
    /// Convert one node, dispatching typed values to their converter
    fn node(&mut self, value: &Value, depth: usize) -> Result<Yaml> {
        if depth > MAX_DEPTH {
            return Err(Error::invalid_node(&self.path, "tree is nested too deeply"));
        }
        let registry = self.registry;
        if let Some(converter) = registry.resolve_writer(value) {
            self.ctx.set_path(&self.path);
            let content = converter.to_tree(value, &mut self.ctx)?;
            let content = self.structure(&content, depth + 1)?;
            return tagged(converter.tag(), content, &self.path);
        }
        self.structure(value, depth)
    }

    /// Copy a node's structure; children go back through [`Serializer::node`]
    fn structure(&mut self, value: &Value, depth: usize) -> Result<Yaml> {
        Ok(match value {
            Value::Null => Yaml::Null,
            Value::Bool(b) => Yaml::Bool(*b),
            Value::Int(i) => Yaml::Number((*i).into()),
            Value::Float(f) => Yaml::Number((*f).into()),
            Value::String(s) => Yaml::String(s.clone()),
            Value::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let mark = self.enter(&i.to_string());
                    out.push(self.node(item, depth + 1)?);
                    self.path.truncate(mark);
                }
                Yaml::Sequence(out)
            }
            Value::Mapping(entries) => {
                let mut out = Mapping::with_capacity(entries.len());
                for (key, item) in entries {
                    let mark = self.enter(key);
                    let converted = self.node(item, depth + 1)?;
                    if out.insert(Yaml::String(key.clone()), converted).is_some() {
                        return Err(Error::invalid_node(&self.path, "duplicate mapping key"));
                    }
                    self.path.truncate(mark);
                }
                Yaml::Mapping(out)
            }
            Value::Tagged(tagged_value) => {
                let content = self.structure(&tagged_value.value, depth + 1)?;
                tagged(&tagged_value.tag, content, &self.path)?
            }
            Value::Array(_) | Value::LazyArray(_) | Value::Extension(_) => {
                return Err(Error::NoConverter {
                    kind: value.kind().name(),
                    path: display_path(&self.path),
                });
            }
        })
    }

    /// Push a path segment, returning the length to truncate back to
    fn enter(&mut self, segment: &str) -> usize {
        let mark = self.path.len();
        if !self.path.is_empty() {
            self.path.push('/');
        }
        self.path.push_str(segment);
        mark
    }
}

fn tagged(tag: &str, value: Yaml, path: &str) -> Result<Yaml> {
    let tag = tag.strip_prefix('!').unwrap_or(tag);
    if tag.is_empty() {
        return Err(Error::invalid_node(path, "empty tag"));
    }
    Ok(Yaml::Tagged(Box::new(TaggedValue {
        tag: Tag::new(tag),
        value,
    })))
}
