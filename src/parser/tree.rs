//! YAML document to typed tree

use super::ReadOptions;
use crate::block::BlockStore;
use crate::error::{Error, Result, display_path};
use crate::extension::{ReadContext, Registry};
use crate::types::{Tagged, Value};
use crate::writer::MAX_DEPTH;
use serde_yaml::Value as Yaml;
use serde_yaml::value::Tag;
use std::sync::Arc;
use tracing::warn;

/// Rebuild a typed tree from a parsed document
///
/// Children are converted before their parent, so a converter sees a node whose
/// nested typed values are already built. Block references resolve against
/// `store` without reading payloads.
pub fn deserialize(
    doc: Yaml,
    registry: &Registry,
    store: &Arc<BlockStore>,
    options: &ReadOptions,
) -> Result<Value> {
    let mut deserializer = Deserializer {
        registry,
        ctx: ReadContext::new(store, options),
        path: String::new(),
    };
    deserializer.node(doc, 0)
}

/// Tag text without the leading `!`
pub(crate) fn tag_name(tag: &Tag) -> String {
    let text = tag.to_string();
    match text.strip_prefix('!') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

struct Deserializer<'a> {
    registry: &'a Registry,
    ctx: ReadContext<'a>,
    path: String,
}

impl Deserializer<'_> {
    fn node(&mut self, yaml: Yaml, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(Error::invalid_node(&self.path, "document is nested too deeply"));
        }
        Ok(match yaml {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => Value::Bool(b),
            Yaml::Number(n) => match (n.as_i64(), n.is_f64()) {
                (Some(i), _) => Value::Int(i),
                (None, true) => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
                (None, false) => {
                    return Err(Error::invalid_node(
                        &self.path,
                        format!("integer {n} does not fit in 64 bits"),
                    ));
                }
            },
            Yaml::String(s) => Value::String(s),
            Yaml::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let mark = self.enter(&i.to_string());
                    out.push(self.node(item, depth + 1)?);
                    self.path.truncate(mark);
                }
                Value::Sequence(out)
            }
            Yaml::Mapping(mapping) => {
                let mut out = Vec::with_capacity(mapping.len());
                for (key, item) in mapping {
                    let key = self.key(key)?;
                    let mark = self.enter(&key);
                    let item = self.node(item, depth + 1)?;
                    self.path.truncate(mark);
                    out.push((key, item));
                }
                Value::Mapping(out)
            }
            Yaml::Tagged(tagged) => {
                let tagged = *tagged;
                let tag = tag_name(&tagged.tag);
                let content = self.node(tagged.value, depth + 1)?;
                self.convert(tag, content)?
            }
        })
    }

    fn convert(&mut self, tag: String, content: Value) -> Result<Value> {
        let registry = self.registry;
        match registry.resolve_reader(&tag) {
            Some(converter) => {
                self.ctx.set_path(&self.path);
                converter.from_tree(&tag, content, &self.ctx)
            }
            None if self.ctx.options().strict_extensions => Err(Error::UnknownExtensionType {
                tag,
                path: display_path(&self.path),
            }),
            None => {
                warn!(%tag, path = %display_path(&self.path), "no converter for tag, keeping node as is");
                Ok(Value::Tagged(Tagged {
                    tag,
                    value: Box::new(content),
                }))
            }
        }
    }

    /// Mapping keys as strings; scalar keys are converted to their text
    fn key(&self, key: Yaml) -> Result<String> {
        match key {
            Yaml::String(s) => Ok(s),
            Yaml::Number(n) => Ok(n.to_string()),
            Yaml::Bool(b) => Ok(b.to_string()),
            Yaml::Null => Ok("null".to_string()),
            _ => Err(Error::invalid_node(&self.path, "mapping keys must be scalars")),
        }
    }

    fn enter(&mut self, segment: &str) -> usize {
        let mark = self.path.len();
        if !self.path.is_empty() {
            self.path.push('/');
        }
        self.path.push_str(segment);
        mark
    }
}
