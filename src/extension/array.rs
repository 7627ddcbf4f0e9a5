//! Built-in converter for numeric arrays
//!
//! Block-stored arrays are written as
//!
//! ```yaml
//! !core/ndarray-1.0.0
//! source: 0
//! datatype: float64
//! byteorder: little
//! shape: [10, 10]
//! ```
//!
//! with optional `offset` and `strides` for views. A streamed array writes `'*'` as
//! its first dimension. Inline arrays carry their elements as nested sequences
//! under `data`.

use super::{Converter, ReadContext, WriteContext};
use crate::block::BlockData;
use crate::error::{Error, Result, display_path};
use crate::types::{Array, ArrayStorage, ByteOrder, DType, LazyArray, Scalar, Value, byte_size};
use std::borrow::Cow;
use std::sync::Arc;

/// Tag of array nodes
pub const NDARRAY_TAG: &str = "core/ndarray-1.0.0";

/// Placeholder for the inferred first dimension of a streamed array
const STREAMED_DIM: &str = "*";

/// Converts [`Value::Array`] and [`Value::LazyArray`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NdarrayConverter;

impl Converter for NdarrayConverter {
    fn tag(&self) -> &str {
        NDARRAY_TAG
    }

    fn handles(&self, value: &Value) -> bool {
        matches!(value, Value::Array(_) | Value::LazyArray(_))
    }

    fn to_tree(&self, value: &Value, ctx: &mut WriteContext<'_>) -> Result<Value> {
        match value {
            Value::Array(array) => write_array(array, ctx),
            Value::LazyArray(lazy) => write_lazy(lazy, ctx),
            other => Err(Error::NoConverter {
                kind: other.kind().name(),
                path: display_path(ctx.path()),
            }),
        }
    }

    fn from_tree(&self, _tag: &str, node: Value, ctx: &ReadContext<'_>) -> Result<Value> {
        if node.as_mapping().is_none() {
            return Err(Error::invalid_node(ctx.path(), "array node must be a mapping"));
        }
        if let Some(data) = node.field("data") {
            return read_inline(&node, data, ctx.path()).map(Value::Array);
        }
        let Some(source) = node.field("source") else {
            return Err(Error::invalid_node(
                ctx.path(),
                "array node needs `source` or `data`",
            ));
        };
        let lazy = read_block_ref(&node, source, ctx)?;
        if ctx.options().lazy_load {
            Ok(Value::LazyArray(lazy))
        } else {
            lazy.load().map(Value::Array)
        }
    }
}

fn write_array(array: &Array, ctx: &mut WriteContext<'_>) -> Result<Value> {
    array.validate()?;
    match ctx.options().storage_for(array.storage, array.num_elements()) {
        ArrayStorage::Inline => inline_node(array.dtype, array.byteorder, &array.shape, &array.data),
        ArrayStorage::Internal => {
            let compression = array.compression.unwrap_or(ctx.options().compression);
            let source = ctx.append_block(BlockData::Bytes(array.data.clone()), compression)?;
            block_node(source, array.dtype, array.byteorder, &array.shape, false, 0, None)
        }
        ArrayStorage::Streamed => {
            check_streamable(&array.shape)?;
            let source = ctx.append_streamed(BlockData::Bytes(array.data.clone()))?;
            block_node(source, array.dtype, array.byteorder, &array.shape, true, 0, None)
        }
    }
}

fn write_lazy(lazy: &LazyArray, ctx: &mut WriteContext<'_>) -> Result<Value> {
    match ctx.options().storage_for(lazy.storage, lazy.num_elements()) {
        ArrayStorage::Inline => {
            let data = lazy.data()?;
            inline_node(lazy.dtype, lazy.byteorder, &lazy.shape, &data)
        }
        ArrayStorage::Internal => {
            let compression = lazy.compression.unwrap_or(ctx.options().compression);
            let source = ctx.append_block(BlockData::Block(lazy.accessor().clone()), compression)?;
            block_node(
                source,
                lazy.dtype,
                lazy.byteorder,
                &lazy.shape,
                false,
                lazy.offset,
                lazy.strides.as_deref(),
            )
        }
        ArrayStorage::Streamed => {
            check_streamable(&lazy.shape)?;
            let data: Arc<[u8]> = lazy.data()?.into_owned().into();
            let source = ctx.append_streamed(BlockData::Bytes(data))?;
            block_node(source, lazy.dtype, lazy.byteorder, &lazy.shape, true, 0, None)
        }
    }
}

fn check_streamable(shape: &[u64]) -> Result<()> {
    if shape.is_empty() {
        return Err(Error::InvalidArray(
            "a streamed array needs at least one dimension".into(),
        ));
    }
    Ok(())
}

fn int(value: u64) -> Result<Value> {
    i64::try_from(value)
        .map(Value::Int)
        .map_err(|_| Error::InvalidArray(Cow::Owned(format!("{value} does not fit in a document integer"))))
}

fn block_node(
    source: usize,
    dtype: DType,
    byteorder: ByteOrder,
    shape: &[u64],
    streamed: bool,
    offset: u64,
    strides: Option<&[i64]>,
) -> Result<Value> {
    let mut dims = Vec::with_capacity(shape.len());
    for (i, dim) in shape.iter().enumerate() {
        dims.push(if streamed && i == 0 {
            Value::from(STREAMED_DIM)
        } else {
            int(*dim)?
        });
    }
    let mut node = vec![
        ("source".to_string(), int(source as u64)?),
        ("datatype".to_string(), Value::from(dtype.name())),
        ("byteorder".to_string(), Value::from(byteorder.name())),
        ("shape".to_string(), Value::Sequence(dims)),
    ];
    if offset != 0 {
        node.push(("offset".to_string(), int(offset)?));
    }
    if let Some(strides) = strides {
        let strides = strides.iter().map(|s| Value::Int(*s)).collect();
        node.push(("strides".to_string(), Value::Sequence(strides)));
    }
    Ok(Value::Mapping(node))
}

fn inline_node(dtype: DType, byteorder: ByteOrder, shape: &[u64], data: &[u8]) -> Result<Value> {
    let mut items = Vec::with_capacity(data.len() / dtype.element_size());
    for chunk in data.chunks_exact(dtype.element_size()) {
        items.push(match Scalar::decode(dtype, chunk, byteorder) {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::Int(i64::try_from(i).map_err(|_| {
                Error::InvalidArray(Cow::Owned(format!("{i} cannot be written inline")))
            })?),
            Scalar::Float(f) => Value::Float(f),
        });
    }
    let mut items = items.into_iter();
    let data = nest(shape, &mut items);
    let dims = shape.iter().map(|d| int(*d)).collect::<Result<Vec<_>>>()?;
    Ok(Value::Mapping(vec![
        ("data".to_string(), data),
        ("datatype".to_string(), Value::from(dtype.name())),
        ("shape".to_string(), Value::Sequence(dims)),
    ]))
}

fn nest(shape: &[u64], items: &mut impl Iterator<Item = Value>) -> Value {
    match shape.split_first() {
        None => items.next().unwrap_or(Value::Null),
        Some((&len, rest)) => Value::Sequence((0..len).map(|_| nest(rest, items)).collect()),
    }
}

fn read_inline(node: &Value, data: &Value, path: &str) -> Result<Array> {
    let byteorder = read_byteorder(node, path)?;
    let shape = match node.field("shape") {
        Some(shape) => read_shape(shape, path)?
            .into_iter()
            .map(|dim| dim.ok_or_else(|| Error::invalid_node(path, "inline arrays cannot be streamed")))
            .collect::<Result<Vec<_>>>()?,
        None => infer_shape(data),
    };
    let mut scalars = Vec::new();
    if !collect(data, &shape, &mut scalars) {
        return Err(Error::invalid_node(
            path,
            format!("inline data does not match shape {shape:?}"),
        ));
    }
    let dtype = match node.field("datatype") {
        Some(_) => read_dtype(node, path)?,
        None => infer_dtype(&scalars),
    };
    let mut bytes = Vec::with_capacity(scalars.len() * dtype.element_size());
    for scalar in scalars {
        if !scalar.encode(dtype, byteorder, &mut bytes) {
            return Err(Error::invalid_node(
                path,
                format!("{scalar:?} does not fit {dtype}"),
            ));
        }
    }
    Ok(Array::new(dtype, shape, bytes)
        .with_byteorder(byteorder)
        .with_storage(ArrayStorage::Inline))
}

/// Shape from the lengths along the first element of each level
fn infer_shape(data: &Value) -> Vec<u64> {
    let mut shape = Vec::new();
    let mut level = data;
    while let Some(items) = level.as_sequence() {
        shape.push(items.len() as u64);
        match items.first() {
            Some(first) => level = first,
            None => break,
        }
    }
    shape
}

fn collect(node: &Value, shape: &[u64], out: &mut Vec<Scalar>) -> bool {
    match shape.split_first() {
        None => {
            let scalar = match node {
                Value::Bool(b) => Scalar::Bool(*b),
                Value::Int(i) => Scalar::Int(*i as i128),
                Value::Float(f) => Scalar::Float(*f),
                _ => return false,
            };
            out.push(scalar);
            true
        }
        Some((&len, rest)) => match node.as_sequence() {
            Some(items) if items.len() as u64 == len => {
                items.iter().all(|item| collect(item, rest, out))
            }
            _ => false,
        },
    }
}

fn infer_dtype(scalars: &[Scalar]) -> DType {
    if scalars.is_empty() || scalars.iter().any(|s| matches!(s, Scalar::Float(_))) {
        DType::F64
    } else if scalars.iter().all(|s| matches!(s, Scalar::Bool(_))) {
        DType::Bool
    } else {
        DType::I64
    }
}

fn read_block_ref(node: &Value, source: &Value, ctx: &ReadContext<'_>) -> Result<LazyArray> {
    let path = ctx.path();
    let index = match source {
        Value::Int(i) => usize::try_from(*i)
            .map_err(|_| Error::invalid_node(path, format!("negative block source {i}")))?,
        Value::String(_) => {
            return Err(Error::invalid_node(path, "external block sources are not supported"));
        }
        other => {
            return Err(Error::invalid_node(
                path,
                format!("block source must be an integer, got {}", other.kind().name()),
            ));
        }
    };
    let dtype = read_dtype(node, path)?;
    let byteorder = read_byteorder(node, path)?;
    let offset = match node.field("offset") {
        None => 0,
        Some(Value::Int(i)) if *i >= 0 => *i as u64,
        Some(_) => return Err(Error::invalid_node(path, "offset must be a non-negative integer")),
    };
    let strides = match node.field("strides") {
        None => None,
        Some(strides) => Some(read_strides(strides, path)?),
    };
    let Some(shape) = node.field("shape") else {
        return Err(Error::invalid_node(path, "block array needs a shape"));
    };
    let dims = read_shape(shape, path)?;
    let item = dtype.element_size();
    let shape: Vec<u64> = if dims.first().is_some_and(Option::is_none) {
        let rest: Vec<u64> = dims[1..].iter().flatten().copied().collect();
        let Some(row) = byte_size(&rest, item) else {
            return Err(Error::invalid_node(path, format!("row of shape {rest:?} is too large")));
        };
        let available = ctx.block_len(index)?.saturating_sub(offset);
        let rows = match row {
            0 => 0,
            row if available % row == 0 => available / row,
            row => {
                return Err(Error::invalid_node(
                    path,
                    format!("streamed block of {available} bytes is not a whole number of {row} byte rows"),
                ));
            }
        };
        std::iter::once(rows).chain(rest).collect()
    } else {
        dims.into_iter().flatten().collect()
    };
    let Some(size) = byte_size(&shape, item) else {
        return Err(Error::invalid_node(path, format!("shape {shape:?} is too large")));
    };
    if let Some(strides) = &strides
        && strides.len() != shape.len()
    {
        return Err(Error::invalid_node(path, "strides and shape differ in length"));
    }
    if strides.is_none()
        && let Some(stored) = ctx.known_block_len(index)
        && offset.checked_add(size).is_none_or(|end| end > stored)
    {
        return Err(Error::invalid_node(
            path,
            format!("shape {shape:?} needs {size} bytes at offset {offset}, block {index} holds {stored}"),
        ));
    }

    let mut lazy = LazyArray::new(dtype, byteorder, shape, ctx.block(index)?);
    lazy.offset = offset;
    lazy.strides = strides;
    Ok(lazy)
}

fn read_dtype(node: &Value, path: &str) -> Result<DType> {
    match node.field("datatype").and_then(Value::as_str) {
        Some(name) => DType::from_name(name)
            .ok_or_else(|| Error::invalid_node(path, format!("unknown datatype '{name}'"))),
        None => Err(Error::invalid_node(path, "array node needs a datatype")),
    }
}

fn read_byteorder(node: &Value, path: &str) -> Result<ByteOrder> {
    match node.field("byteorder") {
        None => Ok(ByteOrder::Little),
        Some(value) => value
            .as_str()
            .and_then(ByteOrder::from_name)
            .ok_or_else(|| Error::invalid_node(path, "byteorder must be 'little' or 'big'")),
    }
}

/// Dimensions, `None` for a leading streamed dimension
fn read_shape(shape: &Value, path: &str) -> Result<Vec<Option<u64>>> {
    let Some(dims) = shape.as_sequence() else {
        return Err(Error::invalid_node(path, "shape must be a sequence"));
    };
    dims.iter()
        .enumerate()
        .map(|(i, dim)| match dim {
            Value::Int(n) if *n >= 0 => Ok(Some(*n as u64)),
            Value::String(s) if s == STREAMED_DIM && i == 0 => Ok(None),
            _ => Err(Error::invalid_node(path, format!("invalid dimension at position {i}"))),
        })
        .collect()
}

fn read_strides(strides: &Value, path: &str) -> Result<Vec<i64>> {
    let Some(items) = strides.as_sequence() else {
        return Err(Error::invalid_node(path, "strides must be a sequence"));
    };
    items
        .iter()
        .map(|s| {
            s.as_int()
                .ok_or_else(|| Error::invalid_node(path, "strides must be integers"))
        })
        .collect()
}
