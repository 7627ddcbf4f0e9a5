//! Tree value model

use super::array::elements_equal;
use super::{Array, LazyArray};
use crate::error::AccessError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Kind of a value, used in access errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    LazyArray,
    Mapping,
    Sequence,
    Extension,
    Tagged,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::LazyArray => "lazy array",
            ValueKind::Mapping => "mapping",
            ValueKind::Sequence => "sequence",
            ValueKind::Extension => "extension",
            ValueKind::Tagged => "tagged",
        }
    }
}

/// A caller-defined typed value carried in the tree
///
/// Implemented for every `Debug + PartialEq + Send + Sync + 'static` type, so any
/// such struct can be wrapped with [`Value::extension`] and written by a matching
/// [`Converter`](crate::extension::Converter).
pub trait Extension: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn Extension) -> bool;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + fmt::Debug + PartialEq + Send + Sync> Extension for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Extension) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Shared handle to an extension value
#[derive(Clone)]
pub struct ExtensionValue(Arc<dyn Extension>);

impl ExtensionValue {
    pub fn new<T: Extension>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Extension>(&self) -> Option<&T> {
        self.0.as_ref().as_any().downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.as_ref().type_name()
    }
}

impl fmt::Debug for ExtensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_ref(), f)
    }
}

impl PartialEq for ExtensionValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref().eq_dyn(other.0.as_ref())
    }
}

/// Node carrying a tag no registered converter understands, kept verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged {
    pub tag: String,
    pub value: Box<Value>,
}

/// Tree value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Array),
    LazyArray(LazyArray),
    Mapping(Vec<(String, Value)>),
    Sequence(Vec<Value>),
    Extension(ExtensionValue),
    Tagged(Tagged),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::LazyArray(_) => ValueKind::LazyArray,
            Value::Mapping(_) => ValueKind::Mapping,
            Value::Sequence(_) => ValueKind::Sequence,
            Value::Extension(_) => ValueKind::Extension,
            Value::Tagged(_) => ValueKind::Tagged,
        }
    }

    /// Wrap a caller-defined value
    pub fn extension<T: Extension>(value: T) -> Self {
        Value::Extension(ExtensionValue::new(value))
    }

    pub fn tagged(tag: impl Into<String>, value: Value) -> Self {
        Value::Tagged(Tagged {
            tag: tag.into(),
            value: Box::new(value),
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float value; integers are widened
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_lazy_array(&self) -> Option<&LazyArray> {
        match self {
            Value::LazyArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tagged(&self) -> Option<&Tagged> {
        match self {
            Value::Tagged(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_extension<T: Extension>(&self) -> Option<&T> {
        match self {
            Value::Extension(e) => e.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Look up a key in a mapping
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.as_mapping()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Get a nested value by slash-separated path (e.g., "model/layers/0")
    ///
    /// Numeric segments index into sequences; tagged nodes are looked through.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for key in path.split('/').filter(|k| !k.is_empty()) {
            if let Value::Tagged(t) = current {
                current = &t.value;
            }
            current = match current {
                Value::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)?,
                Value::Sequence(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Like [`Value::get`], reporting the missing path
    pub fn lookup(&self, path: &str) -> Result<&Value, AccessError> {
        self.get(path).ok_or_else(|| AccessError::NotFound {
            path: path.to_string(),
        })
    }

    /// String at `path`, or an error naming what was found instead
    pub fn lookup_str(&self, path: &str) -> Result<&str, AccessError> {
        let value = self.lookup(path)?;
        value.as_str().ok_or_else(|| AccessError::TypeMismatch {
            path: path.to_string(),
            expected: "string",
            actual: value.kind(),
        })
    }

    pub fn lookup_int(&self, path: &str) -> Result<i64, AccessError> {
        let value = self.lookup(path)?;
        value.as_int().ok_or_else(|| AccessError::TypeMismatch {
            path: path.to_string(),
            expected: "int",
            actual: value.kind(),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Extension(a), Value::Extension(b)) => a == b,
            (Value::Tagged(a), Value::Tagged(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.dtype == b.dtype
                    && a.shape == b.shape
                    && elements_equal(a.dtype, &a.data, a.byteorder, &b.data, b.byteorder)
            }
            (Value::Array(a), Value::LazyArray(l)) | (Value::LazyArray(l), Value::Array(a)) => {
                a.dtype == l.dtype
                    && a.shape == l.shape
                    && l.data().is_ok_and(|data| {
                        elements_equal(a.dtype, &a.data, a.byteorder, &data, l.byteorder)
                    })
            }
            (Value::LazyArray(a), Value::LazyArray(b)) => {
                a.dtype == b.dtype
                    && a.shape == b.shape
                    && match (a.data(), b.data()) {
                        (Ok(x), Ok(y)) => elements_equal(a.dtype, &x, a.byteorder, &y, b.byteorder),
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

// Convenience From impls for Value
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<LazyArray> for Value {
    fn from(v: LazyArray) -> Self {
        Value::LazyArray(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DType;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    fn sample() -> Value {
        Value::Mapping(vec![
            (
                "model".into(),
                Value::Mapping(vec![
                    ("name".into(), "bert".into()),
                    ("layers".into(), Value::Sequence(vec![1i64.into(), 2i64.into()])),
                ]),
            ),
            ("enabled".into(), true.into()),
        ])
    }

    #[test]
    fn get_by_path() {
        let v = sample();
        assert_eq!(v.get("model/name").and_then(Value::as_str), Some("bert"));
        assert_eq!(v.get("model/layers/1").and_then(Value::as_int), Some(2));
        assert_eq!(v.get("enabled").and_then(Value::as_bool), Some(true));
        assert!(v.get("model/layers/9").is_none());
        assert!(v.get("missing").is_none());
    }

    #[test]
    fn get_looks_through_tags() {
        let v = Value::Mapping(vec![(
            "unit".into(),
            Value::tagged(
                "example.org/unit-1.0.0",
                Value::Mapping(vec![("name".into(), "m".into())]),
            ),
        )]);
        assert_eq!(v.get("unit/name").and_then(Value::as_str), Some("m"));
    }

    #[test]
    fn lookup_errors() {
        let v = sample();
        assert_eq!(
            v.lookup("nope").unwrap_err(),
            AccessError::NotFound { path: "nope".into() }
        );
        assert_eq!(
            v.lookup_str("enabled").unwrap_err(),
            AccessError::TypeMismatch {
                path: "enabled".into(),
                expected: "string",
                actual: ValueKind::Bool,
            }
        );
        assert_eq!(v.lookup_int("model/layers/0").unwrap(), 1);
    }

    #[test]
    fn extension_downcast_and_eq() {
        let a = Value::extension(Point { x: 1, y: 2 });
        let b = Value::extension(Point { x: 1, y: 2 });
        let c = Value::extension(Point { x: 3, y: 2 });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_extension::<Point>(), Some(&Point { x: 1, y: 2 }));
        assert_eq!(a.as_extension::<String>(), None);
        assert_ne!(a, Value::extension("point".to_string()));
    }

    #[test]
    fn arrays_compare_by_elements() {
        let a = Array::from_elements(vec![2], &[1.0f64, 2.0]);
        let b = Array::new(
            DType::F64,
            vec![2],
            [1.0f64, 2.0].iter().flat_map(|f| f.to_be_bytes()).collect::<Vec<u8>>(),
        )
        .with_byteorder(crate::types::ByteOrder::Big);
        assert_eq!(Value::Array(a.clone()), Value::Array(b));
        let reshaped = Array::new(DType::F64, vec![1, 2], a.data.clone());
        assert_ne!(Value::Array(a), Value::Array(reshaped));
    }

    #[test]
    fn nan_floats_are_equal() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(1.0), Value::Int(1));
    }
}
