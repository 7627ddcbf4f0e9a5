//! Data types and byte order for typed arrays

use std::fmt;

/// Element data type of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl DType {
    pub const ALL: [DType; 11] = [
        DType::Bool,
        DType::U8,
        DType::I8,
        DType::U16,
        DType::I16,
        DType::U32,
        DType::I32,
        DType::U64,
        DType::I64,
        DType::F32,
        DType::F64,
    ];

    /// Size in bytes of a single element
    pub fn element_size(self) -> usize {
        match self {
            DType::Bool | DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    /// Name used for the `datatype` key in the document
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool8",
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::U16 => "uint16",
            DType::I16 => "int16",
            DType::U32 => "uint32",
            DType::I32 => "int32",
            DType::U64 => "uint64",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        DType::ALL.into_iter().find(|d| d.name() == name)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order of array elements as stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ByteOrder::Little => "little",
            ByteOrder::Big => "big",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "little" => Some(ByteOrder::Little),
            "big" => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

/// Trait for element types that can be stored in an array
pub trait ArrayType: Copy + 'static {
    const DTYPE: DType;

    /// Decode one element from exactly `DTYPE.element_size()` bytes
    fn read(bytes: &[u8], order: ByteOrder) -> Self;

    /// Append the encoded element to `out`
    fn write(self, order: ByteOrder, out: &mut Vec<u8>);
}

macro_rules! impl_array_type {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(
            impl ArrayType for $ty {
                const DTYPE: DType = $dtype;

                fn read(bytes: &[u8], order: ByteOrder) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    match order {
                        ByteOrder::Little => <$ty>::from_le_bytes(raw),
                        ByteOrder::Big => <$ty>::from_be_bytes(raw),
                    }
                }

                fn write(self, order: ByteOrder, out: &mut Vec<u8>) {
                    match order {
                        ByteOrder::Little => out.extend_from_slice(&self.to_le_bytes()),
                        ByteOrder::Big => out.extend_from_slice(&self.to_be_bytes()),
                    }
                }
            }
        )*
    };
}

impl_array_type! {
    u8 => DType::U8,
    i8 => DType::I8,
    u16 => DType::U16,
    i16 => DType::I16,
    u32 => DType::U32,
    i32 => DType::I32,
    u64 => DType::U64,
    i64 => DType::I64,
    f32 => DType::F32,
    f64 => DType::F64,
}

impl ArrayType for bool {
    const DTYPE: DType = DType::Bool;

    fn read(bytes: &[u8], _order: ByteOrder) -> Self {
        bytes[0] != 0
    }

    fn write(self, _order: ByteOrder, out: &mut Vec<u8>) {
        out.push(self as u8);
    }
}

/// Scalar read out of raw array bytes, used for inline storage
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Scalar {
    Bool(bool),
    Int(i128),
    Float(f64),
}

impl Scalar {
    pub(crate) fn decode(dtype: DType, bytes: &[u8], order: ByteOrder) -> Self {
        match dtype {
            DType::Bool => Scalar::Bool(bool::read(bytes, order)),
            DType::U8 => Scalar::Int(u8::read(bytes, order).into()),
            DType::I8 => Scalar::Int(i8::read(bytes, order).into()),
            DType::U16 => Scalar::Int(u16::read(bytes, order).into()),
            DType::I16 => Scalar::Int(i16::read(bytes, order).into()),
            DType::U32 => Scalar::Int(u32::read(bytes, order).into()),
            DType::I32 => Scalar::Int(i32::read(bytes, order).into()),
            DType::U64 => Scalar::Int(u64::read(bytes, order).into()),
            DType::I64 => Scalar::Int(i64::read(bytes, order).into()),
            DType::F32 => Scalar::Float(f32::read(bytes, order).into()),
            DType::F64 => Scalar::Float(f64::read(bytes, order)),
        }
    }

    /// Encode as `dtype`, returning false when the value does not fit
    pub(crate) fn encode(self, dtype: DType, order: ByteOrder, out: &mut Vec<u8>) -> bool {
        macro_rules! int {
            ($ty:ty, $v:expr) => {
                match <$ty>::try_from($v) {
                    Ok(x) => {
                        x.write(order, out);
                        true
                    }
                    Err(_) => false,
                }
            };
        }
        match (dtype, self) {
            (DType::Bool, Scalar::Bool(b)) => {
                b.write(order, out);
                true
            }
            (DType::Bool, Scalar::Int(i)) if i == 0 || i == 1 => {
                (i == 1).write(order, out);
                true
            }
            (DType::F32, Scalar::Float(f)) => {
                (f as f32).write(order, out);
                true
            }
            (DType::F32, Scalar::Int(i)) => {
                (i as f32).write(order, out);
                true
            }
            (DType::F64, Scalar::Float(f)) => {
                f.write(order, out);
                true
            }
            (DType::F64, Scalar::Int(i)) => {
                (i as f64).write(order, out);
                true
            }
            (DType::U8, Scalar::Int(i)) => int!(u8, i),
            (DType::I8, Scalar::Int(i)) => int!(i8, i),
            (DType::U16, Scalar::Int(i)) => int!(u16, i),
            (DType::I16, Scalar::Int(i)) => int!(i16, i),
            (DType::U32, Scalar::Int(i)) => int!(u32, i),
            (DType::I32, Scalar::Int(i)) => int!(i32, i),
            (DType::U64, Scalar::Int(i)) => int!(u64, i),
            (DType::I64, Scalar::Int(i)) => int!(i64, i),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for dtype in DType::ALL {
            assert_eq!(DType::from_name(dtype.name()), Some(dtype));
        }
        assert_eq!(DType::from_name("complex128"), None);
    }

    #[test]
    fn element_sizes() {
        assert_eq!(DType::Bool.element_size(), 1);
        assert_eq!(DType::I16.element_size(), 2);
        assert_eq!(DType::F32.element_size(), 4);
        assert_eq!(DType::U64.element_size(), 8);
    }

    #[test]
    fn byte_order_read_write() {
        let mut le = Vec::new();
        0x0102_0304u32.write(ByteOrder::Little, &mut le);
        assert_eq!(le, [4, 3, 2, 1]);

        let mut be = Vec::new();
        0x0102_0304u32.write(ByteOrder::Big, &mut be);
        assert_eq!(be, [1, 2, 3, 4]);

        assert_eq!(u32::read(&be, ByteOrder::Big), 0x0102_0304);
        assert_eq!(f64::read(&2.5f64.to_be_bytes(), ByteOrder::Big), 2.5);
    }

    #[test]
    fn scalar_encode_rejects_out_of_range() {
        let mut out = Vec::new();
        assert!(!Scalar::Int(300).encode(DType::U8, ByteOrder::Little, &mut out));
        assert!(!Scalar::Float(1.5).encode(DType::I32, ByteOrder::Little, &mut out));
        assert!(out.is_empty());
        assert!(Scalar::Int(-2).encode(DType::I16, ByteOrder::Big, &mut out));
        assert_eq!(out, (-2i16).to_be_bytes());
    }
}
