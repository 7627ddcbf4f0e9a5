//! Typed array types

use super::{ArrayType, ByteOrder, DType};
use crate::block::{BlockAccessor, Compression};
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::sync::Arc;

/// Where an array's elements go when the tree is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayStorage {
    /// Binary block after the document
    #[default]
    Internal,
    /// Literal nested sequences inside the document
    Inline,
    /// Final block whose payload runs to the end of the file
    Streamed,
}

/// Owned typed array (for building/writing)
///
/// Elements are stored contiguously in row-major order, encoded in `byteorder`.
#[derive(Debug, Clone)]
pub struct Array {
    pub dtype: DType,
    pub byteorder: ByteOrder,
    pub shape: Vec<u64>,
    pub data: Arc<[u8]>,
    /// Per-array override of `WriteOptions::array_storage`
    pub storage: Option<ArrayStorage>,
    /// Per-array override of `WriteOptions::compression`
    pub compression: Option<Compression>,
}

impl Array {
    /// Create from raw little-endian bytes
    pub fn new(dtype: DType, shape: Vec<u64>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            dtype,
            byteorder: ByteOrder::Little,
            shape,
            data: data.into(),
            storage: None,
            compression: None,
        }
    }

    /// Create from typed elements, encoded little-endian
    pub fn from_elements<T: ArrayType>(shape: Vec<u64>, values: &[T]) -> Self {
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.element_size());
        for v in values {
            v.write(ByteOrder::Little, &mut data);
        }
        Self::new(T::DTYPE, shape, data)
    }

    /// Declare the byte order `data` is encoded in
    pub fn with_byteorder(mut self, byteorder: ByteOrder) -> Self {
        self.byteorder = byteorder;
        self
    }

    pub fn with_storage(mut self, storage: ArrayStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Total number of elements, saturating at `u64::MAX`
    pub fn num_elements(&self) -> u64 {
        saturating_product(&self.shape)
    }

    /// Expected data size in bytes, saturating at `u64::MAX`
    pub fn expected_size(&self) -> u64 {
        self.num_elements().saturating_mul(self.dtype.element_size() as u64)
    }

    /// Check that the buffer length matches shape and dtype
    pub fn validate(&self) -> Result<()> {
        if self.data.len() as u64 != self.expected_size() {
            return Err(Error::InvalidArray(Cow::Owned(format!(
                "shape {:?} of {} needs {} bytes, buffer has {}",
                self.shape,
                self.dtype,
                self.expected_size(),
                self.data.len()
            ))));
        }
        Ok(())
    }

    /// Decode all elements into native values
    pub fn to_vec<T: ArrayType>(&self) -> Result<Vec<T>> {
        self.validate()?;
        decode_elements(self.dtype, &self.data, self.byteorder)
    }

    /// True when both arrays point at the same buffer
    pub fn shares_data(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Array whose elements live in a block of an open file
///
/// Nothing is read until [`LazyArray::data`] (or a method built on it) is called;
/// the block payload is then cached for the lifetime of the accessor.
#[derive(Debug, Clone)]
pub struct LazyArray {
    pub dtype: DType,
    pub byteorder: ByteOrder,
    pub shape: Vec<u64>,
    /// Byte offset of the first element inside the block payload
    pub offset: u64,
    /// Byte strides per dimension, `None` for contiguous row-major
    pub strides: Option<Vec<i64>>,
    pub storage: Option<ArrayStorage>,
    pub compression: Option<Compression>,
    pub(crate) block: BlockAccessor,
}

impl LazyArray {
    pub(crate) fn new(
        dtype: DType,
        byteorder: ByteOrder,
        shape: Vec<u64>,
        block: BlockAccessor,
    ) -> Self {
        Self {
            dtype,
            byteorder,
            shape,
            offset: 0,
            strides: None,
            storage: None,
            compression: None,
            block,
        }
    }

    /// Number of the block holding the elements
    pub fn block_index(&self) -> usize {
        self.block.index()
    }

    /// Whether the block payload has been materialized
    pub fn is_loaded(&self) -> bool {
        self.block.is_loaded()
    }

    pub fn accessor(&self) -> &BlockAccessor {
        &self.block
    }

    pub fn num_elements(&self) -> u64 {
        saturating_product(&self.shape)
    }

    pub fn expected_size(&self) -> u64 {
        self.num_elements().saturating_mul(self.dtype.element_size() as u64)
    }

    /// True when the view covers a contiguous row-major range of the block
    pub fn is_contiguous(&self) -> bool {
        match &self.strides {
            None => true,
            Some(strides) => {
                self.num_elements() <= 1
                    || *strides == c_strides(&self.shape, self.dtype.element_size())
            }
        }
    }

    pub fn with_storage(mut self, storage: ArrayStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Materialize the elements as contiguous bytes in `byteorder`
    ///
    /// Contiguous views borrow the cached block payload; strided views are gathered
    /// into a new buffer.
    pub fn data(&self) -> Result<Cow<'_, [u8]>> {
        let payload = self.block.get()?;
        let size = self.expected_size();
        if self.is_contiguous() {
            let end = self.offset.checked_add(size).filter(|end| *end <= payload.len() as u64);
            let Some(end) = end else {
                return Err(Error::InvalidArray(Cow::Owned(format!(
                    "block {} holds {} bytes, view needs {} at offset {}",
                    self.block_index(),
                    payload.len(),
                    size,
                    self.offset
                ))));
            };
            return Ok(Cow::Borrowed(&payload[self.offset as usize..end as usize]));
        }
        let strides = self.strides.as_deref().unwrap_or_default();
        gather(payload, self.offset, &self.shape, strides, self.dtype.element_size())
            .map(Cow::Owned)
    }

    /// Copy the elements into an owned array
    pub fn load(&self) -> Result<Array> {
        let data = self.data()?;
        let mut array = Array::new(self.dtype, self.shape.clone(), data.into_owned())
            .with_byteorder(self.byteorder);
        array.storage = self.storage;
        array.compression = self.compression;
        Ok(array)
    }

    /// Decode all elements into native values
    pub fn to_vec<T: ArrayType>(&self) -> Result<Vec<T>> {
        let data = self.data()?;
        decode_elements(self.dtype, &data, self.byteorder)
    }
}

/// Row-major byte strides for `shape`
fn c_strides(shape: &[u64], item: usize) -> Vec<i64> {
    let mut strides = vec![0i64; shape.len()];
    let mut step = item as i64;
    for (stride, dim) in strides.iter_mut().zip(shape).rev() {
        *stride = step;
        step = step.saturating_mul(i64::try_from((*dim).max(1)).unwrap_or(i64::MAX));
    }
    strides
}

/// Bytes held by `shape` elements of `item` bytes, `None` on overflow
pub(crate) fn byte_size(shape: &[u64], item: usize) -> Option<u64> {
    if shape.contains(&0) {
        return Some(0);
    }
    shape.iter().try_fold(item as u64, |acc, dim| acc.checked_mul(*dim))
}

fn saturating_product(shape: &[u64]) -> u64 {
    shape.iter().fold(1u64, |acc, dim| acc.saturating_mul(*dim))
}

fn gather(payload: &[u8], offset: u64, shape: &[u64], strides: &[i64], item: usize) -> Result<Vec<u8>> {
    if strides.len() != shape.len() {
        return Err(Error::InvalidArray(Cow::Owned(format!(
            "{} strides for {} dimensions",
            strides.len(),
            shape.len()
        ))));
    }
    let Some(size) = byte_size(shape, item).filter(|size| *size <= isize::MAX as u64) else {
        return Err(Error::InvalidArray(Cow::Owned(format!(
            "view of shape {shape:?} is too large"
        ))));
    };
    let total = saturating_product(shape);
    let mut out = Vec::with_capacity((size as usize).min(payload.len()));
    let mut index = vec![0u64; shape.len()];
    for _ in 0..total {
        let pos = index
            .iter()
            .zip(strides)
            .fold(offset as i128, |acc, (i, s)| acc + *i as i128 * *s as i128);
        if pos < 0 || pos as u128 + item as u128 > payload.len() as u128 {
            return Err(Error::InvalidArray(Cow::Owned(format!(
                "strided element at byte {} is outside the {} byte block",
                pos,
                payload.len()
            ))));
        }
        let pos = pos as usize;
        out.extend_from_slice(&payload[pos..pos + item]);
        for d in (0..shape.len()).rev() {
            index[d] += 1;
            if index[d] < shape[d] {
                break;
            }
            index[d] = 0;
        }
    }
    Ok(out)
}

fn decode_elements<T: ArrayType>(dtype: DType, data: &[u8], order: ByteOrder) -> Result<Vec<T>> {
    if T::DTYPE != dtype {
        return Err(Error::InvalidArray(Cow::Owned(format!(
            "dtype mismatch: expected {}, got {}",
            T::DTYPE,
            dtype
        ))));
    }
    Ok(data
        .chunks_exact(dtype.element_size())
        .map(|chunk| T::read(chunk, order))
        .collect())
}

/// Compare two element buffers of the same dtype, honouring byte order
pub(crate) fn elements_equal(
    dtype: DType,
    a: &[u8],
    a_order: ByteOrder,
    b: &[u8],
    b_order: ByteOrder,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if a_order == b_order {
        return a == b;
    }
    let item = dtype.element_size();
    a.chunks_exact(item)
        .zip(b.chunks_exact(item))
        .all(|(x, y)| x.iter().eq(y.iter().rev()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_elements_encodes_little_endian() {
        let arr = Array::from_elements(vec![2], &[1u16, 0x0203]);
        assert_eq!(arr.dtype, DType::U16);
        assert_eq!(&arr.data[..], &[1, 0, 3, 2]);
        assert_eq!(arr.to_vec::<u16>().unwrap(), vec![1, 0x0203]);
    }

    #[test]
    fn validate_detects_size_mismatch() {
        let arr = Array::new(DType::F32, vec![2, 3], vec![0u8; 20]);
        assert!(matches!(arr.validate(), Err(Error::InvalidArray(_))));
        let arr = Array::new(DType::F32, vec![2, 3], vec![0u8; 24]);
        assert!(arr.validate().is_ok());
    }

    #[test]
    fn scalar_shape_has_one_element() {
        let arr = Array::from_elements(vec![], &[7i64]);
        assert_eq!(arr.num_elements(), 1);
        assert!(arr.validate().is_ok());
    }

    #[test]
    fn to_vec_rejects_wrong_type() {
        let arr = Array::from_elements(vec![3], &[1.0f32, 2.0, 3.0]);
        assert!(arr.to_vec::<f64>().is_err());
    }

    #[test]
    fn big_endian_to_vec() {
        let data: Vec<u8> = [1i32, -1].iter().flat_map(|v| v.to_be_bytes()).collect();
        let arr = Array::new(DType::I32, vec![2], data).with_byteorder(ByteOrder::Big);
        assert_eq!(arr.to_vec::<i32>().unwrap(), vec![1, -1]);
    }

    #[test]
    fn byte_size_detects_overflow() {
        assert_eq!(byte_size(&[2, 3], 8), Some(48));
        assert_eq!(byte_size(&[1 << 62, 8], 1), None);
        assert_eq!(byte_size(&[1 << 62, 8, 0], 4), Some(0));
        assert_eq!(byte_size(&[], 2), Some(2));
    }

    #[test]
    fn oversized_shape_saturates() {
        let arr = Array::new(DType::U8, vec![1 << 62, 8], vec![0u8; 4]);
        assert_eq!(arr.num_elements(), u64::MAX);
        assert_eq!(arr.expected_size(), u64::MAX);
        assert!(matches!(arr.validate(), Err(Error::InvalidArray(_))));
    }

    #[test]
    fn c_strides_row_major() {
        assert_eq!(c_strides(&[2, 3, 4], 8), vec![96, 32, 8]);
        assert_eq!(c_strides(&[], 4), Vec::<i64>::new());
    }

    #[test]
    fn gather_transposed_view() {
        // 2x3 u8 matrix read as its 3x2 transpose
        let payload = [0u8, 1, 2, 3, 4, 5];
        let out = gather(&payload, 0, &[3, 2], &[1, 3], 1).unwrap();
        assert_eq!(out, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn gather_negative_stride() {
        let payload = [10u8, 11, 12, 13];
        let out = gather(&payload, 3, &[4], &[-1], 1).unwrap();
        assert_eq!(out, vec![13, 12, 11, 10]);
    }

    #[test]
    fn gather_out_of_bounds() {
        let payload = [0u8; 4];
        assert!(gather(&payload, 2, &[2], &[2], 1).is_err());
    }

    #[test]
    fn elements_equal_across_byte_orders() {
        let le = 258u16.to_le_bytes();
        let be = 258u16.to_be_bytes();
        assert!(elements_equal(DType::U16, &le, ByteOrder::Little, &be, ByteOrder::Big));
        assert!(!elements_equal(DType::U16, &le, ByteOrder::Little, &le, ByteOrder::Big));
    }
}
