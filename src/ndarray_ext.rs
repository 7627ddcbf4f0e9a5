//! ndarray integration for blobdoc arrays
//!
//! Conversions between [`Array`]/[`LazyArray`] and `ndarray::ArrayD`.
//!
//! Enable with the `ndarray` feature flag.

use crate::error::Error;
use crate::types::{Array, ArrayType, ByteOrder, DType, LazyArray};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use std::borrow::Cow;

/// Error type for ndarray conversions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdarrayError {
    /// DType mismatch between expected and actual
    DTypeMismatch { expected: DType, actual: DType },
    /// Shape doesn't match data length
    ShapeMismatch { shape: Vec<u64>, data_len: usize },
    /// Data is not properly aligned for the element type
    AlignmentError,
    /// Data is encoded in a byte order other than the host's
    ForeignByteOrder(ByteOrder),
    /// A bool8 byte other than 0 or 1
    InvalidBool,
}

impl std::fmt::Display for NdarrayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NdarrayError::DTypeMismatch { expected, actual } => {
                write!(f, "DType mismatch: expected {}, got {}", expected, actual)
            }
            NdarrayError::ShapeMismatch { shape, data_len } => {
                write!(
                    f,
                    "Shape {:?} doesn't match data length {}",
                    shape, data_len
                )
            }
            NdarrayError::AlignmentError => {
                write!(f, "Data is not properly aligned for element type")
            }
            NdarrayError::InvalidBool => write!(f, "bool8 data holds a byte other than 0 or 1"),
            NdarrayError::ForeignByteOrder(order) => {
                write!(
                    f,
                    "Data is {}-endian; use to_ndarray to convert it",
                    order.name()
                )
            }
        }
    }
}

impl std::error::Error for NdarrayError {}

impl From<NdarrayError> for Error {
    fn from(e: NdarrayError) -> Self {
        Error::InvalidArray(Cow::Owned(e.to_string()))
    }
}

fn dims(shape: &[u64]) -> Vec<usize> {
    shape.iter().map(|&d| d as usize).collect()
}

fn check_dtype<T: ArrayType>(actual: DType) -> Result<(), NdarrayError> {
    if T::DTYPE != actual {
        return Err(NdarrayError::DTypeMismatch {
            expected: T::DTYPE,
            actual,
        });
    }
    Ok(())
}

fn build<T: ArrayType>(
    shape: &[u64],
    data: &[u8],
    order: ByteOrder,
) -> Result<ArrayD<T>, NdarrayError> {
    let mismatch = || NdarrayError::ShapeMismatch {
        shape: shape.to_vec(),
        data_len: data.len(),
    };
    let size = T::DTYPE.element_size();
    let count: u64 = shape.iter().product();
    if count.checked_mul(size as u64) != Some(data.len() as u64) {
        return Err(mismatch());
    }
    let elements: Vec<T> = data
        .chunks_exact(size)
        .map(|chunk| T::read(chunk, order))
        .collect();
    ArrayD::from_shape_vec(IxDyn(&dims(shape)), elements).map_err(|_| mismatch())
}

// =============================================================================
// From ndarray to blobdoc
// =============================================================================

impl Array {
    /// Create an Array from an ndarray ArrayD
    ///
    /// Elements are taken in logical row-major order, so any memory layout is
    /// accepted. Data is encoded little-endian.
    pub fn from_ndarray<T: ArrayType>(arr: ArrayD<T>) -> Self {
        let shape: Vec<u64> = arr.shape().iter().map(|&d| d as u64).collect();
        let mut data = Vec::with_capacity(arr.len() * T::DTYPE.element_size());
        for v in arr.iter() {
            v.write(ByteOrder::Little, &mut data);
        }
        Array::new(T::DTYPE, shape, data)
    }

    // =========================================================================
    // From blobdoc to ndarray
    // =========================================================================

    /// Convert to an owned ndarray ArrayD, decoding the byte order
    pub fn to_ndarray<T: ArrayType>(&self) -> Result<ArrayD<T>, NdarrayError> {
        check_dtype::<T>(self.dtype)?;
        build(&self.shape, &self.data, self.byteorder)
    }

    /// Try to create a zero-copy ndarray view
    ///
    /// Fails when the data is not aligned for the element type or is not in the
    /// host byte order.
    pub fn try_as_ndarray<T: ArrayType>(&self) -> Result<ArrayViewD<'_, T>, NdarrayError> {
        check_dtype::<T>(self.dtype)?;
        if self.byteorder != ByteOrder::native() && T::DTYPE.element_size() > 1 {
            return Err(NdarrayError::ForeignByteOrder(self.byteorder));
        }

        let shape = dims(&self.shape);
        let count: usize = shape.iter().product();
        let expected_len = count * std::mem::size_of::<T>();
        if self.data.len() != expected_len {
            return Err(NdarrayError::ShapeMismatch {
                shape: self.shape.clone(),
                data_len: self.data.len(),
            });
        }

        if (self.data.as_ptr() as usize) % std::mem::align_of::<T>() != 0 {
            return Err(NdarrayError::AlignmentError);
        }
        if T::DTYPE == DType::Bool && self.data.iter().any(|&b| b > 1) {
            return Err(NdarrayError::InvalidBool);
        }

        // SAFETY:
        // - Alignment is checked above before the cast
        // - Length matches shape times element size
        // - ArrayType is implemented for primitives only; bool bytes are checked
        //   to be 0 or 1 above
        // - The view borrows self, which keeps the Arc'd buffer alive
        let slice = unsafe { std::slice::from_raw_parts(self.data.as_ptr() as *const T, count) };

        ArrayViewD::from_shape(IxDyn(&shape), slice).map_err(|_| NdarrayError::ShapeMismatch {
            shape: self.shape.clone(),
            data_len: self.data.len(),
        })
    }
}

impl LazyArray {
    /// Materialize the block and convert to an owned ndarray ArrayD
    ///
    /// Strided views are gathered first, so the result is always standard layout.
    pub fn to_ndarray<T: ArrayType>(&self) -> crate::error::Result<ArrayD<T>> {
        check_dtype::<T>(self.dtype)?;
        let data = self.data()?;
        Ok(build(&self.shape, &data, self.byteorder)?)
    }
}
