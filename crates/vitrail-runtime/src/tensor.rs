//! User-facing tensor type for CPU/GPU data interchange.

use crate::error::{Result, RuntimeError};
use bytemuck::Pod;
use vitrail_plan::DataType;

/// User-facing tensor for input/output data.
///
/// Holds host memory only; the runtime uploads and downloads the bytes.
#[derive(Debug, Clone)]
pub struct Tensor {
    data: Vec<u8>,
    shape: Vec<usize>,
    dtype: DataType,
}

impl Tensor {
    /// Create a tensor from a vector with a given shape.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the shape product.
    pub fn from_vec<T: Pod>(data: Vec<T>, shape: &[usize]) -> Self {
        let expected_len: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_len,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_len
        );

        Self {
            data: bytemuck::cast_slice(&data).to_vec(),
            shape: shape.to_vec(),
            dtype: Self::infer_dtype::<T>(),
        }
    }

    /// Create a tensor from raw bytes.
    pub(crate) fn from_raw(data: Vec<u8>, shape: &[usize], dtype: DataType) -> Self {
        Self {
            data,
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Get a slice view of the tensor data.
    ///
    /// # Errors
    /// Returns an error if the element type size doesn't match or the byte
    /// buffer is not aligned for `T`.
    pub fn as_slice<T: Pod>(&self) -> Result<&[T]> {
        if std::mem::size_of::<T>() * self.len() != self.data.len() {
            return Err(RuntimeError::TensorError("Type size mismatch".to_string()));
        }
        bytemuck::try_cast_slice(&self.data)
            .map_err(|e| RuntimeError::TensorError(format!("Cast failed: {e}")))
    }

    /// Convert tensor contents to a Vec.
    ///
    /// Unlike [`Tensor::as_slice`], this copies and therefore accepts byte
    /// buffers that are not aligned for `T`.
    pub fn to_vec<T: Pod>(&self) -> Result<Vec<T>> {
        if std::mem::size_of::<T>() * self.len() != self.data.len() {
            return Err(RuntimeError::TensorError("Type size mismatch".to_string()));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    /// Raw bytes of the tensor data (uploaded verbatim to the GPU).
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element data type.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if the tensor is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn infer_dtype<T: Pod>() -> DataType {
        let type_name = std::any::type_name::<T>();
        if type_name.contains("u32") {
            DataType::U32
        } else {
            // The artifact only moves f32 and packed-u32 data.
            DataType::F32
        }
    }
}
