//! Safetensors container parsing for Vitrail.
//!
//! A safetensors file is a `u64` little-endian header length, a JSON header
//! mapping tensor names to `{dtype, shape, data_offsets}`, and a flat data
//! region. `data_offsets` are byte ranges relative to the start of the data
//! region.
//!
//! # Example
//!
//! ```no_run
//! use vitrail_safetensors::SafeTensors;
//!
//! # fn main() -> Result<(), vitrail_safetensors::SafetensorsError> {
//! let weights = SafeTensors::open("decoder.safetensors")?;
//!
//! let view = weights.tensor("decoder.conv_in.weight")?;
//! println!("{}: {:?} {:?}", view.name, view.dtype, view.shape);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Maximum accepted header size in bytes.
///
/// A corrupt or hostile file could otherwise declare a multi-gigabyte
/// header and stall the JSON parser before any tensor data is touched.
pub const MAX_HEADER_SIZE: u64 = 100_000_000;

/// Errors that can occur when loading or reading a safetensors container.
#[derive(Debug, Error)]
pub enum SafetensorsError {
    #[error("Failed to read safetensors file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Buffer too short for safetensors container: {len} bytes (need at least 8)")]
    TooShort { len: usize },

    #[error("Header size {size} exceeds maximum of {MAX_HEADER_SIZE} bytes")]
    HeaderTooLarge { size: u64 },

    #[error("Header size {size} overruns buffer of {len} bytes")]
    HeaderOverrun { size: u64, len: usize },

    #[error("Failed to parse safetensors header: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid header entry for tensor '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("Unsupported dtype '{0}'")]
    UnsupportedDtype(String),

    #[error(
        "Tensor '{name}' spans {actual} bytes but shape {shape:?} with dtype {dtype:?} \
         requires {expected}"
    )]
    SizeMismatch {
        name: String,
        shape: Vec<usize>,
        dtype: Dtype,
        expected: usize,
        actual: usize,
    },

    #[error("Tensor '{name}' offsets {begin}..{end} fall outside data region of {data_len} bytes")]
    OffsetsOutOfRange {
        name: String,
        begin: usize,
        end: usize,
        data_len: usize,
    },

    #[error("Tensor not found: {0}")]
    TensorNotFound(String),
}

/// Result type for safetensors operations.
pub type Result<T> = std::result::Result<T, SafetensorsError>;

/// Element data type of a stored tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    F64,
    F32,
    F16,
    BF16,
    I64,
    I32,
    I16,
    I8,
    U8,
    Bool,
}

impl Dtype {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Dtype::F64 | Dtype::I64 => 8,
            Dtype::F32 | Dtype::I32 => 4,
            Dtype::F16 | Dtype::BF16 | Dtype::I16 => 2,
            Dtype::I8 | Dtype::U8 | Dtype::Bool => 1,
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "F64" => Ok(Dtype::F64),
            "F32" => Ok(Dtype::F32),
            "F16" => Ok(Dtype::F16),
            "BF16" => Ok(Dtype::BF16),
            "I64" => Ok(Dtype::I64),
            "I32" => Ok(Dtype::I32),
            "I16" => Ok(Dtype::I16),
            "I8" => Ok(Dtype::I8),
            "U8" => Ok(Dtype::U8),
            "BOOL" => Ok(Dtype::Bool),
            other => Err(SafetensorsError::UnsupportedDtype(other.to_string())),
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dtype::F64 => "F64",
            Dtype::F32 => "F32",
            Dtype::F16 => "F16",
            Dtype::BF16 => "BF16",
            Dtype::I64 => "I64",
            Dtype::I32 => "I32",
            Dtype::I16 => "I16",
            Dtype::I8 => "I8",
            Dtype::U8 => "U8",
            Dtype::Bool => "BOOL",
        };
        write!(f, "{s}")
    }
}

/// Metadata for one tensor in the container.
#[derive(Debug, Clone)]
pub struct TensorMeta {
    /// Element type.
    pub dtype: Dtype,

    /// Dimensions in row-major order.
    pub shape: Vec<usize>,

    /// Byte range relative to the start of the data region.
    pub data_offsets: (usize, usize),
}

impl TensorMeta {
    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Total byte size implied by shape and dtype.
    pub fn size_bytes(&self) -> usize {
        self.numel() * self.dtype.size()
    }
}

/// A borrowed view of one tensor's metadata and raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub name: &'a str,
    pub dtype: Dtype,
    pub shape: &'a [usize],
    pub data: &'a [u8],
}

/// A parsed safetensors container owning the underlying buffer.
#[derive(Debug)]
pub struct SafeTensors {
    raw: Vec<u8>,
    data_start: usize,
    tensors: HashMap<String, TensorMeta>,
    names: Vec<String>,
}

impl SafeTensors {
    /// Read a safetensors file from disk and parse it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read(path)?;
        Self::from_bytes(raw)
    }

    /// Parse a safetensors container from an owned buffer.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        if raw.len() < 8 {
            return Err(SafetensorsError::TooShort { len: raw.len() });
        }

        let header_size = u64::from_le_bytes(raw[0..8].try_into().expect("slice is 8 bytes"));
        if header_size > MAX_HEADER_SIZE {
            return Err(SafetensorsError::HeaderTooLarge { size: header_size });
        }
        let data_start = 8usize
            .checked_add(header_size as usize)
            .filter(|&end| end <= raw.len())
            .ok_or(SafetensorsError::HeaderOverrun {
                size: header_size,
                len: raw.len(),
            })?;

        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&raw[8..data_start])?;

        let data_len = raw.len() - data_start;
        let mut tensors = HashMap::with_capacity(header.len());
        let mut names = Vec::with_capacity(header.len());

        for (name, value) in &header {
            // The "__metadata__" entry carries free-form strings, not a tensor.
            if name == "__metadata__" {
                continue;
            }

            let meta = parse_entry(name, value)?;
            let (begin, end) = meta.data_offsets;
            if begin > end || end > data_len {
                return Err(SafetensorsError::OffsetsOutOfRange {
                    name: name.clone(),
                    begin,
                    end,
                    data_len,
                });
            }
            if end - begin != meta.size_bytes() {
                return Err(SafetensorsError::SizeMismatch {
                    name: name.clone(),
                    shape: meta.shape.clone(),
                    dtype: meta.dtype,
                    expected: meta.size_bytes(),
                    actual: end - begin,
                });
            }

            names.push(name.clone());
            tensors.insert(name.clone(), meta);
        }

        Ok(Self {
            raw,
            data_start,
            tensors,
            names,
        })
    }

    /// Look up a tensor by name.
    pub fn tensor(&self, name: &str) -> Result<TensorView<'_>> {
        let (name, meta) = self
            .tensors
            .get_key_value(name)
            .ok_or_else(|| SafetensorsError::TensorNotFound(name.to_string()))?;

        let (begin, end) = meta.data_offsets;
        Ok(TensorView {
            name: name.as_str(),
            dtype: meta.dtype,
            shape: &meta.shape,
            data: &self.raw[self.data_start + begin..self.data_start + end],
        })
    }

    /// Metadata for a tensor by name, if present.
    pub fn meta(&self, name: &str) -> Option<&TensorMeta> {
        self.tensors.get(name)
    }

    /// Check whether a tensor exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Tensor names in header order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of tensors in the container.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the container holds no tensors.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Iterate over all tensors in header order.
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'_>> {
        self.names
            .iter()
            .map(|name| self.tensor(name).expect("name indexes a parsed tensor"))
    }

    /// Total size of the data region in bytes.
    pub fn data_len(&self) -> usize {
        self.raw.len() - self.data_start
    }
}

fn parse_entry(name: &str, value: &serde_json::Value) -> Result<TensorMeta> {
    let invalid = |reason: &str| SafetensorsError::InvalidEntry {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let obj = value.as_object().ok_or_else(|| invalid("not an object"))?;

    let dtype_str = obj
        .get("dtype")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("missing dtype"))?;
    let dtype = Dtype::parse(dtype_str)?;

    let shape = obj
        .get("shape")
        .and_then(|v| v.as_array())
        .ok_or_else(|| invalid("missing shape"))?
        .iter()
        .map(|d| d.as_u64().map(|d| d as usize))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| invalid("shape contains a non-integer dimension"))?;

    let offsets = obj
        .get("data_offsets")
        .and_then(|v| v.as_array())
        .ok_or_else(|| invalid("missing data_offsets"))?;
    if offsets.len() != 2 {
        return Err(invalid("data_offsets must have exactly two entries"));
    }
    let begin = offsets[0]
        .as_u64()
        .ok_or_else(|| invalid("data_offsets begin is not an integer"))? as usize;
    let end = offsets[1]
        .as_u64()
        .ok_or_else(|| invalid("data_offsets end is not an integer"))? as usize;

    Ok(TensorMeta {
        dtype,
        shape,
        data_offsets: (begin, end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal container from (name, shape, values) triples.
    fn build_container(entries: &[(&str, &[usize], &[f32])]) -> Vec<u8> {
        let mut header = serde_json::Map::new();
        let mut data = Vec::new();
        for (name, shape, values) in entries {
            let begin = data.len();
            for v in *values {
                data.extend_from_slice(&v.to_le_bytes());
            }
            header.insert(
                name.to_string(),
                serde_json::json!({
                    "dtype": "F32",
                    "shape": shape,
                    "data_offsets": [begin, data.len()],
                }),
            );
        }

        let header_bytes = serde_json::to_vec(&serde_json::Value::Object(header)).unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&data);
        out
    }

    #[test]
    fn test_parse_and_read_tensors() {
        let raw = build_container(&[
            ("alpha", &[2, 2], &[1.0, 2.0, 3.0, 4.0]),
            ("beta", &[3], &[5.0, 6.0, 7.0]),
        ]);

        let st = SafeTensors::from_bytes(raw).unwrap();
        assert_eq!(st.len(), 2);
        assert!(st.contains("alpha"));

        let view = st.tensor("alpha").unwrap();
        assert_eq!(view.dtype, Dtype::F32);
        assert_eq!(view.shape, &[2, 2]);
        let values: Vec<f32> = view
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);

        let beta = st.tensor("beta").unwrap();
        assert_eq!(beta.shape, &[3]);
        assert_eq!(beta.data.len(), 12);
    }

    #[test]
    fn test_metadata_entry_is_skipped() {
        let mut header = serde_json::Map::new();
        header.insert(
            "__metadata__".to_string(),
            serde_json::json!({"format": "pt"}),
        );
        header.insert(
            "w".to_string(),
            serde_json::json!({"dtype": "F32", "shape": [1], "data_offsets": [0, 4]}),
        );
        let header_bytes = serde_json::to_vec(&serde_json::Value::Object(header)).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
        raw.extend_from_slice(&header_bytes);
        raw.extend_from_slice(&1.0f32.to_le_bytes());

        let st = SafeTensors::from_bytes(raw).unwrap();
        assert_eq!(st.len(), 1);
        assert!(st.tensor("__metadata__").is_err());
        assert!(st.tensor("w").is_ok());
    }

    #[test]
    fn test_too_short() {
        let err = SafeTensors::from_bytes(vec![0u8; 4]).unwrap_err();
        assert!(matches!(err, SafetensorsError::TooShort { len: 4 }));
    }

    #[test]
    fn test_header_too_large() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(MAX_HEADER_SIZE + 1).to_le_bytes());
        raw.extend_from_slice(&[0u8; 16]);
        let err = SafeTensors::from_bytes(raw).unwrap_err();
        assert!(matches!(err, SafetensorsError::HeaderTooLarge { .. }));
    }

    #[test]
    fn test_header_overruns_buffer() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1000u64.to_le_bytes());
        raw.extend_from_slice(b"{}");
        let err = SafeTensors::from_bytes(raw).unwrap_err();
        assert!(matches!(err, SafetensorsError::HeaderOverrun { .. }));
    }

    #[test]
    fn test_offsets_out_of_range() {
        let header = serde_json::json!({
            "w": {"dtype": "F32", "shape": [4], "data_offsets": [0, 16]}
        });
        let header_bytes = serde_json::to_vec(&header).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
        raw.extend_from_slice(&header_bytes);
        raw.extend_from_slice(&[0u8; 8]); // only 8 bytes of data, header claims 16
        let err = SafeTensors::from_bytes(raw).unwrap_err();
        assert!(matches!(err, SafetensorsError::OffsetsOutOfRange { .. }));
    }

    #[test]
    fn test_size_mismatch() {
        let header = serde_json::json!({
            "w": {"dtype": "F32", "shape": [4], "data_offsets": [0, 8]}
        });
        let header_bytes = serde_json::to_vec(&header).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
        raw.extend_from_slice(&header_bytes);
        raw.extend_from_slice(&[0u8; 8]);
        let err = SafeTensors::from_bytes(raw).unwrap_err();
        assert!(matches!(err, SafetensorsError::SizeMismatch { .. }));
    }

    #[test]
    fn test_unsupported_dtype() {
        let header = serde_json::json!({
            "w": {"dtype": "F4_E2M1", "shape": [2], "data_offsets": [0, 1]}
        });
        let header_bytes = serde_json::to_vec(&header).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
        raw.extend_from_slice(&header_bytes);
        raw.push(0);
        let err = SafeTensors::from_bytes(raw).unwrap_err();
        assert!(matches!(err, SafetensorsError::UnsupportedDtype(_)));
    }

    #[test]
    fn test_tensor_not_found() {
        let raw = build_container(&[("w", &[1], &[0.5])]);
        let st = SafeTensors::from_bytes(raw).unwrap();
        let err = st.tensor("missing").unwrap_err();
        assert!(matches!(err, SafetensorsError::TensorNotFound(_)));
    }

    #[test]
    fn test_iter_in_header_order() {
        let raw = build_container(&[("a", &[1], &[1.0]), ("b", &[1], &[2.0])]);
        let st = SafeTensors::from_bytes(raw).unwrap();
        let names: Vec<&str> = st.iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
