//! Common test utilities for end-to-end GPU tests.
//!
//! Provides a shared runtime bootstrap that skips tests cleanly on machines
//! without a GPU adapter, plus helpers for building tiny plans and
//! in-memory weight containers.

use vitrail_plan::{BufferInit, BufferSlot, DataType, Pass, Plan, TensorDesc, kernel_table};
use vitrail_runtime::Runtime;
use vitrail_safetensors::SafeTensors;

/// Initialize a runtime, or skip the calling test when no GPU is available.
pub fn runtime_or_skip() -> Option<Runtime> {
    match pollster::block_on(Runtime::new()) {
        Ok(runtime) => Some(runtime),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

/// A zero-initialized buffer slot.
pub fn zeroed(label: &str, size: u64) -> BufferSlot {
    BufferSlot {
        label: label.to_string(),
        size,
        init: BufferInit::Zeroed,
    }
}

/// A weight buffer slot pulled from the test container.
pub fn weight(name: &str, size: u64) -> BufferSlot {
    BufferSlot {
        label: name.to_string(),
        size,
        init: BufferInit::Weight(name.to_string()),
    }
}

/// Assemble a test plan over the static kernel table.
pub fn test_plan(
    buffers: Vec<BufferSlot>,
    passes: Vec<Pass>,
    input: (usize, TensorDesc),
    output: (usize, TensorDesc),
) -> Plan {
    Plan {
        name: "test",
        kernels: kernel_table(),
        buffers,
        passes,
        input,
        output,
    }
}

/// Shorthand for an f32 tensor descriptor.
pub fn f32_desc(shape: &[usize]) -> TensorDesc {
    TensorDesc::new(shape, DataType::F32)
}

/// Build an in-memory safetensors container of f32 tensors.
pub fn f32_container(entries: &[(&str, &[usize], &[f32])]) -> SafeTensors {
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
    let mut raw = Vec::new();
    raw.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
    raw.extend_from_slice(&header_bytes);
    raw.extend_from_slice(&data);

    SafeTensors::from_bytes(raw).expect("test container is well-formed")
}
