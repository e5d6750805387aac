//! Execution plan data model.
//!
//! A [`Plan`] is the frozen output of the export pipeline: buffers with
//! literal sizes, passes with literal dispatch dimensions and baked
//! parameter blocks, all referencing the static kernel table. The runtime
//! materializes these into GPU resources and replays the pass list as-is.

use crate::shaders::KernelSource;
use thiserror::Error;

/// Index into the kernel table.
pub type KernelIndex = usize;

/// Index into a plan's buffer list.
pub type BufferId = usize;

/// WebGPU limit on workgroup counts per dispatch dimension.
pub const MAX_WORKGROUPS_PER_DIM: u32 = 65_535;

/// Errors produced by plan validation.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Pass '{pass}' references kernel {kernel} but the table has {table_len} kernels")]
    InvalidKernelIndex {
        pass: String,
        kernel: KernelIndex,
        table_len: usize,
    },

    #[error("Pass '{pass}' references buffer {buffer} but the plan has {buffers_len} buffers")]
    InvalidBufferIndex {
        pass: String,
        buffer: BufferId,
        buffers_len: usize,
    },

    #[error("Pass '{pass}' binds {actual} buffers but kernel '{kernel}' expects {expected}")]
    BindingArityMismatch {
        pass: String,
        kernel: &'static str,
        expected: u32,
        actual: usize,
    },

    #[error("Pass '{pass}' carries {actual} parameter bytes but kernel '{kernel}' expects {expected}")]
    ParamsSizeMismatch {
        pass: String,
        kernel: &'static str,
        expected: u32,
        actual: usize,
    },

    #[error("Pass '{pass}' dispatches {workgroups:?}, outside 1..={MAX_WORKGROUPS_PER_DIM} per dimension")]
    WorkgroupsOutOfRange {
        pass: String,
        workgroups: [u32; 3],
    },

    #[error("Buffer '{buffer}' has size {size}, which is zero or not 4-byte aligned")]
    InvalidBufferSize { buffer: String, size: u64 },

    #[error("{endpoint} buffer {buffer} is missing or not a zero-initialized slot")]
    InvalidEndpoint {
        endpoint: &'static str,
        buffer: BufferId,
    },

    #[error(
        "{endpoint} buffer '{buffer}' holds {size} bytes but the declared tensor needs {expected}"
    )]
    EndpointSizeMismatch {
        endpoint: &'static str,
        buffer: String,
        size: u64,
        expected: u64,
    },
}

/// Result type for plan operations.
pub type Result<T> = std::result::Result<T, PlanError>;

/// Element type of a host-visible tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    F32,
    U32,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::F32 | DataType::U32 => 4,
        }
    }
}

/// Shape and dtype of a plan input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    pub shape: Vec<usize>,
    pub dtype: DataType,
}

impl TensorDesc {
    pub fn new(shape: &[usize], dtype: DataType) -> Self {
        Self {
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Total byte size.
    pub fn size_bytes(&self) -> u64 {
        (self.numel() * self.dtype.size()) as u64
    }
}

/// How a buffer slot is filled at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferInit {
    /// Allocated zeroed; written by passes (or by the host for the input).
    Zeroed,

    /// Uploaded from the named tensor in the safetensors container.
    Weight(String),
}

/// One GPU buffer in the plan, with its literal byte size.
#[derive(Debug, Clone)]
pub struct BufferSlot {
    pub label: String,
    pub size: u64,
    pub init: BufferInit,
}

/// One compute dispatch: kernel, buffer bindings, baked parameters, and
/// literal workgroup dimensions.
///
/// Binding order follows the exported artifact's convention: the params
/// uniform is binding 0 of the kernel, storage buffers follow with the
/// output buffer first, then inputs.
#[derive(Debug, Clone)]
pub struct Pass {
    pub label: String,
    pub kernel: KernelIndex,
    pub bindings: Vec<BufferId>,
    pub params: Vec<u8>,
    pub workgroups: [u32; 3],
}

/// A frozen execution plan.
#[derive(Debug)]
pub struct Plan {
    pub name: &'static str,

    /// The static kernel table the passes index into.
    pub kernels: &'static [KernelSource],

    /// All buffers, including the input and output slots.
    pub buffers: Vec<BufferSlot>,

    /// Compute passes in execution order.
    pub passes: Vec<Pass>,

    /// Host-written input buffer and its tensor layout.
    pub input: (BufferId, TensorDesc),

    /// Read-back output buffer and its tensor layout.
    pub output: (BufferId, TensorDesc),
}

impl Plan {
    /// Check the structural invariants of the plan.
    ///
    /// The generators in this crate always emit valid plans; this exists so
    /// tests and the runtime can fail loudly instead of tripping GPU
    /// validation errors later.
    pub fn validate(&self) -> Result<()> {
        for slot in &self.buffers {
            if slot.size == 0 || slot.size % 4 != 0 {
                return Err(PlanError::InvalidBufferSize {
                    buffer: slot.label.clone(),
                    size: slot.size,
                });
            }
        }

        for pass in &self.passes {
            let kernel = self.kernels.get(pass.kernel).ok_or_else(|| {
                PlanError::InvalidKernelIndex {
                    pass: pass.label.clone(),
                    kernel: pass.kernel,
                    table_len: self.kernels.len(),
                }
            })?;

            if pass.bindings.len() != kernel.bindings as usize {
                return Err(PlanError::BindingArityMismatch {
                    pass: pass.label.clone(),
                    kernel: kernel.label,
                    expected: kernel.bindings,
                    actual: pass.bindings.len(),
                });
            }
            for &binding in &pass.bindings {
                if binding >= self.buffers.len() {
                    return Err(PlanError::InvalidBufferIndex {
                        pass: pass.label.clone(),
                        buffer: binding,
                        buffers_len: self.buffers.len(),
                    });
                }
            }

            if pass.params.len() != kernel.params_size as usize {
                return Err(PlanError::ParamsSizeMismatch {
                    pass: pass.label.clone(),
                    kernel: kernel.label,
                    expected: kernel.params_size,
                    actual: pass.params.len(),
                });
            }

            if pass
                .workgroups
                .iter()
                .any(|&n| n == 0 || n > MAX_WORKGROUPS_PER_DIM)
            {
                return Err(PlanError::WorkgroupsOutOfRange {
                    pass: pass.label.clone(),
                    workgroups: pass.workgroups,
                });
            }
        }

        for (endpoint, (id, desc)) in [("Input", &self.input), ("Output", &self.output)] {
            let slot = self
                .buffers
                .get(*id)
                .filter(|slot| slot.init == BufferInit::Zeroed)
                .ok_or(PlanError::InvalidEndpoint {
                    endpoint,
                    buffer: *id,
                })?;
            if slot.size != desc.size_bytes() {
                return Err(PlanError::EndpointSizeMismatch {
                    endpoint,
                    buffer: slot.label.clone(),
                    size: slot.size,
                    expected: desc.size_bytes(),
                });
            }
        }

        Ok(())
    }

    /// Names of all weight tensors the plan pulls from the container.
    pub fn weight_names(&self) -> Vec<&str> {
        self.buffers
            .iter()
            .filter_map(|slot| match &slot.init {
                BufferInit::Weight(name) => Some(name.as_str()),
                BufferInit::Zeroed => None,
            })
            .collect()
    }

    /// Total bytes of all buffers (GPU residency of the loaded plan).
    pub fn total_buffer_bytes(&self) -> u64 {
        self.buffers.iter().map(|slot| slot.size).sum()
    }

    /// Largest single buffer in bytes.
    pub fn peak_buffer_bytes(&self) -> u64 {
        self.buffers.iter().map(|slot| slot.size).max().unwrap_or(0)
    }
}

/// Workgroup dimensions for a 1-D elementwise dispatch of `n` elements at
/// workgroup size 256, split over two dimensions when the count exceeds the
/// per-dimension limit.
pub(crate) fn elementwise_workgroups(n: usize) -> [u32; 3] {
    let groups = n.div_ceil(256);
    if groups <= MAX_WORKGROUPS_PER_DIM as usize {
        [groups as u32, 1, 1]
    } else {
        let x = 32_768usize;
        let y = groups.div_ceil(x);
        [x as u32, y as u32, 1]
    }
}
