//! Error types for the runtime crate.

use thiserror::Error;

/// Runtime execution errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// GPU initialization failed.
    #[error("GPU initialization failed: {0}")]
    InitError(String),

    /// The plan failed structural validation.
    #[error("Invalid plan: {0}")]
    PlanError(#[from] vitrail_plan::PlanError),

    /// Reading the weight container failed.
    #[error("Weight container error: {0}")]
    WeightContainer(#[from] vitrail_safetensors::SafetensorsError),

    /// The plan references a weight the container does not hold.
    #[error("Missing weight tensor '{0}'")]
    MissingWeight(String),

    /// A weight's byte size does not match the plan's buffer slot.
    #[error("Weight '{name}' holds {actual} bytes but the plan expects {expected}")]
    WeightSizeMismatch {
        name: String,
        expected: u64,
        actual: usize,
    },

    /// The input tensor does not match the plan's input layout.
    #[error("Invalid input tensor: {0}")]
    InputError(String),

    /// Invalid tensor data access.
    #[error("Invalid tensor: {0}")]
    TensorError(String),

    /// Execution failed.
    #[error("Execution failed: {0}")]
    ExecutionError(String),

    /// Buffer async error.
    #[error("Buffer async error: {0}")]
    BufferAsyncError(#[from] wgpu::BufferAsyncError),
}

/// Specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
