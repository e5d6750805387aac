//! Runtime initialization and GPU device management.

use crate::error::{Result, RuntimeError};
use crate::executor::PlanExecutor;
use std::sync::Arc;
use vitrail_plan::Plan;
use vitrail_safetensors::SafeTensors;

/// Main entry point for the GPU runtime.
///
/// Manages device initialization and loads frozen plans into executors.
///
/// # Example
/// ```no_run
/// # use vitrail_runtime::Runtime;
/// #[pollster::main]
/// async fn main() -> anyhow::Result<()> {
///     let runtime = Runtime::new().await?;
///     println!("GPU: {}", runtime.adapter_info().name);
///     Ok(())
/// }
/// ```
pub struct Runtime {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
}

impl Runtime {
    /// Initialize the runtime with the default GPU adapter.
    ///
    /// # Errors
    /// Returns an error if no suitable GPU is found or initialization fails.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| {
                RuntimeError::InitError(format!("Failed to find suitable GPU adapter: {e}"))
            })?;

        Self::with_adapter(&adapter).await
    }

    /// Initialize the runtime with a specific GPU adapter.
    ///
    /// # Errors
    /// Returns an error if device initialization fails.
    pub async fn with_adapter(adapter: &wgpu::Adapter) -> Result<Self> {
        let adapter_info = adapter.get_info();
        let adapter_limits = adapter.limits();

        // The decoder's largest activations exceed the 128 MB default
        // storage-binding limit, so request whatever the adapter offers.
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let device_desc = wgpu::DeviceDescriptor {
            label: Some("vitrail"),
            required_limits,
            ..Default::default()
        };

        let (device, queue) = adapter
            .request_device(&device_desc)
            .await
            .map_err(|e| RuntimeError::InitError(format!("Failed to create device: {e}")))?;

        tracing::debug!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "GPU device initialized"
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    /// Materialize a frozen plan into an executor.
    ///
    /// `weights` supplies the tensors referenced by the plan's weight slots;
    /// pass `None` for plans without weights (the latent quantization
    /// plans).
    ///
    /// # Errors
    /// Returns an error if the plan is invalid or a referenced weight is
    /// missing or mis-sized.
    pub fn load_plan(&self, plan: Plan, weights: Option<&SafeTensors>) -> Result<PlanExecutor> {
        PlanExecutor::new(
            Arc::clone(&self.device),
            Arc::clone(&self.queue),
            plan,
            weights,
        )
    }

    /// Get information about the GPU adapter.
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }
}
