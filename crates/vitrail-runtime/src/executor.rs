//! Execution of frozen plans.
//!
//! Materializes a [`Plan`] into GPU resources at load time — pipelines,
//! buffers, baked parameter uniforms, and prebuilt bind groups — then
//! replays the pass list into a single command-buffer submission per run.
//! There is nothing adaptive here: the plan fixed every size and dispatch
//! dimension at export time.

use crate::error::{Result, RuntimeError};
use crate::tensor::Tensor;
use std::borrow::Cow;
use std::sync::Arc;
use vitrail_plan::{BufferInit, Plan};
use vitrail_safetensors::SafeTensors;

/// A prepared compute dispatch: everything `run()` needs, resolved once.
#[derive(Debug)]
struct PreparedPass {
    label: String,
    kernel: usize,
    bind_group: wgpu::BindGroup,
    workgroups: [u32; 3],
}

/// Replays a frozen plan on the GPU.
#[derive(Debug)]
pub struct PlanExecutor {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    plan: Plan,

    /// One pipeline per kernel-table entry (same indexing as the table).
    pipelines: Vec<wgpu::ComputePipeline>,
    /// One GPU buffer per plan buffer slot (same indexing as the plan).
    buffers: Vec<wgpu::Buffer>,
    /// Passes with prebuilt bind groups, in plan order.
    passes: Vec<PreparedPass>,
}

impl PlanExecutor {
    /// Materialize a plan's GPU resources and upload its weights.
    pub(crate) fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        plan: Plan,
        weights: Option<&SafeTensors>,
    ) -> Result<Self> {
        plan.validate()?;

        let (pipelines, layouts) = create_pipelines(&device, &plan);
        let buffers = allocate_buffers(&device, &queue, &plan, weights)?;
        let passes = prepare_passes(&device, &queue, &plan, &layouts, &buffers);

        tracing::debug!(
            plan = plan.name,
            kernels = plan.kernels.len(),
            buffers = buffers.len(),
            passes = passes.len(),
            "plan materialized"
        );

        Ok(Self {
            device,
            queue,
            plan,
            pipelines,
            buffers,
            passes,
        })
    }

    /// Execute the plan on one input tensor and read back the output.
    ///
    /// All passes and the output copy are recorded into a single command
    /// buffer and submitted once.
    ///
    /// # Errors
    /// Returns an error if the input doesn't match the plan's declared
    /// layout or the GPU fails during execution or readback.
    pub fn run(&self, input: &Tensor) -> Result<Tensor> {
        let (input_id, input_desc) = &self.plan.input;
        if input.shape() != input_desc.shape || input.dtype() != input_desc.dtype {
            return Err(RuntimeError::InputError(format!(
                "expected {:?} {:?}, got {:?} {:?}",
                input_desc.shape,
                input_desc.dtype,
                input.shape(),
                input.dtype()
            )));
        }

        self.queue
            .write_buffer(&self.buffers[*input_id], 0, input.as_bytes());

        let (output_id, output_desc) = &self.plan.output;
        let output_size = output_desc.size_bytes();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(self.plan.name),
            });

        for pass in &self.passes {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&pass.label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipelines[pass.kernel]);
            compute_pass.set_bind_group(0, &pass.bind_group, &[]);
            compute_pass.dispatch_workgroups(
                pass.workgroups[0],
                pass.workgroups[1],
                pass.workgroups[2],
            );
        }

        encoder.copy_buffer_to_buffer(&self.buffers[*output_id], 0, &staging, 0, output_size);

        self.queue.submit(std::iter::once(encoder.finish()));
        tracing::debug!(plan = self.plan.name, passes = self.passes.len(), "submitted");

        let data = self.read_staging(&staging)?;
        Ok(Tensor::from_raw(
            data,
            &output_desc.shape,
            output_desc.dtype,
        ))
    }

    /// Map a staging buffer and copy its contents to host memory.
    fn read_staging(&self, staging: &wgpu::Buffer) -> Result<Vec<u8>> {
        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).ok();
        });

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| RuntimeError::ExecutionError(format!("GPU poll failed: {e:?}")))?;

        pollster::block_on(receiver)
            .map_err(|_| RuntimeError::ExecutionError("Failed to receive map result".to_string()))?
            .map_err(RuntimeError::BufferAsyncError)?;

        let data = slice.get_mapped_range();
        let result = data.to_vec();
        drop(data);
        staging.unmap();

        Ok(result)
    }

    /// The plan this executor replays.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }
}

/// Create one shader module, bind-group layout, and pipeline per kernel.
///
/// The layout is mechanical: the params uniform at binding 0, then the
/// kernel's storage buffers at bindings 1..
fn create_pipelines(
    device: &wgpu::Device,
    plan: &Plan,
) -> (Vec<wgpu::ComputePipeline>, Vec<wgpu::BindGroupLayout>) {
    let mut pipelines = Vec::with_capacity(plan.kernels.len());
    let mut layouts = Vec::with_capacity(plan.kernels.len());

    for kernel in plan.kernels {
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(kernel.wgsl)),
        });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for i in 0..kernel.bindings {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: i + 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{}_layout", kernel.label)),
                entries: &entries,
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}_pipeline_layout", kernel.label)),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.label),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some(kernel.entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        pipelines.push(pipeline);
        layouts.push(bind_group_layout);
    }

    (pipelines, layouts)
}

/// Allocate one GPU buffer per plan slot and upload weight data.
fn allocate_buffers(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    plan: &Plan,
    weights: Option<&SafeTensors>,
) -> Result<Vec<wgpu::Buffer>> {
    let mut buffers = Vec::with_capacity(plan.buffers.len());
    let mut weight_bytes = 0u64;

    for slot in &plan.buffers {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&slot.label),
            size: slot.size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        if let BufferInit::Weight(name) = &slot.init {
            let container =
                weights.ok_or_else(|| RuntimeError::MissingWeight(name.clone()))?;
            if !container.contains(name) {
                return Err(RuntimeError::MissingWeight(name.clone()));
            }
            let view = container.tensor(name)?;
            if view.data.len() as u64 != slot.size {
                return Err(RuntimeError::WeightSizeMismatch {
                    name: name.clone(),
                    expected: slot.size,
                    actual: view.data.len(),
                });
            }
            queue.write_buffer(&buffer, 0, view.data);
            weight_bytes += slot.size;
        }

        buffers.push(buffer);
    }

    tracing::debug!(
        plan = plan.name,
        total_bytes = plan.total_buffer_bytes(),
        weight_bytes,
        "buffers allocated"
    );

    Ok(buffers)
}

/// Upload each pass's baked parameters and prebuild its bind group.
fn prepare_passes(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    plan: &Plan,
    layouts: &[wgpu::BindGroupLayout],
    buffers: &[wgpu::Buffer],
) -> Vec<PreparedPass> {
    plan.passes
        .iter()
        .map(|pass| {
            let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{}_params", pass.label)),
                size: pass.params.len() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            // Baked at plan-generation time; never written again.
            queue.write_buffer(&params_buffer, 0, &pass.params);

            let mut entries = vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }];
            for (i, &buffer_id) in pass.bindings.iter().enumerate() {
                entries.push(wgpu::BindGroupEntry {
                    binding: (i + 1) as u32,
                    resource: buffers[buffer_id].as_entire_binding(),
                });
            }

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&pass.label),
                layout: &layouts[pass.kernel],
                entries: &entries,
            });

            PreparedPass {
                label: pass.label.clone(),
                kernel: pass.kernel,
                bind_group,
                workgroups: pass.workgroups,
            }
        })
        .collect()
}
