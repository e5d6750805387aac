//! GPU dispatch driver for frozen Vitrail plans.
//!
//! This crate is the host side of the exported artifact: it owns GPU
//! buffer lifetime, builds bind groups, and issues the ordered sequence of
//! compute passes that forms the forward pass. It is deliberately a thin,
//! mechanical layer — no scheduling, no caching, no retry logic; one
//! linear command-buffer submission replaying a precomputed plan.
//!
//! # Architecture
//!
//! 1. **GPU initialization** — [`Runtime`] sets up the wgpu device/queue.
//! 2. **Materialization** — [`Runtime::load_plan`] turns a plan into
//!    pipelines, buffers (with weights uploaded from a safetensors
//!    container), baked parameter uniforms, and prebuilt bind groups.
//! 3. **Execution** — [`PlanExecutor::run`] writes the input, replays
//!    every pass, and reads the output back through a staging buffer.
//!
//! # Example
//!
//! ```no_run
//! use vitrail_plan::decoder_plan;
//! use vitrail_runtime::{Runtime, Tensor};
//! use vitrail_safetensors::SafeTensors;
//!
//! #[pollster::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::new().await?;
//!     let weights = SafeTensors::open("decoder.safetensors")?;
//!     let executor = runtime.load_plan(decoder_plan(), Some(&weights))?;
//!
//!     let latent = Tensor::from_vec(vec![0.0f32; 16_384], &[1, 4, 64, 64]);
//!     let image = executor.run(&latent)?;
//!     println!("decoded {:?} pixels", image.shape());
//!     Ok(())
//! }
//! ```

mod error;
mod executor;
mod runtime;
mod tensor;

pub use error::{Result, RuntimeError};
pub use executor::PlanExecutor;
pub use runtime::Runtime;
pub use tensor::Tensor;
