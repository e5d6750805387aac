//! Frozen execution plans for the Vitrail decoder artifact.
//!
//! This crate is the output side of a tensor-compiler export pipeline: a
//! fixed table of WGSL compute kernels plus generator functions that emit
//! the literal execution plan — buffer sizes, weight references, baked
//! parameter blocks, and dispatch dimensions — for one frozen model
//! topology (a latent-diffusion VAE decoder, latent `[1, 4, 64, 64]` to a
//! 512x512 RGBA8 image).
//!
//! There is no scheduler and no graph here. A [`Plan`] is plain data: a
//! linear sequence of [`Pass`] entries replayed in order by the runtime
//! crate.
//!
//! # Example
//!
//! ```
//! use vitrail_plan::decoder_plan;
//!
//! let plan = decoder_plan();
//! plan.validate().unwrap();
//! println!("{}: {} passes over {} buffers", plan.name, plan.passes.len(), plan.buffers.len());
//! ```

mod decoder;
mod latent;
mod params;
mod plan;
mod shaders;

pub use decoder::{
    GN_EPS, GN_GROUPS, IMAGE_SIZE, LATENT_CHANNELS, LATENT_SCALE, LATENT_SIZE, decoder_plan,
};
pub use latent::{
    LATENT_NUMEL, Q4_MIN, Q4_STEP, latent_pack_plan, latent_unpack_plan, pack_latent_q4,
    unpack_latent_q4,
};
pub use params::{
    AddParams, AttnApplyParams, AttnScoresParams, Conv1x1Params, Conv3x3Params,
    GroupNormApplyParams, GroupNormStatsParams, ImageParams, QuantParams, SoftmaxParams,
    UpsampleParams,
};
pub use plan::{
    BufferId, BufferInit, BufferSlot, DataType, KernelIndex, MAX_WORKGROUPS_PER_DIM, Pass, Plan,
    PlanError, Result, TensorDesc,
};
pub use shaders::{
    ADD, ATTN_APPLY, ATTN_SCORES, CONV2D_1X1, CONV2D_3X3, GROUP_NORM_APPLY, GROUP_NORM_STATS,
    KernelSource, LATENT_Q4_PACK, LATENT_Q4_UNPACK, SOFTMAX_ROWS, TO_IMAGE, UPSAMPLE_NEAREST2X,
    kernel_table,
};
