//! Baked per-pass parameter blocks.
//!
//! Each struct mirrors the uniform at binding 0 of the matching WGSL
//! kernel. The plan generators serialize these with `bytemuck` into the
//! pass's `params` bytes; the runtime uploads them verbatim. All structs
//! are padded to a 16-byte multiple.

use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Conv3x3Params {
    pub c_in: u32,
    pub c_out: u32,
    pub height: u32,
    pub width: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Conv1x1Params {
    pub c_in: u32,
    pub c_out: u32,
    pub height: u32,
    pub width: u32,
    pub input_scale: f32,
    pub _pad: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GroupNormStatsParams {
    pub channels: u32,
    pub spatial: u32,
    pub channels_per_group: u32,
    pub eps: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GroupNormApplyParams {
    pub channels: u32,
    pub spatial: u32,
    pub channels_per_group: u32,
    pub apply_swish: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AddParams {
    pub count: u32,
    pub _pad: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UpsampleParams {
    pub channels: u32,
    pub in_height: u32,
    pub in_width: u32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AttnScoresParams {
    pub channels: u32,
    pub tokens: u32,
    pub scale: f32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SoftmaxParams {
    pub tokens: u32,
    pub _pad: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AttnApplyParams {
    pub channels: u32,
    pub tokens: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ImageParams {
    pub height: u32,
    pub width: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct QuantParams {
    pub count: u32,
    pub qmin: f32,
    pub step: f32,
    pub _pad: u32,
}

/// Serialize a parameter block into pass bytes.
pub(crate) fn bake<P: Pod>(params: &P) -> Vec<u8> {
    bytemuck::bytes_of(params).to_vec()
}
