//! The frozen decoder plan.
//!
//! Emits the fixed forward pass of the VAE decoder for one topology:
//! latent `[1, 4, 64, 64]` f32 to a 512x512 packed-RGBA8 image. Every
//! buffer size, weight reference, parameter block, and dispatch dimension
//! in the emitted [`Plan`] is a literal derived from the frozen shapes.
//!
//! Intermediate activations are drawn from a size-keyed free pool so the
//! plan reuses a small set of numbered slots across its 122 passes rather
//! than allocating one buffer per tensor.

use crate::params::{
    AddParams, AttnApplyParams, AttnScoresParams, Conv1x1Params, Conv3x3Params,
    GroupNormApplyParams, GroupNormStatsParams, ImageParams, SoftmaxParams, UpsampleParams, bake,
};
use crate::plan::{
    BufferId, BufferInit, BufferSlot, DataType, Pass, Plan, TensorDesc, elementwise_workgroups,
};
use crate::shaders::{self, kernel_table};
use std::collections::HashMap;

/// Channels of the latent input.
pub const LATENT_CHANNELS: usize = 4;

/// Spatial extent of the latent input.
pub const LATENT_SIZE: usize = 64;

/// Spatial extent of the decoded image.
pub const IMAGE_SIZE: usize = 512;

/// Latent pre-scale folded into the first convolution.
pub const LATENT_SCALE: f32 = 1.0 / 0.18215;

/// Group count of every group normalization in the decoder.
pub const GN_GROUPS: u32 = 32;

/// Epsilon of every group normalization in the decoder.
pub const GN_EPS: f32 = 1e-6;

const MID_CHANNELS: usize = 512;
const OUT_CHANNELS: usize = 3;

/// Up-sampling stages in execution order: (checkpoint level, channels).
/// Levels 3..1 are followed by a 2x upsample; level 0 is not.
const UP_STAGES: [(usize, usize); 4] = [(3, 512), (2, 512), (1, 256), (0, 128)];

/// Build the frozen decoder plan.
pub fn decoder_plan() -> Plan {
    let mut b = PlanBuilder::new();

    let latent = b.named("latent", (LATENT_CHANNELS * LATENT_SIZE * LATENT_SIZE * 4) as u64);

    let scaled = b.conv1x1(
        latent,
        LATENT_CHANNELS,
        LATENT_CHANNELS,
        LATENT_SIZE,
        LATENT_SIZE,
        LATENT_SCALE,
        "post_quant_conv",
    );
    let mut cur = b.conv3x3(
        scaled,
        LATENT_CHANNELS,
        MID_CHANNELS,
        LATENT_SIZE,
        LATENT_SIZE,
        "decoder.conv_in",
    );
    b.release(scaled);

    cur = b.resnet_block(
        cur,
        MID_CHANNELS,
        MID_CHANNELS,
        LATENT_SIZE,
        LATENT_SIZE,
        "decoder.mid.block_1",
    );
    cur = b.attn_block(cur, MID_CHANNELS, LATENT_SIZE, LATENT_SIZE, "decoder.mid.attn_1");
    cur = b.resnet_block(
        cur,
        MID_CHANNELS,
        MID_CHANNELS,
        LATENT_SIZE,
        LATENT_SIZE,
        "decoder.mid.block_2",
    );

    let mut channels = MID_CHANNELS;
    let mut res = LATENT_SIZE;
    for (level, out_ch) in UP_STAGES {
        for block in 0..3 {
            cur = b.resnet_block(
                cur,
                channels,
                out_ch,
                res,
                res,
                &format!("decoder.up.{level}.block.{block}"),
            );
            channels = out_ch;
        }
        if level != 0 {
            cur = b.upsample(cur, channels, res, res, &format!("decoder.up.{level}.upsample"));
            res *= 2;
        }
    }

    let normed = b.group_norm(cur, channels, res * res, "decoder.norm_out", true);
    b.release(cur);
    let rgb = b.conv3x3(normed, channels, OUT_CHANNELS, res, res, "decoder.conv_out");
    b.release(normed);

    let image = b.named("image", (res * res * 4) as u64);
    b.pass(
        "to_image".to_string(),
        shaders::TO_IMAGE,
        vec![image, rgb],
        bake(&ImageParams {
            height: res as u32,
            width: res as u32,
            _pad: [0; 2],
        }),
        elementwise_workgroups(res * res),
    );
    b.release(rgb);

    Plan {
        name: "decoder",
        kernels: kernel_table(),
        buffers: b.buffers,
        passes: b.passes,
        input: (
            latent,
            TensorDesc::new(
                &[1, LATENT_CHANNELS, LATENT_SIZE, LATENT_SIZE],
                DataType::F32,
            ),
        ),
        output: (image, TensorDesc::new(&[IMAGE_SIZE, IMAGE_SIZE], DataType::U32)),
    }
}

/// Accumulates buffers and passes while a plan is generated.
pub(crate) struct PlanBuilder {
    pub buffers: Vec<BufferSlot>,
    pub passes: Vec<Pass>,
    free: HashMap<u64, Vec<BufferId>>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            passes: Vec::new(),
            free: HashMap::new(),
        }
    }

    /// A dedicated slot that never returns to the pool (plan endpoints).
    pub fn named(&mut self, label: &str, size: u64) -> BufferId {
        let id = self.buffers.len();
        self.buffers.push(BufferSlot {
            label: label.to_string(),
            size,
            init: BufferInit::Zeroed,
        });
        id
    }

    /// Acquire an intermediate slot, reusing a released slot of equal size.
    fn acquire(&mut self, size: u64) -> BufferId {
        if let Some(id) = self.free.get_mut(&size).and_then(|pool| pool.pop()) {
            return id;
        }
        let id = self.buffers.len();
        self.buffers.push(BufferSlot {
            label: format!("buf_{id}"),
            size,
            init: BufferInit::Zeroed,
        });
        id
    }

    /// Return an intermediate slot to the pool once its last reader ran.
    pub fn release(&mut self, id: BufferId) {
        let size = self.buffers[id].size;
        self.free.entry(size).or_default().push(id);
    }

    fn weight(&mut self, name: String, size: u64) -> BufferId {
        let id = self.buffers.len();
        self.buffers.push(BufferSlot {
            label: name.clone(),
            size,
            init: BufferInit::Weight(name),
        });
        id
    }

    pub fn pass(
        &mut self,
        label: String,
        kernel: usize,
        bindings: Vec<BufferId>,
        params: Vec<u8>,
        workgroups: [u32; 3],
    ) {
        self.passes.push(Pass {
            label,
            kernel,
            bindings,
            params,
            workgroups,
        });
    }

    fn conv3x3(
        &mut self,
        src: BufferId,
        c_in: usize,
        c_out: usize,
        h: usize,
        w: usize,
        prefix: &str,
    ) -> BufferId {
        let weight = self.weight(format!("{prefix}.weight"), (c_out * c_in * 9 * 4) as u64);
        let bias = self.weight(format!("{prefix}.bias"), (c_out * 4) as u64);
        let dst = self.acquire((c_out * h * w * 4) as u64);
        self.pass(
            prefix.to_string(),
            shaders::CONV2D_3X3,
            vec![dst, src, weight, bias],
            bake(&Conv3x3Params {
                c_in: c_in as u32,
                c_out: c_out as u32,
                height: h as u32,
                width: w as u32,
            }),
            [w.div_ceil(8) as u32, h.div_ceil(8) as u32, c_out as u32],
        );
        dst
    }

    fn conv1x1(
        &mut self,
        src: BufferId,
        c_in: usize,
        c_out: usize,
        h: usize,
        w: usize,
        input_scale: f32,
        prefix: &str,
    ) -> BufferId {
        let weight = self.weight(format!("{prefix}.weight"), (c_out * c_in * 4) as u64);
        let bias = self.weight(format!("{prefix}.bias"), (c_out * 4) as u64);
        let dst = self.acquire((c_out * h * w * 4) as u64);
        self.pass(
            prefix.to_string(),
            shaders::CONV2D_1X1,
            vec![dst, src, weight, bias],
            bake(&Conv1x1Params {
                c_in: c_in as u32,
                c_out: c_out as u32,
                height: h as u32,
                width: w as u32,
                input_scale,
                _pad: [0; 3],
            }),
            [w.div_ceil(8) as u32, h.div_ceil(8) as u32, c_out as u32],
        );
        dst
    }

    /// Group norm: stats pass + apply pass. Does not consume `src`.
    fn group_norm(
        &mut self,
        src: BufferId,
        channels: usize,
        spatial: usize,
        prefix: &str,
        swish: bool,
    ) -> BufferId {
        let channels_per_group = channels / GN_GROUPS as usize;
        let stats = self.acquire((2 * GN_GROUPS as usize * 4) as u64);
        self.pass(
            format!("{prefix}.stats"),
            shaders::GROUP_NORM_STATS,
            vec![stats, src],
            bake(&GroupNormStatsParams {
                channels: channels as u32,
                spatial: spatial as u32,
                channels_per_group: channels_per_group as u32,
                eps: GN_EPS,
            }),
            [GN_GROUPS, 1, 1],
        );

        let gamma = self.weight(format!("{prefix}.weight"), (channels * 4) as u64);
        let beta = self.weight(format!("{prefix}.bias"), (channels * 4) as u64);
        let dst = self.acquire((channels * spatial * 4) as u64);
        self.pass(
            prefix.to_string(),
            shaders::GROUP_NORM_APPLY,
            vec![dst, src, stats, gamma, beta],
            bake(&GroupNormApplyParams {
                channels: channels as u32,
                spatial: spatial as u32,
                channels_per_group: channels_per_group as u32,
                apply_swish: swish as u32,
            }),
            elementwise_workgroups(channels * spatial),
        );
        self.release(stats);
        dst
    }

    fn add(&mut self, a: BufferId, b: BufferId, count: usize, label: &str) -> BufferId {
        let dst = self.acquire((count * 4) as u64);
        self.pass(
            label.to_string(),
            shaders::ADD,
            vec![dst, a, b],
            bake(&AddParams {
                count: count as u32,
                _pad: [0; 3],
            }),
            elementwise_workgroups(count),
        );
        dst
    }

    /// ResNet block. Consumes `x`.
    fn resnet_block(
        &mut self,
        x: BufferId,
        c_in: usize,
        c_out: usize,
        h: usize,
        w: usize,
        prefix: &str,
    ) -> BufferId {
        let spatial = h * w;

        let h1 = self.group_norm(x, c_in, spatial, &format!("{prefix}.norm1"), true);
        let h2 = self.conv3x3(h1, c_in, c_out, h, w, &format!("{prefix}.conv1"));
        self.release(h1);
        let h3 = self.group_norm(h2, c_out, spatial, &format!("{prefix}.norm2"), true);
        self.release(h2);
        let h4 = self.conv3x3(h3, c_out, c_out, h, w, &format!("{prefix}.conv2"));
        self.release(h3);

        let shortcut = if c_in != c_out {
            let s = self.conv1x1(x, c_in, c_out, h, w, 1.0, &format!("{prefix}.nin_shortcut"));
            self.release(x);
            s
        } else {
            x
        };

        let out = self.add(h4, shortcut, c_out * spatial, &format!("{prefix}.residual"));
        self.release(h4);
        self.release(shortcut);
        out
    }

    /// Single-head spatial attention block. Consumes `x`.
    fn attn_block(
        &mut self,
        x: BufferId,
        channels: usize,
        h: usize,
        w: usize,
        prefix: &str,
    ) -> BufferId {
        let tokens = h * w;

        let hn = self.group_norm(x, channels, tokens, &format!("{prefix}.norm"), false);
        let q = self.conv1x1(hn, channels, channels, h, w, 1.0, &format!("{prefix}.q"));
        let k = self.conv1x1(hn, channels, channels, h, w, 1.0, &format!("{prefix}.k"));
        let v = self.conv1x1(hn, channels, channels, h, w, 1.0, &format!("{prefix}.v"));
        self.release(hn);

        let scores = self.acquire((tokens * tokens * 4) as u64);
        self.pass(
            format!("{prefix}.scores"),
            shaders::ATTN_SCORES,
            vec![scores, q, k],
            bake(&AttnScoresParams {
                channels: channels as u32,
                tokens: tokens as u32,
                scale: (channels as f32).powf(-0.5),
                _pad: 0,
            }),
            [tokens.div_ceil(16) as u32, tokens.div_ceil(16) as u32, 1],
        );
        self.release(q);
        self.release(k);

        let probs = self.acquire((tokens * tokens * 4) as u64);
        self.pass(
            format!("{prefix}.softmax"),
            shaders::SOFTMAX_ROWS,
            vec![probs, scores],
            bake(&SoftmaxParams {
                tokens: tokens as u32,
                _pad: [0; 3],
            }),
            [tokens as u32, 1, 1],
        );
        self.release(scores);

        let attn = self.acquire((channels * tokens * 4) as u64);
        self.pass(
            format!("{prefix}.apply"),
            shaders::ATTN_APPLY,
            vec![attn, probs, v],
            bake(&AttnApplyParams {
                channels: channels as u32,
                tokens: tokens as u32,
                _pad: [0; 2],
            }),
            [tokens.div_ceil(16) as u32, channels.div_ceil(16) as u32, 1],
        );
        self.release(probs);
        self.release(v);

        let proj = self.conv1x1(attn, channels, channels, h, w, 1.0, &format!("{prefix}.proj_out"));
        self.release(attn);

        let out = self.add(x, proj, channels * tokens, &format!("{prefix}.residual"));
        self.release(x);
        self.release(proj);
        out
    }

    /// Nearest 2x upsample followed by a 3x3 convolution. Consumes `x`.
    fn upsample(
        &mut self,
        x: BufferId,
        channels: usize,
        h: usize,
        w: usize,
        prefix: &str,
    ) -> BufferId {
        let up = self.acquire((channels * h * w * 4 * 4) as u64);
        self.pass(
            prefix.to_string(),
            shaders::UPSAMPLE_NEAREST2X,
            vec![up, x],
            bake(&UpsampleParams {
                channels: channels as u32,
                in_height: h as u32,
                in_width: w as u32,
                _pad: 0,
            }),
            [
                (2 * w).div_ceil(8) as u32,
                (2 * h).div_ceil(8) as u32,
                channels as u32,
            ],
        );
        self.release(x);

        let out = self.conv3x3(up, channels, channels, 2 * h, 2 * w, &format!("{prefix}.conv"));
        self.release(up);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::BufferInit;

    #[test]
    fn test_decoder_plan_is_valid() {
        decoder_plan().validate().unwrap();
    }

    #[test]
    fn test_decoder_pass_and_weight_counts() {
        let plan = decoder_plan();
        assert_eq!(plan.passes.len(), 122);
        assert_eq!(plan.weight_names().len(), 140);
    }

    #[test]
    fn test_decoder_endpoints() {
        let plan = decoder_plan();

        let (input_id, input_desc) = &plan.input;
        assert_eq!(plan.buffers[*input_id].label, "latent");
        assert_eq!(input_desc.shape, vec![1, 4, 64, 64]);
        assert_eq!(input_desc.dtype, DataType::F32);
        assert_eq!(input_desc.size_bytes(), 65_536);

        let (output_id, output_desc) = &plan.output;
        assert_eq!(plan.buffers[*output_id].label, "image");
        assert_eq!(output_desc.shape, vec![512, 512]);
        assert_eq!(output_desc.dtype, DataType::U32);
    }

    #[test]
    fn test_decoder_pass_order_endpoints() {
        let plan = decoder_plan();
        let first = &plan.passes[0];
        assert_eq!(first.label, "post_quant_conv");
        assert_eq!(first.kernel, shaders::CONV2D_1X1);

        let last = plan.passes.last().unwrap();
        assert_eq!(last.label, "to_image");
        assert_eq!(last.kernel, shaders::TO_IMAGE);
        assert_eq!(last.bindings[0], plan.output.0);
    }

    #[test]
    fn test_decoder_weight_names() {
        let plan = decoder_plan();
        let names = plan.weight_names();

        // No duplicates: every checkpoint tensor is uploaded once.
        let unique: std::collections::HashSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), names.len());

        for name in &names {
            assert!(
                name.starts_with("decoder.") || name.starts_with("post_quant_conv."),
                "unexpected weight name {name}"
            );
        }

        assert!(unique.contains("decoder.conv_in.weight"));
        assert!(unique.contains("decoder.mid.attn_1.proj_out.bias"));
        assert!(unique.contains("decoder.up.1.block.0.nin_shortcut.weight"));
        assert!(unique.contains("decoder.up.3.upsample.conv.weight"));
        assert!(unique.contains("decoder.norm_out.weight"));
        assert!(unique.contains("decoder.conv_out.bias"));
        // Level 0 has no upsample, and same-channel blocks have no shortcut.
        assert!(!unique.contains("decoder.up.0.upsample.conv.weight"));
        assert!(!unique.contains("decoder.mid.block_1.nin_shortcut.weight"));
    }

    #[test]
    fn test_decoder_weight_sizes() {
        let plan = decoder_plan();
        let size_of = |name: &str| {
            plan.buffers
                .iter()
                .find(|slot| matches!(&slot.init, BufferInit::Weight(n) if n == name))
                .map(|slot| slot.size)
                .unwrap()
        };

        // conv_in: [512, 4, 3, 3] f32.
        assert_eq!(size_of("decoder.conv_in.weight"), 512 * 4 * 9 * 4);
        // post_quant_conv: [4, 4] 1x1.
        assert_eq!(size_of("post_quant_conv.weight"), 4 * 4 * 4);
        // Shortcut at the 512 -> 256 transition.
        assert_eq!(size_of("decoder.up.1.block.0.nin_shortcut.weight"), 256 * 512 * 4);
        // conv_out: [3, 128, 3, 3].
        assert_eq!(size_of("decoder.conv_out.weight"), 3 * 128 * 9 * 4);
        assert_eq!(size_of("decoder.norm_out.bias"), 128 * 4);
    }

    #[test]
    fn test_decoder_buffer_reuse() {
        let plan = decoder_plan();

        // Pooled intermediates stay a small fixed set despite 122 passes.
        let intermediates = plan
            .buffers
            .iter()
            .enumerate()
            .filter(|(id, slot)| {
                slot.init == BufferInit::Zeroed && *id != plan.input.0 && *id != plan.output.0
            })
            .count();
        assert!(
            intermediates < 24,
            "expected a small reused pool, got {intermediates} intermediate slots"
        );

        // The largest single buffer is the 256ch 512x512 activation.
        assert_eq!(plan.peak_buffer_bytes(), 256 * 512 * 512 * 4);
    }

    #[test]
    fn test_decoder_dispatches_within_limits() {
        let plan = decoder_plan();
        for pass in &plan.passes {
            for &n in &pass.workgroups {
                assert!(n >= 1 && n <= crate::plan::MAX_WORKGROUPS_PER_DIM);
            }
        }
    }

    #[test]
    fn test_attention_dispatch_shape() {
        let plan = decoder_plan();
        let scores = plan
            .passes
            .iter()
            .find(|p| p.label == "decoder.mid.attn_1.scores")
            .unwrap();
        // 4096 tokens tiled 16x16.
        assert_eq!(scores.workgroups, [256, 256, 1]);

        let softmax = plan
            .passes
            .iter()
            .find(|p| p.label == "decoder.mid.attn_1.softmax")
            .unwrap();
        assert_eq!(softmax.workgroups, [4096, 1, 1]);
    }
}
