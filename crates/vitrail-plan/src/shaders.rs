//! The static WGSL kernel table.
//!
//! One entry per distinct compute shader in the exported artifact. The
//! `bindings` arity and `params_size` together form the bind-group-layout
//! table: every kernel takes its parameter uniform at binding 0 and
//! `bindings` storage buffers at bindings 1.., output first.

/// One embedded compute shader.
#[derive(Debug, Clone, Copy)]
pub struct KernelSource {
    /// Stable label, used for pipeline and bind-group labels.
    pub label: &'static str,

    /// Embedded WGSL source.
    pub wgsl: &'static str,

    /// Entry point name.
    pub entry_point: &'static str,

    /// Number of storage-buffer bindings (the params uniform excluded).
    pub bindings: u32,

    /// Byte size of the baked parameter uniform.
    pub params_size: u32,
}

pub const CONV2D_3X3: usize = 0;
pub const CONV2D_1X1: usize = 1;
pub const GROUP_NORM_STATS: usize = 2;
pub const GROUP_NORM_APPLY: usize = 3;
pub const ADD: usize = 4;
pub const UPSAMPLE_NEAREST2X: usize = 5;
pub const ATTN_SCORES: usize = 6;
pub const SOFTMAX_ROWS: usize = 7;
pub const ATTN_APPLY: usize = 8;
pub const TO_IMAGE: usize = 9;
pub const LATENT_Q4_PACK: usize = 10;
pub const LATENT_Q4_UNPACK: usize = 11;

static KERNELS: [KernelSource; 12] = [
    KernelSource {
        label: "conv2d_3x3",
        wgsl: include_str!("../shaders/conv2d_3x3.wgsl"),
        entry_point: "main",
        bindings: 4,
        params_size: 16,
    },
    KernelSource {
        label: "conv2d_1x1",
        wgsl: include_str!("../shaders/conv2d_1x1.wgsl"),
        entry_point: "main",
        bindings: 4,
        params_size: 32,
    },
    KernelSource {
        label: "group_norm_stats",
        wgsl: include_str!("../shaders/group_norm_stats.wgsl"),
        entry_point: "main",
        bindings: 2,
        params_size: 16,
    },
    KernelSource {
        label: "group_norm_apply",
        wgsl: include_str!("../shaders/group_norm_apply.wgsl"),
        entry_point: "main",
        bindings: 5,
        params_size: 16,
    },
    KernelSource {
        label: "add",
        wgsl: include_str!("../shaders/add.wgsl"),
        entry_point: "main",
        bindings: 3,
        params_size: 16,
    },
    KernelSource {
        label: "upsample_nearest2x",
        wgsl: include_str!("../shaders/upsample_nearest2x.wgsl"),
        entry_point: "main",
        bindings: 2,
        params_size: 16,
    },
    KernelSource {
        label: "attn_scores",
        wgsl: include_str!("../shaders/attn_scores.wgsl"),
        entry_point: "main",
        bindings: 3,
        params_size: 16,
    },
    KernelSource {
        label: "softmax_rows",
        wgsl: include_str!("../shaders/softmax_rows.wgsl"),
        entry_point: "main",
        bindings: 2,
        params_size: 16,
    },
    KernelSource {
        label: "attn_apply",
        wgsl: include_str!("../shaders/attn_apply.wgsl"),
        entry_point: "main",
        bindings: 3,
        params_size: 16,
    },
    KernelSource {
        label: "to_image",
        wgsl: include_str!("../shaders/to_image.wgsl"),
        entry_point: "main",
        bindings: 2,
        params_size: 16,
    },
    KernelSource {
        label: "latent_q4_pack",
        wgsl: include_str!("../shaders/latent_q4_pack.wgsl"),
        entry_point: "main",
        bindings: 2,
        params_size: 16,
    },
    KernelSource {
        label: "latent_q4_unpack",
        wgsl: include_str!("../shaders/latent_q4_unpack.wgsl"),
        entry_point: "main",
        bindings: 2,
        params_size: 16,
    },
];

/// The full kernel table, indexed by the `KernelIndex` constants above.
pub fn kernel_table() -> &'static [KernelSource] {
    &KERNELS
}
