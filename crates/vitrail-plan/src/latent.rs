//! Latent 4-bit quantization plans.
//!
//! The export pipeline ships a custom quantization kernel for the final
//! latent encode: each f32 latent value maps to a 4-bit code over the baked
//! range [-4, 4], eight codes per u32 word. The pack/unpack plans here wrap
//! that kernel pair for the fixed `[1, 4, 64, 64]` latent; the host
//! functions mirror the kernels exactly for tests and GPU-free tooling.

use crate::params::{QuantParams, bake};
use crate::plan::{
    BufferInit, BufferSlot, DataType, Pass, Plan, TensorDesc, elementwise_workgroups,
};
use crate::shaders::{self, kernel_table};

/// Element count of the `[1, 4, 64, 64]` latent.
pub const LATENT_NUMEL: usize = 16_384;

/// Lower bound of the baked quantization range.
pub const Q4_MIN: f32 = -4.0;

/// Step between adjacent 4-bit codes over the [-4, 4] range.
pub const Q4_STEP: f32 = 8.0 / 15.0;

const WORDS: usize = LATENT_NUMEL / 8;

fn quant_params() -> Vec<u8> {
    bake(&QuantParams {
        count: LATENT_NUMEL as u32,
        qmin: Q4_MIN,
        step: Q4_STEP,
        _pad: 0,
    })
}

/// Plan packing an f32 latent into 4-bit codes.
pub fn latent_pack_plan() -> Plan {
    let buffers = vec![
        BufferSlot {
            label: "latent".to_string(),
            size: (LATENT_NUMEL * 4) as u64,
            init: BufferInit::Zeroed,
        },
        BufferSlot {
            label: "packed".to_string(),
            size: (WORDS * 4) as u64,
            init: BufferInit::Zeroed,
        },
    ];
    let passes = vec![Pass {
        label: "latent_q4_pack".to_string(),
        kernel: shaders::LATENT_Q4_PACK,
        bindings: vec![1, 0],
        params: quant_params(),
        workgroups: elementwise_workgroups(WORDS),
    }];

    Plan {
        name: "latent_q4_pack",
        kernels: kernel_table(),
        buffers,
        passes,
        input: (0, TensorDesc::new(&[1, 4, 64, 64], DataType::F32)),
        output: (1, TensorDesc::new(&[WORDS], DataType::U32)),
    }
}

/// Plan unpacking 4-bit codes back into an f32 latent.
pub fn latent_unpack_plan() -> Plan {
    let buffers = vec![
        BufferSlot {
            label: "packed".to_string(),
            size: (WORDS * 4) as u64,
            init: BufferInit::Zeroed,
        },
        BufferSlot {
            label: "latent".to_string(),
            size: (LATENT_NUMEL * 4) as u64,
            init: BufferInit::Zeroed,
        },
    ];
    let passes = vec![Pass {
        label: "latent_q4_unpack".to_string(),
        kernel: shaders::LATENT_Q4_UNPACK,
        bindings: vec![1, 0],
        params: quant_params(),
        workgroups: elementwise_workgroups(LATENT_NUMEL),
    }];

    Plan {
        name: "latent_q4_unpack",
        kernels: kernel_table(),
        buffers,
        passes,
        input: (0, TensorDesc::new(&[WORDS], DataType::U32)),
        output: (1, TensorDesc::new(&[1, 4, 64, 64], DataType::F32)),
    }
}

/// Host-side reference of the pack kernel.
pub fn pack_latent_q4(values: &[f32]) -> Vec<u32> {
    values
        .chunks(8)
        .map(|chunk| {
            let mut word = 0u32;
            for (k, &v) in chunk.iter().enumerate() {
                let code = ((v - Q4_MIN) / Q4_STEP).round().clamp(0.0, 15.0) as u32;
                word |= code << (k * 4);
            }
            word
        })
        .collect()
}

/// Host-side reference of the unpack kernel.
pub fn unpack_latent_q4(words: &[u32], count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| {
            let code = (words[i / 8] >> ((i % 8) * 4)) & 15;
            Q4_MIN + code as f32 * Q4_STEP
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latent_plans_are_valid() {
        latent_pack_plan().validate().unwrap();
        latent_unpack_plan().validate().unwrap();
    }

    #[test]
    fn test_pack_plan_shapes() {
        let plan = latent_pack_plan();
        assert_eq!(plan.passes.len(), 1);
        assert_eq!(plan.input.1.size_bytes(), 65_536);
        assert_eq!(plan.output.1.size_bytes(), 8_192);

        let unpack = latent_unpack_plan();
        assert_eq!(unpack.input.1.size_bytes(), 8_192);
        assert_eq!(unpack.output.1.size_bytes(), 65_536);
    }

    #[test]
    fn test_pack_known_codes() {
        // qmin maps to code 0, qmax to code 15, zero to code 8 (round(7.5)).
        let words = pack_latent_q4(&[Q4_MIN, 4.0, 0.0, Q4_MIN + Q4_STEP, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0] & 0xF, 0);
        assert_eq!((words[0] >> 4) & 0xF, 15);
        assert_eq!((words[0] >> 8) & 0xF, 8);
        assert_eq!((words[0] >> 12) & 0xF, 1);
    }

    #[test]
    fn test_out_of_range_values_clamp() {
        let words = pack_latent_q4(&[-100.0, 100.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(words[0] & 0xF, 0);
        assert_eq!((words[0] >> 4) & 0xF, 15);
    }

    #[test]
    fn test_round_trip_error_bound() {
        // A deterministic spread across the quantization range.
        let values: Vec<f32> = (0..LATENT_NUMEL)
            .map(|i| -3.9 + 7.8 * (i as f32 / (LATENT_NUMEL - 1) as f32))
            .collect();

        let packed = pack_latent_q4(&values);
        assert_eq!(packed.len(), WORDS);
        let restored = unpack_latent_q4(&packed, LATENT_NUMEL);

        for (&orig, &back) in values.iter().zip(&restored) {
            assert!(
                (orig - back).abs() <= Q4_STEP / 2.0 + 1e-5,
                "round-trip error too large: {orig} -> {back}"
            );
        }
    }

    #[test]
    fn test_unpack_word_layout() {
        // Codes 0..7 packed little-end first.
        let word = 0x7654_3210u32;
        let values = unpack_latent_q4(&[word], 8);
        for (i, &v) in values.iter().enumerate() {
            let expected = Q4_MIN + i as f32 * Q4_STEP;
            assert!((v - expected).abs() < 1e-6);
        }
    }
}
