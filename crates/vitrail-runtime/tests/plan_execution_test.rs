//! Plan loading and execution behavior: weight upload validation, input
//! validation, and the frozen latent quantization plans end to end.

mod common;

use common::{f32_container, f32_desc, runtime_or_skip, test_plan, weight, zeroed};
use vitrail_plan::{
    ADD, AddParams, LATENT_NUMEL, Pass, decoder_plan, latent_pack_plan, latent_unpack_plan,
    pack_latent_q4, unpack_latent_q4,
};
use vitrail_runtime::{RuntimeError, Tensor};

fn params_bytes<P: bytemuck::Pod>(params: &P) -> Vec<u8> {
    bytemuck::bytes_of(params).to_vec()
}

fn add_plan() -> vitrail_plan::Plan {
    test_plan(
        vec![zeroed("a", 64), weight("b", 64), zeroed("out", 64)],
        vec![Pass {
            label: "add".to_string(),
            kernel: ADD,
            bindings: vec![2, 0, 1],
            params: params_bytes(&AddParams {
                count: 16,
                _pad: [0; 3],
            }),
            workgroups: [1, 1, 1],
        }],
        (0, f32_desc(&[16])),
        (2, f32_desc(&[16])),
    )
}

#[test]
fn test_decoder_plan_requires_weights() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    // Loading the decoder with no container fails on its first weight slot,
    // before any large allocation is touched.
    let err = runtime.load_plan(decoder_plan(), None).unwrap_err();
    assert!(matches!(err, RuntimeError::MissingWeight(name) if name == "post_quant_conv.weight"));
}

#[test]
fn test_missing_weight_is_reported_by_name() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    let weights = f32_container(&[("unrelated", &[4], &[0.0; 4])]);
    let err = runtime.load_plan(add_plan(), Some(&weights)).unwrap_err();
    assert!(matches!(err, RuntimeError::MissingWeight(name) if name == "b"));
}

#[test]
fn test_weight_size_mismatch_is_rejected() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    // "b" holds 4 values, the plan slot expects 16.
    let weights = f32_container(&[("b", &[4], &[1.0; 4])]);
    let err = runtime.load_plan(add_plan(), Some(&weights)).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::WeightSizeMismatch {
            name,
            expected: 64,
            actual: 16,
        } if name == "b"
    ));
}

#[test]
fn test_input_layout_is_validated() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    let weights = f32_container(&[("b", &[16], &[0.5; 16])]);
    let executor = runtime.load_plan(add_plan(), Some(&weights)).unwrap();

    // Wrong shape.
    let err = executor
        .run(&Tensor::from_vec(vec![0.0f32; 8], &[8]))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InputError(_)));

    // Wrong dtype.
    let err = executor
        .run(&Tensor::from_vec(vec![0u32; 16], &[16]))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InputError(_)));
}

/// Latent values chosen to sit a quarter-step above each code, away from
/// rounding ties, cycling through all 16 codes.
fn latent_fixture() -> Vec<f32> {
    use vitrail_plan::{Q4_MIN, Q4_STEP};
    (0..LATENT_NUMEL)
        .map(|i| Q4_MIN + ((i % 16) as f32 + 0.25) * Q4_STEP)
        .collect()
}

#[test]
fn test_latent_q4_pack_matches_host_reference() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    let latent = latent_fixture();
    let executor = runtime.load_plan(latent_pack_plan(), None).unwrap();
    let packed = executor
        .run(&Tensor::from_vec(latent.clone(), &[1, 4, 64, 64]))
        .unwrap();

    assert_eq!(packed.shape(), &[LATENT_NUMEL / 8]);
    assert_eq!(packed.to_vec::<u32>().unwrap(), pack_latent_q4(&latent));
}

#[test]
fn test_latent_q4_unpack_round_trip() {
    let Some(runtime) = runtime_or_skip() else {
        return;
    };

    let latent = latent_fixture();
    let packed = pack_latent_q4(&latent);

    let executor = runtime.load_plan(latent_unpack_plan(), None).unwrap();
    let restored = executor
        .run(&Tensor::from_vec(packed.clone(), &[LATENT_NUMEL / 8]))
        .unwrap();

    assert_eq!(restored.shape(), &[1, 4, 64, 64]);
    let gpu_values = restored.to_vec::<f32>().unwrap();
    let host_values = unpack_latent_q4(&packed, LATENT_NUMEL);
    for (g, h) in gpu_values.iter().zip(&host_values) {
        assert!((g - h).abs() < 1e-6);
    }

    use vitrail_plan::Q4_STEP;
    for (orig, back) in latent.iter().zip(&gpu_values) {
        assert!((orig - back).abs() <= Q4_STEP / 2.0 + 1e-5);
    }
}
