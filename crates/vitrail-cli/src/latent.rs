//! Latent file I/O and generation.
//!
//! Latents travel either as raw little-endian f32 files (65536 bytes for
//! the `[1, 4, 64, 64]` latent), as a `latent` tensor inside a safetensors
//! container, or as 4-bit-packed `.q4` files produced by `pack-latent`.

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use vitrail_plan::LATENT_NUMEL;
use vitrail_safetensors::{Dtype, SafeTensors};

/// Read a latent from a raw f32 file or a safetensors container.
pub fn read_latent(path: &Path) -> Result<Vec<f32>> {
    let is_safetensors = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("safetensors"));

    if is_safetensors {
        let container = SafeTensors::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let view = container
            .tensor("latent")
            .context("Container has no 'latent' tensor")?;
        if view.dtype != Dtype::F32 {
            bail!("'latent' tensor is {}, expected F32", view.dtype);
        }
        let values = f32_from_le_bytes(view.data);
        check_latent_len(values.len())?;
        Ok(values)
    } else {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if bytes.len() % 4 != 0 {
            bail!(
                "{} is not a raw f32 latent ({} bytes)",
                path.display(),
                bytes.len()
            );
        }
        let values = f32_from_le_bytes(&bytes);
        check_latent_len(values.len())?;
        Ok(values)
    }
}

/// Write a latent as raw little-endian f32.
pub fn write_latent(path: &Path, values: &[f32]) -> Result<()> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read a 4-bit-packed latent file.
pub fn read_packed(path: &Path) -> Result<Vec<u32>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let expected = LATENT_NUMEL / 8 * 4;
    if bytes.len() != expected {
        bail!(
            "{} holds {} bytes, expected {} for a packed latent",
            path.display(),
            bytes.len(),
            expected
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes(b.try_into().expect("chunk is 4 bytes")))
        .collect())
}

/// Write a 4-bit-packed latent file.
pub fn write_packed(path: &Path, words: &[u32]) -> Result<()> {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Draw a standard-normal latent from a seeded RNG.
///
/// Box-Muller over the seeded uniform stream; the pack carries no normal
/// distribution crate.
pub fn random_latent(seed: u64) -> Vec<f32> {
    use rand::Rng;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(LATENT_NUMEL);
    while values.len() < LATENT_NUMEL {
        let u1: f32 = rng.random::<f32>().max(1e-7);
        let u2: f32 = rng.random();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * std::f32::consts::PI * u2;
        values.push(radius * angle.cos());
        if values.len() < LATENT_NUMEL {
            values.push(radius * angle.sin());
        }
    }
    values
}

fn f32_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().expect("chunk is 4 bytes")))
        .collect()
}

fn check_latent_len(len: usize) -> Result<()> {
    if len != LATENT_NUMEL {
        bail!("latent holds {len} values, expected {LATENT_NUMEL} (1x4x64x64)");
    }
    Ok(())
}
