//! Decode a latent into a PNG image.

use crate::latent;
use anyhow::{Context, Result, bail};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use vitrail_plan::{IMAGE_SIZE, decoder_plan};
use vitrail_runtime::{Runtime, Tensor};
use vitrail_safetensors::SafeTensors;

/// Run the frozen decoder and write the result as a PNG.
pub fn cmd_decode(
    weights_path: PathBuf,
    latent_path: Option<PathBuf>,
    seed: Option<u64>,
    output_path: PathBuf,
) -> Result<()> {
    let values = match (&latent_path, seed) {
        (Some(path), None) => latent::read_latent(path)?,
        (None, Some(seed)) => latent::random_latent(seed),
        (None, None) => bail!("Provide either --latent or --seed"),
        (Some(_), Some(_)) => bail!("--latent and --seed are mutually exclusive"),
    };

    let weights = SafeTensors::open(&weights_path)
        .with_context(|| format!("Failed to load weights from {}", weights_path.display()))?;
    tracing::info!(
        tensors = weights.len(),
        bytes = weights.data_len(),
        "weights loaded"
    );

    let runtime = pollster::block_on(Runtime::new()).context("GPU initialization failed")?;
    tracing::info!(adapter = %runtime.adapter_info().name, "runtime ready");

    let executor = runtime
        .load_plan(decoder_plan(), Some(&weights))
        .context("Failed to materialize the decoder plan")?;

    let input = Tensor::from_vec(values, &[1, 4, 64, 64]);
    let output = executor.run(&input).context("Decoder execution failed")?;

    let pixels = output.to_vec::<u32>().context("Unexpected output layout")?;
    let image = image_from_packed(&pixels, IMAGE_SIZE as u32, IMAGE_SIZE as u32);
    save_png(&image, &output_path)?;

    eprintln!("Wrote {}x{} image to {}", IMAGE_SIZE, IMAGE_SIZE, output_path.display());
    Ok(())
}

/// Expand packed-RGBA8 words (one per pixel, row-major) into an image.
pub fn image_from_packed(pixels: &[u32], width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let p = pixels[(y * width + x) as usize];
        image::Rgba([
            (p & 0xFF) as u8,
            ((p >> 8) & 0xFF) as u8,
            ((p >> 16) & 0xFF) as u8,
            ((p >> 24) & 0xFF) as u8,
        ])
    })
}

fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to write image to {}", path.display()))
}
