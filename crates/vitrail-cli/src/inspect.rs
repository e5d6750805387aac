//! Inspect weight containers and frozen plans.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::PathBuf;
use vitrail_plan::{Plan, decoder_plan, latent_pack_plan, latent_unpack_plan};
use vitrail_safetensors::SafeTensors;

/// Describe a safetensors container and check it against the decoder plan.
pub fn cmd_inspect_weights(path: PathBuf) -> Result<()> {
    let container =
        SafeTensors::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;

    println!("Container: {}", path.display());
    println!("  Tensors: {}", container.len());
    println!("  Data bytes: {}", container.data_len());
    println!();

    for view in container.iter() {
        println!(
            "  {} - {} {:?} ({} bytes)",
            view.name,
            view.dtype,
            view.shape,
            view.data.len()
        );
    }
    println!();

    let plan = decoder_plan();
    let missing: Vec<&str> = plan
        .weight_names()
        .into_iter()
        .filter(|name| !container.contains(name))
        .collect();
    if missing.is_empty() {
        println!("All {} decoder weights present.", plan.weight_names().len());
    } else {
        println!("Missing {} decoder weights:", missing.len());
        for name in missing.iter().take(10) {
            println!("  {name}");
        }
        if missing.len() > 10 {
            println!("  ... and {} more", missing.len() - 10);
        }
    }

    Ok(())
}

/// Print statistics for one of the frozen plans.
pub fn cmd_inspect_plan(name: &str) -> Result<()> {
    let plan = match name {
        "decoder" => decoder_plan(),
        "latent-pack" => latent_pack_plan(),
        "latent-unpack" => latent_unpack_plan(),
        other => bail!("Unknown plan '{other}' (expected decoder, latent-pack, or latent-unpack)"),
    };

    print!("{}", plan_summary(&plan));
    Ok(())
}

/// Render plan statistics as text.
pub fn plan_summary(plan: &Plan) -> String {
    let mut kernel_counts: HashMap<&str, usize> = HashMap::new();
    for pass in &plan.passes {
        *kernel_counts
            .entry(plan.kernels[pass.kernel].label)
            .or_default() += 1;
    }
    let mut counts: Vec<(&str, usize)> = kernel_counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let mut out = String::new();
    out.push_str(&format!("Plan: {}\n", plan.name));
    out.push_str(&format!("  Passes: {}\n", plan.passes.len()));
    out.push_str(&format!("  Buffers: {}\n", plan.buffers.len()));
    out.push_str(&format!("  Weights: {}\n", plan.weight_names().len()));
    out.push_str(&format!(
        "  GPU bytes: {} (largest buffer {})\n",
        plan.total_buffer_bytes(),
        plan.peak_buffer_bytes()
    ));
    out.push_str(&format!(
        "  Input: {:?} {:?}\n",
        plan.input.1.shape, plan.input.1.dtype
    ));
    out.push_str(&format!(
        "  Output: {:?} {:?}\n",
        plan.output.1.shape, plan.output.1.dtype
    ));
    out.push_str("  Dispatches by kernel:\n");
    for (label, count) in counts {
        out.push_str(&format!("    {label}: {count}\n"));
    }
    out
}
