//! Vitrail CLI - decode latents with the frozen decoder, inspect plans and
//! weight containers, and convert latents to and from 4-bit packed form.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vitrail_cli::{decode, inspect, latent};
use vitrail_plan::{LATENT_NUMEL, pack_latent_q4, unpack_latent_q4};

#[derive(Parser)]
#[command(name = "vitrail")]
#[command(about = "Frozen WebGPU image-decoder artifact", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a latent into a PNG image
    Decode {
        /// Path to the decoder safetensors weights
        #[arg(short, long, value_name = "FILE")]
        weights: PathBuf,

        /// Latent input: raw f32 file or a safetensors with a 'latent' tensor
        #[arg(short, long, value_name = "FILE")]
        latent: Option<PathBuf>,

        /// Draw a random normal latent from this seed instead
        #[arg(short, long, conflicts_with = "latent")]
        seed: Option<u64>,

        /// Output image path
        #[arg(short, long, value_name = "FILE", default_value = "decoded.png")]
        output: PathBuf,
    },
    /// Inspect a weight container or a frozen plan
    Inspect {
        /// Path to a safetensors file to describe
        #[arg(short, long, value_name = "FILE")]
        weights: Option<PathBuf>,

        /// Plan to summarize: decoder, latent-pack, latent-unpack
        #[arg(short, long, value_name = "NAME")]
        plan: Option<String>,
    },
    /// Pack a raw f32 latent into 4-bit codes
    PackLatent {
        /// Raw f32 latent file (65536 bytes)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Packed output file
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Unpack a 4-bit latent back to raw f32
    UnpackLatent {
        /// Packed latent file (8192 bytes)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Raw f32 output file
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            weights,
            latent,
            seed,
            output,
        } => decode::cmd_decode(weights, latent, seed, output),
        Commands::Inspect { weights, plan } => match (weights, plan) {
            (Some(path), None) => inspect::cmd_inspect_weights(path),
            (None, Some(name)) => inspect::cmd_inspect_plan(&name),
            _ => bail!("Provide exactly one of --weights or --plan"),
        },
        Commands::PackLatent { input, output } => {
            let values = latent::read_latent(&input)?;
            latent::write_packed(&output, &pack_latent_q4(&values))
                .context("Failed to write packed latent")?;
            eprintln!("Packed {} values into {}", values.len(), output.display());
            Ok(())
        }
        Commands::UnpackLatent { input, output } => {
            let words = latent::read_packed(&input)?;
            let values = unpack_latent_q4(&words, LATENT_NUMEL);
            latent::write_latent(&output, &values).context("Failed to write latent")?;
            eprintln!("Unpacked {} values into {}", values.len(), output.display());
            Ok(())
        }
    }
}
