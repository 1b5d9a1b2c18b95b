use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use easy_fcdr::output::{create_timestamped_output_dir, product_file_name, write_segment_outputs};
use easy_fcdr::{process_orbit, ProcessingConfig, PropagationEngine, RawOrbit, SplitMode};

#[derive(Debug, Parser)]
#[command(name = "easy-fcdr")]
#[command(about = "Correlation structure and channel matrices for AVHRR easy-FCDR segments")]
struct Cli {
    /// Orbit exported by the file reader, as JSON
    input: PathBuf,

    /// Product file name override
    #[arg(long)]
    output: Option<String>,

    /// Reduced-resolution ensemble output (recorded in the manifest)
    #[arg(long, default_value_t = false)]
    ocean: bool,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "output-easy-fcdr")]
    outdir: PathBuf,

    #[arg(long)]
    line_skip: Option<usize>,

    #[arg(long)]
    elem_skip: Option<usize>,

    /// Cut split segments as compact copies instead of masking
    #[arg(long, default_value_t = false)]
    extract: bool,

    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut cfg = match &cli.config {
        Some(path) => ProcessingConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => ProcessingConfig::default(),
    };
    if let Some(line_skip) = cli.line_skip {
        cfg.line_skip = line_skip;
    }
    if let Some(elem_skip) = cli.elem_skip {
        cfg.elem_skip = elem_skip;
    }
    if cli.extract {
        cfg.split_mode = SplitMode::Extract;
    }
    cfg.ocean_only |= cli.ocean;
    cfg.validate().context("invalid processing configuration")?;

    let raw = RawOrbit::from_json_file(&cli.input)
        .with_context(|| format!("failed to read orbit: {}", cli.input.display()))?;
    let products = process_orbit(&raw, &cfg, &PropagationEngine)
        .with_context(|| format!("failed to process orbit: {}", cli.input.display()))?;
    if products.is_empty() {
        bail!(
            "no segment of {} reached {} scanlines",
            cli.input.display(),
            cfg.min_segment_lines
        );
    }

    let run_dir = create_timestamped_output_dir(&cli.outdir)
        .with_context(|| format!("failed to create output dir under {}", cli.outdir.display()))?;

    for product in &products {
        let name = product_file_name(product, cli.output.as_deref())
            .context("failed to derive product file name")?;
        let segment_dir = run_dir.join(name.trim_end_matches(".nc"));
        write_segment_outputs(&segment_dir, product, &name, &cfg)
            .with_context(|| format!("failed to write outputs for {name}"))?;

        let repairs = product.total_repairs();
        if !repairs.is_clean() {
            warn!(
                product = %name,
                lanes = repairs.unrepairable.len(),
                "segment carries unrepaired degenerate sensitivities"
            );
        }
        info!(product = %name, dir = %segment_dir.display(), "wrote segment");
    }

    println!("wrote outputs to {}", run_dir.display());
    Ok(())
}
