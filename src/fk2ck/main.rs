//! Command line front end of the frame kernel to CK converter.
use anyhow::{Context, Result};
use clap::Parser;
use fk2ck_core::prelude::*;
use std::env;
use std::path::PathBuf;
use std::process;

/// Meta-kernel used when no kernels are given.
const DEFAULT_KERNEL: &str = "fk2ck.tm";

#[derive(Parser, Debug)]
#[command(
    name = "fk2ck",
    version,
    about = "Convert a history of fixed-offset frame kernels into a replacement CK"
)]
struct Cli {
    /// Kernels defining the conversion, loaded in order.
    #[arg(value_name = "KERNELS")]
    kernels: Vec<PathBuf>,

    /// Build the output CK.
    #[arg(long, default_value_t = false)]
    create: bool,

    /// Compare the output CK against the historical frame kernels.
    #[arg(long, default_value_t = false)]
    test: bool,

    /// Print validation results as JSON, one object per line.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() {
    init_logging();
    if let Err(err) = run_cli() {
        eprintln!("error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        process::exit(1);
    }
}

/// `RUST_LOG` wins, then the `DEBUG` and `VERBOSE` switches.
fn init_logging() {
    let level = if env::var_os("DEBUG").is_some() {
        "debug"
    } else if env::var_os("VERBOSE").is_some() {
        "info"
    } else {
        "warn"
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let kernels = if cli.kernels.is_empty() {
        vec![PathBuf::from(DEFAULT_KERNEL)]
    } else {
        cli.kernels
    };

    let mut store = KernelSet::new();
    let config = ConversionConfig::from_kernels(&kernels, &mut store)
        .with_context(|| format!("reading configuration from {:?}", kernels))?;

    if cli.create {
        let segments = create(&config, &mut store)
            .with_context(|| format!("building {}", config.output.display()))?;
        log::info!(
            "Wrote {} segments to {}",
            segments.len(),
            config.output.display()
        );
    }

    if cli.test {
        let results = test(&config, &mut store)
            .with_context(|| format!("validating {}", config.output.display()))?;
        for result in results {
            if cli.json {
                println!("{}", serde_json::to_string(&result)?);
            } else {
                println!("{result}");
            }
        }
    }
    Ok(())
}
