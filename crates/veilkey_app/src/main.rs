//! veilkey - zero-steganography key tool
//!
//! Hides a secret image as a signed difference key against a cover image
//! that is never modified, and recovers the secret from cover plus key.

mod batch;
mod config;
mod report;
mod service;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::ServiceConfig;
use service::{StegoService, Upload};
use veilkey_core::{keystore, ColorMode, ReconcilePolicy, SenderOptions};
use veilkey_io::Handle;

#[derive(Parser, Debug)]
#[command(name = "veilkey")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a stego key from a cover and a secret image
    Send {
        #[arg(long)]
        cover: PathBuf,
        #[arg(long)]
        secret: PathBuf,
        #[arg(long)]
        key: PathBuf,
        /// Work on a single luma channel
        #[arg(long)]
        gray: bool,
        /// Fail instead of resampling a secret of a different shape
        #[arg(long)]
        strict: bool,
        /// Write a JSON report with cover and key digests
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Recover the secret image from a cover and a stego key
    Receive {
        #[arg(long)]
        cover: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        gray: bool,
        /// Original secret to compare the recovery against
        #[arg(long)]
        reference: Option<PathBuf>,
    },

    /// Print the PSNR between two images
    Psnr {
        reference: PathBuf,
        candidate: PathBuf,
        #[arg(long)]
        gray: bool,
    },

    /// Show the header and value range of a stego key
    Inspect { key: PathBuf },

    /// Generate keys for every entry of a JSON manifest in parallel
    Batch {
        manifest: PathBuf,
        #[arg(short, long)]
        jobs: Option<usize>,
        #[arg(long)]
        gray: bool,
        #[arg(long)]
        strict: bool,
    },

    /// Run uploads through the managed artifact store
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Store cover and secret and produce a key handle
    Send {
        #[arg(long)]
        cover: PathBuf,
        #[arg(long)]
        secret: PathBuf,
    },
    /// Store cover and key and produce a recovered-image handle
    Receive {
        #[arg(long)]
        cover: PathBuf,
        #[arg(long)]
        key: PathBuf,
    },
    /// Compare a recovered handle against a reference image
    Verify {
        handle: String,
        #[arg(long)]
        reference: PathBuf,
    },
    /// Copy the file behind a key or recovered handle to a destination
    Fetch {
        handle: String,
        #[arg(long)]
        to: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = ServiceConfig::load_or_default(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    match args.command {
        Command::Send {
            cover,
            secret,
            key,
            gray,
            strict,
            report,
        } => {
            let options = sender_options(&config, gray, strict);
            run_send(&cover, &secret, &key, &options, report.as_deref())
        }
        Command::Receive {
            cover,
            key,
            output,
            gray,
            reference,
        } => run_receive(
            &cover,
            &key,
            &output,
            color_mode(&config, gray),
            reference.as_deref(),
        ),
        Command::Psnr {
            reference,
            candidate,
            gray,
        } => {
            let value = veilkey_core::verify(&reference, &candidate, color_mode(&config, gray))
                .context("Failed to compare images")?;
            println!("PSNR: {}", format_psnr(value));
            Ok(())
        }
        Command::Inspect { key } => run_inspect(&key),
        Command::Batch {
            manifest,
            jobs,
            gray,
            strict,
        } => run_batch(&manifest, sender_options(&config, gray, strict), jobs),
        Command::Session(cmd) => run_session(config, cmd),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn color_mode(config: &ServiceConfig, gray: bool) -> ColorMode {
    if gray { ColorMode::Gray } else { config.color_mode }
}

fn sender_options(config: &ServiceConfig, gray: bool, strict: bool) -> SenderOptions {
    let mut options = config.sender_options();
    options.color_mode = color_mode(config, gray);
    if strict {
        options.policy = ReconcilePolicy::Reject;
    }
    options
}

fn format_psnr(value: f64) -> String {
    if value.is_infinite() {
        "inf dB (identical)".to_string()
    } else {
        format!("{value:.2} dB")
    }
}

fn run_send(
    cover: &Path,
    secret: &Path,
    key: &Path,
    options: &SenderOptions,
    report_path: Option<&Path>,
) -> Result<()> {
    let cover_before = report::sha256_file(cover)
        .with_context(|| format!("Failed to read cover {}", cover.display()))?;

    let report = veilkey_core::process_sender(cover, secret, key, options)
        .context("Failed to generate stego key")?;

    println!("Stego key written: {}", key.display());
    println!("Image shape:       {}", report.shape);
    if report.resampled {
        println!(
            "Secret resampled:  {} -> {} (recovery yields the resampled secret)",
            report.secret_shape, report.shape
        );
    }

    let record = report::SenderRecord::new(cover, secret, key, &report, cover_before)?;
    if !record.cover_unchanged {
        anyhow::bail!("Cover file {} changed during key generation", cover.display());
    }
    if let Some(path) = report_path {
        record.write(path)?;
        println!("Report written:    {}", path.display());
    }

    Ok(())
}

fn run_receive(
    cover: &Path,
    key: &Path,
    output: &Path,
    mode: ColorMode,
    reference: Option<&Path>,
) -> Result<()> {
    let recovered = veilkey_core::process_receiver(cover, key, output, mode)
        .context("Failed to recover secret image")?;

    println!("Recovered image written: {}", output.display());
    println!("Image shape:             {}", recovered.shape());

    if let Some(reference) = reference {
        let secret = veilkey_core::raster::load(reference, mode)
            .context("Failed to load reference image")?;
        let value = veilkey_core::psnr(&secret, &recovered)
            .context("Reference and recovered image differ in shape")?;
        println!("PSNR vs reference:       {}", format_psnr(value));
    }

    Ok(())
}

fn run_inspect(path: &Path) -> Result<()> {
    let header = keystore::inspect(path).context("Failed to read key header")?;
    println!("Shape:  {}", header.shape);
    println!("Dtype:  {}", header.dtype);

    let key = keystore::load(path).context("Failed to read key data")?;
    let (lo, hi) = key.value_range();
    println!("Range:  [{lo}, {hi}]");
    println!("Zeros:  {:.1}%", key.zero_fraction() * 100.0);
    Ok(())
}

fn run_batch(manifest: &Path, options: SenderOptions, jobs: Option<usize>) -> Result<()> {
    let entries = batch::load_manifest(manifest)?;
    let total = entries.len();
    info!(entries = total, "starting batch");

    let summary = batch::run_batch(entries, options, jobs, true)?;

    println!(
        "Batch complete: {}/{} keys generated, {} resampled",
        summary.succeeded, total, summary.resampled
    );
    for failure in &summary.failures {
        println!(
            "  #{} {} + {}: {}",
            failure.index,
            failure.entry.cover.display(),
            failure.entry.secret.display(),
            failure.error
        );
    }

    if summary.failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} batch entries failed", summary.failures.len())
    }
}

fn run_session(config: ServiceConfig, cmd: SessionCommand) -> Result<()> {
    let service = StegoService::new(config).context("Failed to open artifact store")?;
    info!(data_dir = %service.config().data_dir.display(), "artifact store ready");

    let upload = |path: &Path| {
        Upload::from_path(path).with_context(|| format!("Failed to read {}", path.display()))
    };

    match cmd {
        SessionCommand::Send { cover, secret } => {
            let outcome = service.send(&upload(&cover)?, &upload(&secret)?)?;
            println!("Session:      {}", outcome.session);
            println!("Key handle:   {}", outcome.key);
            println!("Image shape:  {}", outcome.shape);
            println!("Resampled:    {}", outcome.resampled);
            println!("Cover SHA256: {}", outcome.cover_sha256);
            println!("Key SHA256:   {}", outcome.key_sha256);
        }
        SessionCommand::Receive { cover, key } => {
            let outcome = service.receive(&upload(&cover)?, &upload(&key)?)?;
            println!("Session:          {}", outcome.session);
            println!("Recovered handle: {}", outcome.recovered);
            println!("Image shape:      {}", outcome.shape);
        }
        SessionCommand::Verify { handle, reference } => {
            let handle: Handle = handle.parse()?;
            let value = service.verify(&handle, &upload(&reference)?)?;
            println!("PSNR: {}", format_psnr(value));
        }
        SessionCommand::Fetch { handle, to } => {
            let download = service.download(&handle)?;
            let dest = if to.is_dir() {
                to.join(&download.file_name)
            } else {
                to
            };
            std::fs::copy(&download.path, &dest)
                .with_context(|| format!("Failed to copy to {}", dest.display()))?;
            println!("Saved {} to {}", download.file_name, dest.display());
        }
    }

    Ok(())
}
