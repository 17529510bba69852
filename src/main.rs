// SYNOID Temporal Loss Entry Point
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::Serialize;
use std::path::{Path, PathBuf};
use synoid_temporal_loss::{load_frame, masked_squared_error, optical_flow_with, FarnebackParams};
use tracing::info;

const DEFAULT_FRAME: &str = "./data/content-images/lion.jpg";

#[derive(Parser)]
#[command(name = "synoid-temporal-loss")]
#[command(about = "Optical-flow masked temporal loss between frames", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the temporal loss between two frames
    Loss {
        /// Current frame
        #[arg(short, long, default_value = DEFAULT_FRAME)]
        current: PathBuf,

        /// Previous frame (defaults to the current frame itself)
        #[arg(short, long)]
        previous: Option<PathBuf>,

        /// Farneback parameters as JSON
        #[arg(long)]
        params: Option<PathBuf>,

        /// Emit a JSON report instead of the bare number
        #[arg(long)]
        json: bool,
    },

    /// Render the flow visualization and motion mask
    Flow {
        /// Current frame
        #[arg(short, long)]
        current: PathBuf,

        /// Previous frame
        #[arg(short, long)]
        previous: PathBuf,

        /// Where to write the HSV flow rendering
        #[arg(long)]
        rgb_out: Option<PathBuf>,

        /// Where to write the mask (scaled to 0/255)
        #[arg(long)]
        mask_out: Option<PathBuf>,

        /// Farneback parameters as JSON
        #[arg(long)]
        params: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct LossReport<'a> {
    current: &'a Path,
    previous: &'a Path,
    width: u32,
    height: u32,
    mask_coverage: f64,
    loss: f64,
}

fn resolve_params(path: Option<&Path>) -> anyhow::Result<FarnebackParams> {
    match path {
        Some(p) => FarnebackParams::from_file(p)
            .with_context(|| format!("Failed to read Farneback parameters from {:?}", p)),
        None => Ok(FarnebackParams::load()),
    }
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[SYNOID PANIC] at {}: {}", location, message);
    }));

    let args = Cli::parse();

    match args.command {
        Commands::Loss {
            current,
            previous,
            params,
            json,
        } => {
            let params = resolve_params(params.as_deref())?;
            let previous = previous.unwrap_or_else(|| current.clone());

            let cur = load_frame(&current).with_context(|| format!("Failed to load {:?}", current))?;
            let prev = load_frame(&previous).with_context(|| format!("Failed to load {:?}", previous))?;

            let (_, mask) = optical_flow_with(&cur, &prev, &params)?;
            let loss = masked_squared_error(&cur, &prev, &mask)?;

            if json {
                let report = LossReport {
                    current: &current,
                    previous: &previous,
                    width: cur.width(),
                    height: cur.height(),
                    mask_coverage: mask.coverage(),
                    loss,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", loss);
            }
        }
        Commands::Flow {
            current,
            previous,
            rgb_out,
            mask_out,
            params,
        } => {
            let params = resolve_params(params.as_deref())?;
            let cur = load_frame(&current).with_context(|| format!("Failed to load {:?}", current))?;
            let prev = load_frame(&previous).with_context(|| format!("Failed to load {:?}", previous))?;

            let (rgb, mask) = optical_flow_with(&cur, &prev, &params)?;

            if let Some(path) = rgb_out {
                rgb.save(&path)
                    .with_context(|| format!("Failed to write flow rendering to {:?}", path))?;
                info!("[FLOW] Flow rendering saved: {:?}", path);
            }
            if let Some(path) = mask_out {
                mask.to_visible()
                    .save(&path)
                    .with_context(|| format!("Failed to write mask to {:?}", path))?;
                info!("[FLOW] Mask saved: {:?}", path);
            }

            let (w, h) = mask.dimensions();
            println!("Frame size:     {}x{}", w, h);
            println!("Static pixels:  {:.2}%", mask.coverage() * 100.0);
            println!("Moving pixels:  {:.2}%", (1.0 - mask.coverage()) * 100.0);
        }
    }

    Ok(())
}
