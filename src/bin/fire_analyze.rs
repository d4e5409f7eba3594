//! fire_analyze - one-shot fire detection over image files
//!
//! Prints `{"status":"success","results":[...]}` with one entry per readable image,
//! in argument order. Unreadable or undecodable files are left out.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};

use firewatch::{analyze_batch, BatchImage, BatchResult};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image files to analyze.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct Output {
    status: &'static str,
    results: Vec<BatchResult>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let images: Vec<BatchImage> = args
        .files
        .iter()
        .filter_map(|path| match std::fs::read(path) {
            Ok(bytes) => Some(BatchImage::new(display_name(path), bytes)),
            Err(err) => {
                log::warn!("skipping {}: {}", path.display(), err);
                None
            }
        })
        .collect();

    let output = Output {
        status: "success",
        results: analyze_batch(&images),
    };
    log::info!(
        "analyzed {} of {} files",
        output.results.len(),
        args.files.len()
    );

    let json = if args.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .map_err(|err| anyhow!("serialize results: {}", err))?;
    println!("{}", json);
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
