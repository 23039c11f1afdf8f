use std::{net::SocketAddr, path::{Path, PathBuf}, sync::Arc};

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use patchseg_rs::{codec, server, Config, OnnxScorer, Pipeline};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP segmentation service
    Serve {
        #[arg(short, long, default_value = "model.onnx")]
        model_path: PathBuf,

        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, default_value_t = 5000)]
        port: u16,

        #[arg(short, long, default_value_t = 0)]
        device_id: i32,
    },
    /// Segment a single image and write the overlay to a file
    Segment {
        input: PathBuf,

        output: PathBuf,

        #[arg(short, long, default_value = "model.onnx")]
        model_path: PathBuf,

        #[arg(short, long, default_value_t = 0)]
        device_id: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // clap's default error exit code is 2; the CLI contract is usage + 1.
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Command::Serve {
            model_path,
            host,
            port,
            device_id,
        } => serve(&model_path, &host, port, device_id).await,
        Command::Segment {
            input,
            output,
            model_path,
            device_id,
        } => segment(&input, &output, &model_path, device_id),
    }
}

async fn serve(model_path: &Path, host: &str, port: u16, device_id: i32) -> Result<()> {
    let pipeline = Arc::new(load_pipeline(model_path, device_id)?);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, server::router(pipeline))
        .await
        .context("server error")?;
    Ok(())
}

fn segment(input: &Path, output: &Path, model_path: &Path, device_id: i32) -> Result<()> {
    let image = codec::read_image(input)
        .with_context(|| format!("Could not read the image file: {}", input.display()))?;

    let pipeline = load_pipeline(model_path, device_id)?;

    info!("segmenting {}", input.display());
    let overlay = pipeline.segment_image(&image)?;
    codec::write_image(output, &overlay)?;
    info!("overlay written to {}", output.display());
    Ok(())
}

/// Model-load failures are fatal: nothing is served and the process exits
/// non-zero before handling any request.
fn load_pipeline(model_path: &Path, device_id: i32) -> Result<Pipeline<OnnxScorer>> {
    ensure!(
        model_path.exists(),
        "Model path does not exist: {}",
        model_path.display()
    );

    let config = Config::default();
    info!("loading model from {}", model_path.display());
    let scorer = OnnxScorer::new(model_path, config, device_id)
        .with_context(|| format!("Error loading model: {}", model_path.display()))?;
    info!("model loaded successfully");

    Ok(Pipeline::new(scorer, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn segment_requires_both_paths() {
        assert!(Cli::try_parse_from(["patchseg-rs", "segment", "input.png"]).is_err());
        assert!(
            Cli::try_parse_from(["patchseg-rs", "segment", "input.png", "output.png"]).is_ok()
        );
    }
}
