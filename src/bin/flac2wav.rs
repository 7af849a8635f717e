use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use loopbox::config::Config;
use loopbox::transcode::{ConversionRequest, Method, Transcoder};

/// Convert FLAC to WAV (loop.flac -> loop.wav).
///
/// Uses the external transcoder when it is on PATH, otherwise the built-in decoder.
#[derive(Parser, Debug)]
#[command(name = "flac2wav", version)]
struct Args {
    /// Source file (default: loop.flac)
    src: Option<PathBuf>,

    /// Destination file (default: loop.wav)
    dst: Option<PathBuf>,

    /// Transcoder executable to look for on PATH (default: ffmpeg)
    #[arg(long)]
    tool: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志
    env_logger::init();

    let args = Args::parse();
    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("flac2wav: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let req = ConversionRequest::new(
        args.src.unwrap_or_else(|| PathBuf::from(config.src)),
        args.dst.unwrap_or_else(|| PathBuf::from(config.dst)),
    );
    let transcoder = Transcoder::new(args.tool.unwrap_or_else(|| config.tool.to_string()));

    match transcoder.convert(&req).await {
        Ok(method) => {
            let via = match method {
                Method::ExternalTool(tool) => tool.display().to_string(),
                Method::Fallback => "built-in decoder".to_string(),
            };
            log::info!(
                "Converted {} -> {} via {}",
                req.src.display(),
                req.dst.display(),
                via
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
