use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::task;

use loopbox::audio::{self, decode_file, CpalLooper};
use loopbox::config::Config;
use loopbox::device::{self, CpalDevices};
use loopbox::select::{self, Selection};

/// Loop an audio file gaplessly, picking the output whose name matches a keyword.
#[derive(Parser, Debug)]
#[command(name = "loop-match", version)]
struct Args {
    /// Audio file to loop
    #[arg(required_unless_present = "list")]
    file: Option<PathBuf>,

    /// Keyword matched against output device names, tried in order.
    /// Replaces the keywords from config.toml.
    #[arg(short, long = "keyword", env = "LOOPBOX_KEYWORDS", value_delimiter = ',')]
    keywords: Vec<String>,

    /// List output devices and exit
    #[arg(long)]
    list: bool,

    /// Print the device list as JSON (with --list)
    #[arg(long, requires = "list")]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志
    env_logger::init();

    // 缺少参数时 clap 以退出码 2 结束
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("loop-match: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = Config::new()
        .map_err(anyhow::Error::msg)?
        .with_keywords(args.keywords);

    let host = cpal::default_host();
    let source = CpalDevices::new(&host, config.max_devices);
    let devices = device::enumerate_or_empty(&source);

    if args.list {
        println!("{}", device::render_list(&devices, args.json)?);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(file) = args.file else {
        anyhow::bail!("an audio file is required");
    };
    let path = match std::fs::canonicalize(&file) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Cannot open {}: {}", file.display(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let selection = select::match_keywords(&devices, &config.keywords);
    match &selection {
        Selection::Device { index, id } => {
            log::info!("Keyword match: device {} ({})", index, id);
        }
        Selection::Default(reason) => {
            log::info!(
                "No device matched {:?} ({:?}); using default output",
                config.keywords,
                reason
            );
        }
    }

    let decode_path = path.clone();
    let clip = match task::spawn_blocking(move || decode_file(&decode_path)).await? {
        Ok(clip) => Arc::new(clip),
        Err(e) => {
            eprintln!("Failed to decode {}: {}", path.display(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let looper = match CpalLooper::start(&host, selection.device_id(), clip, config.rearm(), tx) {
        Ok(looper) => looper,
        Err(e) => {
            eprintln!("Failed to create playback stream: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    println!(
        "Looping {} on '{}'. Press Ctrl+C to stop.",
        path.display(),
        looper.device()
    );

    let reason = audio::wait_for_stop(&mut rx).await;
    let stopped = looper.stop();
    Ok(ExitCode::from(audio::exit_status(reason, stopped)))
}
