use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task;

use loopbox::audio::{self, decode_file, AlsaLooper};
use loopbox::config::Config;
use loopbox::device::{self, AlsaDevices};
use loopbox::select;

/// Loop the WAV file next to this executable on an ALSA output.
#[derive(Parser, Debug)]
#[command(name = "loop-play", version)]
struct Args {
    /// Output device by index (0-9) or a substring of its description.
    /// Prompts on stdin when omitted.
    choice: Option<String>,

    /// List playback devices and exit
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

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("loop-play: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = Config::new().map_err(anyhow::Error::msg)?;
    let source = AlsaDevices::new(config.max_devices);

    if args.list {
        let devices = device::enumerate_or_empty(&source);
        println!("{}", device::render_list(&devices, args.json)?);
        return Ok(ExitCode::SUCCESS);
    }

    // 音频文件与可执行文件放在同一目录
    let audio_path = exe_dir()?.join(config.audio_file);
    if !audio_path.exists() {
        eprintln!("Missing file: {}", audio_path.display());
        return Ok(ExitCode::from(1));
    }

    let devices = device::enumerate_or_empty(&source);
    // 读 stdin 会阻塞，放到阻塞线程池里
    let choice = args.choice;
    let device_id = task::spawn_blocking(move || select::choose_device(&devices, choice.as_deref()))
        .await
        .context("Device selection task failed")?
        .context("Failed to read device selection")?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let fallback = config.alsa_fallback_device;
    let rearm = config.rearm();
    let path = audio_path.clone();
    let mut looper = task::spawn_blocking(move || -> anyhow::Result<AlsaLooper> {
        let clip =
            decode_file(&path).with_context(|| format!("Failed to decode {}", path.display()))?;
        AlsaLooper::start(Arc::new(clip), device_id.as_deref(), fallback, rearm, tx)
    })
    .await
    .context("Playback setup task failed")??;
    println!(
        "Looping {} on '{}'. Press Ctrl+C to stop.",
        audio_path.display(),
        looper.device()
    );

    let reason = audio::wait_for_stop(&mut rx).await;
    let stopped = looper.stop();
    Ok(ExitCode::from(audio::exit_status(reason, stopped)))
}

fn exe_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent()
        .map(PathBuf::from)
        .context("Executable has no parent directory")
}
