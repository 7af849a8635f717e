use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    player: Player,
    matcher: Matcher,
    transcoder: Transcoder,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Player {
    audio_file: String,
    alsa_fallback_device: String,
    rearm_ms: u64,
    max_devices: usize,
}

#[derive(Deserialize)]
struct Matcher {
    keywords: Vec<String>,
}

#[derive(Deserialize)]
struct Transcoder {
    tool: String,
    src: String,
    dst: String,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    if config.matcher.keywords.iter().any(|k| k.contains(',')) {
        panic!("matcher.keywords entries must not contain ','");
    }

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 播放器配置
    println!("cargo:rustc-env=PLAYER_AUDIO_FILE={}", config.player.audio_file);
    println!("cargo:rustc-env=PLAYER_ALSA_FALLBACK_DEVICE={}", config.player.alsa_fallback_device);
    println!("cargo:rustc-env=PLAYER_REARM_MS={}", config.player.rearm_ms);
    println!("cargo:rustc-env=PLAYER_MAX_DEVICES={}", config.player.max_devices);

    // 关键字列表用逗号拼接，运行时再拆开
    println!("cargo:rustc-env=MATCHER_KEYWORDS={}", config.matcher.keywords.join(","));

    // 转换器配置
    println!("cargo:rustc-env=TRANSCODER_TOOL={}", config.transcoder.tool);
    println!("cargo:rustc-env=TRANSCODER_SRC={}", config.transcoder.src);
    println!("cargo:rustc-env=TRANSCODER_DST={}", config.transcoder.dst);
}
