use std::time::Duration;

use crate::device::MAX_DEVICES;

#[derive(Debug, Clone)]
pub struct Config {
    // 播放器配置
    pub audio_file: &'static str,
    pub alsa_fallback_device: &'static str,
    pub rearm_ms: u64,
    pub max_devices: usize,

    // 关键字匹配（运行时可被命令行覆盖）
    pub keywords: Vec<String>,

    // 转换器配置
    pub tool: &'static str,
    pub src: &'static str,
    pub dst: &'static str,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        let max_devices = parse_max_devices(env!("PLAYER_MAX_DEVICES"))?;

        Ok(Self {
            audio_file: env!("PLAYER_AUDIO_FILE"),
            alsa_fallback_device: env!("PLAYER_ALSA_FALLBACK_DEVICE"),
            rearm_ms: env!("PLAYER_REARM_MS")
                .parse()
                .map_err(|_| "Failed to parse PLAYER_REARM_MS")?,
            max_devices,

            keywords: split_keywords(env!("MATCHER_KEYWORDS")),

            tool: env!("TRANSCODER_TOOL"),
            src: env!("TRANSCODER_SRC"),
            dst: env!("TRANSCODER_DST"),
        })
    }

    pub fn rearm(&self) -> Duration {
        Duration::from_millis(self.rearm_ms)
    }

    /// Replace the built-in keyword list when the caller supplied one.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        if !keywords.is_empty() {
            self.keywords = keywords;
        }
        self
    }
}

/// 单个数字只能选到 0-9，所以上限是 MAX_DEVICES
fn parse_max_devices(raw: &str) -> Result<usize, &'static str> {
    let max: usize = raw
        .parse()
        .map_err(|_| "Failed to parse PLAYER_MAX_DEVICES")?;
    if max == 0 || max > MAX_DEVICES {
        return Err("PLAYER_MAX_DEVICES must be between 1 and 10");
    }
    Ok(max)
}

fn split_keywords(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keywords_drops_blanks() {
        assert_eq!(split_keywords("USB, ,HDMI,"), vec!["USB", "HDMI"]);
        assert!(split_keywords("").is_empty());
    }

    #[test]
    fn max_devices_stays_within_single_digit_range() {
        assert_eq!(parse_max_devices("10"), Ok(10));
        assert_eq!(parse_max_devices("3"), Ok(3));
        assert!(parse_max_devices("0").is_err());
        assert!(parse_max_devices("11").is_err());
        assert!(parse_max_devices("ten").is_err());
    }

    #[test]
    fn baked_config_parses() {
        let config = Config::new().unwrap();
        assert!((1..=MAX_DEVICES).contains(&config.max_devices));
        assert!(!config.audio_file.is_empty());
    }

    #[test]
    fn empty_override_keeps_builtin_keywords() {
        let config = Config::new().unwrap();
        let builtin = config.keywords.clone();
        let config = config.with_keywords(Vec::new());
        assert_eq!(config.keywords, builtin);
        let config = config.with_keywords(vec!["box".to_string()]);
        assert_eq!(config.keywords, vec!["box"]);
    }
}
