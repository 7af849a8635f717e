//! ALSA PCM device wrappers for playback.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// PCM name that was actually opened
    pub device: String,
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames (one frame = channels × sample_width)
    pub period_size: usize,
}

/// Open the selected PCM for playback, falling back to `fallback` if ALSA rejects it.
///
/// A rejected selection is not fatal; only a failure on the fallback device is.
pub fn open_playback_or_fallback(
    selected: Option<&str>,
    fallback: &str,
    sample_rate: u32,
    channels: u32,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams)> {
    if let Some(device) = selected.filter(|d| *d != fallback) {
        match open_playback(device, sample_rate, channels, period_size) {
            Ok(opened) => return Ok(opened),
            Err(e) => {
                log::warn!(
                    "Output device '{}' rejected ({:#}); using '{}' instead",
                    device,
                    e,
                    fallback
                );
            }
        }
    }
    open_playback(fallback, sample_rate, channels, period_size)
}

/// Open a PCM device for playback.
pub fn open_playback(
    device: &str,
    sample_rate: u32,
    channels: u32,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams)> {
    let pcm = PCM::new(device, Direction::Playback, false)
        .with_context(|| format!("Failed to open PCM device '{}' for Playback", device))?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(channels)
            .with_context(|| format!("Device '{}' does not take {} channels", device, channels))?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        if let Some(ps) = period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, ps)
    };

    let params = AlsaParams {
        device: device.to_string(),
        sample_rate: actual_rate,
        channels: actual_channels,
        period_size,
    };

    log::info!(
        "ALSA Playback: device={}, rate={}, channels={}, period_size={}",
        device,
        actual_rate,
        actual_channels,
        period_size,
    );

    Ok((pcm, params))
}
