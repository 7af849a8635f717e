//! Fit a decoded clip to the output's sample rate and channel count.
//!
//! Done once, before playback starts, so the output callback only copies
//! samples. Rate conversion goes through rubato.

use std::sync::Arc;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use super::decode::PcmClip;
use super::PlaybackError;

/// Return `clip` converted to `rate` Hz and `channels` channels.
///
/// A clip that already matches is handed back as is.
pub fn adapt_clip(
    clip: Arc<PcmClip>,
    rate: u32,
    channels: u16,
) -> Result<Arc<PcmClip>, PlaybackError> {
    if clip.sample_rate == rate && clip.channels == channels {
        return Ok(clip);
    }
    if rate == 0 || channels == 0 {
        return Err(PlaybackError::Resample(format!(
            "invalid output format {} Hz / {} ch",
            rate, channels
        )));
    }

    log::info!(
        "Adapting clip {} Hz/{} ch -> {} Hz/{} ch",
        clip.sample_rate,
        clip.channels,
        rate,
        channels
    );

    let mut planar = remix(&clip, channels);
    if clip.sample_rate != rate {
        planar = resample(planar, clip.sample_rate, rate)?;
    }

    PcmClip::new(rate, channels, interleave(&planar))
        .map(Arc::new)
        .map_err(|e| PlaybackError::Resample(e.to_string()))
}

/// Split into `channels` planar buffers.
///
/// Mono output averages all input channels; otherwise output channel `c`
/// takes input channel `c % inputs`.
fn remix(clip: &PcmClip, channels: u16) -> Vec<Vec<f32>> {
    let inputs = clip.channels as usize;
    let mut planar = vec![Vec::with_capacity(clip.frames()); channels as usize];

    for frame in clip.samples.chunks_exact(inputs) {
        if channels == 1 {
            planar[0].push(frame.iter().sum::<f32>() / inputs as f32);
        } else {
            for (c, out) in planar.iter_mut().enumerate() {
                out.push(frame[c % inputs]);
            }
        }
    }
    planar
}

fn resample(planar: Vec<Vec<f32>>, from: u32, to: u32) -> Result<Vec<Vec<f32>>, PlaybackError> {
    let frames = planar.first().map_or(0, Vec::len);
    let ratio = to as f64 / from as f64;
    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0,
        PolynomialDegree::Septic,
        frames,
        planar.len(),
    )
    .map_err(resample_error)?;

    let delay = resampler.output_delay();
    let mut out = resampler.process(&planar, None).map_err(resample_error)?;
    // 冲刷内部缓冲，把尾部补齐
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(resample_error)?;

    let wanted = (frames as f64 * ratio).round() as usize;
    for (channel, rest) in out.iter_mut().zip(tail) {
        channel.extend(rest);
        channel.drain(..delay.min(channel.len()));
        channel.truncate(wanted);
    }

    log::debug!("Resampled {} frames to {}", frames, wanted);
    Ok(out)
}

fn resample_error(e: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::Resample(e.to_string())
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        samples.extend(planar.iter().map(|channel| channel[i]));
    }
    samples
}
