//! Looping ALSA playback.
//!
//! Uses a dedicated std::thread (NOT a tokio task) for the blocking PCM
//! writes; the foreground only waits for Ctrl+C or an error event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use alsa::pcm::{IO, PCM};
use anyhow::Result;
use tokio::sync::mpsc;

use super::alsa_device::{self, AlsaParams};
use super::decode::{f32_to_i16, PcmClip};
use super::loop_cursor::{LoopCursor, LoopEvent};
use super::resample;
use super::{PlaybackError, PlaybackEvent};

/// Period requested from ALSA, in frames.
const PERIOD_FRAMES: usize = 1024;
/// XRUN recoveries in a row before the rest of a period is dropped.
const MAX_RECOVERY_RETRIES: u32 = 3;

pub struct AlsaLooper {
    running: Arc<AtomicBool>,
    play_handle: Option<JoinHandle<()>>,
    device: String,
}

impl AlsaLooper {
    /// Open the output and start looping `clip`, resampled to whatever rate
    /// the device settles on.
    ///
    /// * `selected` - PCM name picked by the device selector, `None` for default
    /// * `fallback` - PCM used when `selected` is absent or rejected
    /// * `rearm`    - how far ahead of the end the next pass is queued
    /// * `events`   - loop boundaries and terminal errors
    pub fn start(
        clip: Arc<PcmClip>,
        selected: Option<&str>,
        fallback: &str,
        rearm: Duration,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<Self> {
        let (pcm, params) = alsa_device::open_playback_or_fallback(
            selected,
            fallback,
            clip.sample_rate,
            clip.channels as u32,
            Some(PERIOD_FRAMES),
        )?;
        let device = params.device.clone();

        // 设备协商出的采样率可能和文件不同，先整体重采样一次
        let clip = resample::adapt_clip(clip, params.sample_rate, params.channels as u16)?;
        let mut cursor = LoopCursor::new(clip, rearm);
        cursor.start()?;

        let running = Arc::new(AtomicBool::new(true));
        let play_handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    if let Err(e) = play_thread(pcm, &params, cursor, &running, &events) {
                        log::error!("Playback thread error: {:#}", e);
                        let _ = events.send(PlaybackEvent::Error(format!("{:#}", e)));
                    }
                })
                .map_err(PlaybackError::Spawn)?
        };

        Ok(Self {
            running,
            play_handle: Some(play_handle),
            device,
        })
    }

    /// PCM actually in use after any fallback.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Signal the writer thread to stop and wait for it.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.play_handle.take() {
            h.join().map_err(|_| PlaybackError::ThreadPanicked)?;
        }
        Ok(())
    }
}

impl Drop for AlsaLooper {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn play_thread(
    pcm: PCM,
    params: &AlsaParams,
    mut cursor: LoopCursor,
    running: &AtomicBool,
    events: &mpsc::UnboundedSender<PlaybackEvent>,
) -> Result<()> {
    let channels = params.channels as usize;
    let io = pcm.io_i16()?;

    let mut float_buf = vec![0f32; params.period_size.max(1) * channels];
    let mut pcm_buf = vec![0i16; float_buf.len()];

    log::info!(
        "Loop playback started: device={}, rate={}, ch={}, period={}",
        params.device,
        params.sample_rate,
        params.channels,
        params.period_size,
    );

    while running.load(Ordering::Relaxed) {
        cursor.fill(&mut float_buf, |event| {
            if let LoopEvent::Wrapped { pass } = event {
                log::debug!("Loop pass {} started", pass);
            }
            let _ = events.send(PlaybackEvent::Loop(event));
        });
        for (dst, &src) in pcm_buf.iter_mut().zip(float_buf.iter()) {
            *dst = f32_to_i16(src);
        }
        write_period(&pcm, &io, &pcm_buf, channels)?;
    }

    cursor.stop()?;
    // 立即停止，不等缓冲区播完
    if let Err(e) = pcm.drop() {
        log::warn!("Failed to drop PCM on stop: {}", e);
    }
    cursor.finish()?;

    log::info!("Playback stopped after {} passes", cursor.pass());
    Ok(())
}

/// Write one period, handling short writes and XRUN recovery.
fn write_period(pcm: &PCM, io: &IO<i16>, data: &[i16], channels: usize) -> Result<()> {
    let total_frames = data.len() / channels;
    let mut frames_written = 0;
    let mut retry_count = 0u32;

    while frames_written < total_frames {
        let offset = frames_written * channels;
        match io.writei(&data[offset..]) {
            Ok(n) => {
                frames_written += n;
                retry_count = 0;
            }
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                retry_count += 1;

                // 恢复失败说明设备已经不可用，终止播放
                pcm.prepare().map_err(|e2| {
                    anyhow::anyhow!("Failed to recover PCM playback: {}", e2)
                })?;

                if retry_count >= MAX_RECOVERY_RETRIES {
                    log::error!(
                        "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                        retry_count,
                        total_frames - frames_written
                    );
                    break;
                }
            }
        }
    }
    Ok(())
}
