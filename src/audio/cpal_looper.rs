//! Gapless looping through a cpal output stream.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use tokio::sync::mpsc;

use super::decode::PcmClip;
use super::loop_cursor::LoopCursor;
use super::resample;
use super::{PlaybackError, PlaybackEvent};

pub struct CpalLooper {
    stream: cpal::Stream,
    cursor: Arc<Mutex<LoopCursor>>,
    device: String,
}

impl CpalLooper {
    /// Build an output stream for `clip` and start looping it.
    ///
    /// `selected` is a cpal device name. If it cannot be found, refuses
    /// the stream or fails to start it, the host's default output is used
    /// instead. The stream runs at the device's default config; the clip is
    /// resampled to match.
    pub fn start(
        host: &cpal::Host,
        selected: Option<&str>,
        clip: Arc<PcmClip>,
        rearm: Duration,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<Self, PlaybackError> {
        with_default_fallback(selected, |name| {
            let device = match name {
                Some(name) => find_device(host, name)?,
                None => host
                    .default_output_device()
                    .ok_or(PlaybackError::NoOutputDevice)?,
            };
            Self::start_on(&device, clip.clone(), rearm, &events)
        })
    }

    /// One attempt on one device: build, arm the cursor and play.
    fn start_on(
        device: &cpal::Device,
        clip: Arc<PcmClip>,
        rearm: Duration,
        events: &mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<Self, PlaybackError> {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;
        let config = supported.config();

        let clip = resample::adapt_clip(clip, config.sample_rate.0, config.channels)?;
        let cursor = Arc::new(Mutex::new(LoopCursor::new(clip.clone(), rearm)));

        let (shared, tx) = (cursor.clone(), events.clone());
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(device, &config, shared, tx),
            SampleFormat::I16 => build_stream::<i16>(device, &config, shared, tx),
            SampleFormat::U16 => build_stream::<u16>(device, &config, shared, tx),
            other => Err(PlaybackError::SampleFormat(other.to_string())),
        }?;

        lock(&cursor)?.start()?;
        stream
            .play()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        log::info!(
            "Loop playback started: device={}, rate={}, ch={}, frames={}",
            name,
            clip.sample_rate,
            clip.channels,
            clip.frames(),
        );

        Ok(Self {
            stream,
            cursor,
            device: name,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn passes(&self) -> u64 {
        self.cursor.lock().map(|c| c.pass()).unwrap_or_default()
    }

    /// Stop the stream and release it.
    pub fn stop(self) -> Result<(), PlaybackError> {
        lock(&self.cursor)?.stop()?;
        let paused = self
            .stream
            .pause()
            .map_err(|e| PlaybackError::Stream(e.to_string()));
        let passes = self.passes();
        drop(self.stream);
        lock(&self.cursor)?.finish()?;
        log::info!("Playback stopped after {} passes", passes);
        paused
    }
}

/// Run `attempt` on the selected device, then on the default one (`None`)
/// if the selected device fails at any step.
fn with_default_fallback<T>(
    selected: Option<&str>,
    mut attempt: impl FnMut(Option<&str>) -> Result<T, PlaybackError>,
) -> Result<T, PlaybackError> {
    if let Some(name) = selected {
        match attempt(Some(name)) {
            Ok(started) => return Ok(started),
            Err(e) => log::warn!("Output device '{}' rejected ({}); using default", name, e),
        }
    }
    attempt(None)
}

fn lock(cursor: &Mutex<LoopCursor>) -> Result<MutexGuard<'_, LoopCursor>, PlaybackError> {
    cursor.lock().map_err(|_| PlaybackError::ThreadPanicked)
}

fn find_device(host: &cpal::Host, name: &str) -> Result<cpal::Device, PlaybackError> {
    let mut devices = host
        .output_devices()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;
    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| PlaybackError::Stream(format!("device '{}' not found", name)))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    cursor: Arc<Mutex<LoopCursor>>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let loop_events = events.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                match cursor.lock() {
                    Ok(mut cursor) => cursor.fill(&mut scratch, |event| {
                        let _ = loop_events.send(PlaybackEvent::Loop(event));
                    }),
                    Err(_) => scratch.fill(0.0),
                }
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            move |err| {
                log::error!("Output stream error: {}", err);
                let _ = events.send(PlaybackEvent::Error(err.to_string()));
            },
            None,
        )
        .map_err(|e| PlaybackError::Stream(e.to_string()))
}
