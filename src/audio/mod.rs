//! audio - Decoding and looping playback
//!
//! Two output backends share one gapless loop cursor: ALSA (a dedicated
//! writer thread) and cpal (the host's callback thread).

mod alsa_device;
mod alsa_looper;
mod cpal_looper;
pub mod decode;
pub mod loop_cursor;
pub mod resample;

use thiserror::Error;
use tokio::signal;
use tokio::sync::mpsc;

pub use alsa_looper::AlsaLooper;
pub use cpal_looper::CpalLooper;
pub use decode::{decode_file, DecodeError, PcmClip};
pub use loop_cursor::{LoopCursor, LoopEvent, LoopState};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("invalid loop transition {from:?} -> {to:?}")]
    InvalidTransition { from: LoopState, to: LoopState },
    #[error("no audio output device available")]
    NoOutputDevice,
    /// The output stage could not be built on any device.
    #[error("failed to create playback stream: {0}")]
    Stream(String),
    #[error("unsupported output sample format: {0}")]
    SampleFormat(String),
    #[error("playback thread panicked")]
    ThreadPanicked,
    #[error("resampling failed: {0}")]
    Resample(String),
    #[error("failed to spawn playback thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Notifications from the output stage to the foreground loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Loop(LoopEvent),
    /// Unrecoverable backend error; playback has ended.
    Error(String),
}

/// Why the foreground loop stopped waiting.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Interrupted,
    Failed(String),
}

/// Block until Ctrl+C or a terminal playback error, logging loop boundaries meanwhile.
pub async fn wait_for_stop(events: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> StopReason {
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    log::error!("Failed to listen for Ctrl+C: {}", e);
                    return StopReason::Failed(e.to_string());
                }
                println!("Received Ctrl+C, shutting down...");
                return StopReason::Interrupted;
            }

            event = events.recv() => match event {
                Some(PlaybackEvent::Loop(LoopEvent::AboutToFinish { pass })) => {
                    log::debug!("Pass {} about to finish, next pass queued", pass);
                }
                Some(PlaybackEvent::Loop(LoopEvent::Wrapped { pass })) => {
                    log::debug!("Pass {} started", pass);
                }
                Some(PlaybackEvent::Error(message)) => return StopReason::Failed(message),
                None => return StopReason::Failed("playback ended unexpectedly".to_string()),
            }
        }
    }
}

/// Process exit status once playback has been stopped.
///
/// An interrupt is a clean exit even when tearing down the output failed;
/// a terminal playback error exits 1.
pub fn exit_status(reason: StopReason, stopped: Result<(), PlaybackError>) -> u8 {
    // 停止失败不影响退出码
    if let Err(e) = stopped {
        log::warn!("Error while stopping playback: {}", e);
    }
    match reason {
        StopReason::Interrupted => 0,
        StopReason::Failed(message) => {
            eprintln!("Playback error: {}", message);
            1
        }
    }
}
