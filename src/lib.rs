//! loopbox - audio utilities for a headless playback box
//!
//! - `transcode`: audio file -> WAV via an external tool or the built-in decoder
//! - `device`: output device enumeration (ALSA hints, cpal host)
//! - `select`: index / substring / keyword device resolution
//! - `audio`: decoding and gapless looping playback

pub mod audio;
pub mod config;
pub mod device;
pub mod select;
pub mod transcode;
