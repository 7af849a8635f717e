//! Whole-file decoding into an in-memory PCM clip.
//!
//! Both players and the transcoder fallback decode through symphonia; the
//! clip is small (a loop sample), so it is held entirely in memory.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// No format reader or codec for this input in the current build.
    #[error("unsupported audio input: {0}")]
    Unsupported(String),
    #[error("decode failed: {0}")]
    Failed(String),
    #[error("decoded clip is empty")]
    Empty,
}

impl DecodeError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DecodeError::Unsupported(_))
    }
}

/// Decoded interleaved audio.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmClip {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
}

impl PcmClip {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Result<Self, DecodeError> {
        if channels == 0 || samples.len() < channels as usize {
            return Err(DecodeError::Empty);
        }
        // 截掉不完整的尾帧
        let mut samples = samples;
        samples.truncate(samples.len() - samples.len() % channels as usize);
        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Decode the first audio track of `path` into a [`PcmClip`].
pub fn decode_file(path: &Path) -> Result<PcmClip, DecodeError> {
    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(classify)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::Unsupported("no audio track".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(classify)?;

    let mut sample_rate = params.sample_rate;
    let mut channels = params.channels.map(|c| c.count() as u16);
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Failed(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // 单个坏包跳过即可
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {}: {}", path.display(), e);
            }
            Err(e) => return Err(DecodeError::Failed(e.to_string())),
        }
    }

    let (Some(sample_rate), Some(channels)) = (sample_rate, channels) else {
        return Err(DecodeError::Empty);
    };

    log::info!(
        "Decoded {}: rate={}, channels={}, samples={}",
        path.display(),
        sample_rate,
        channels,
        samples.len(),
    );

    PcmClip::new(sample_rate, channels, samples)
}

fn classify(err: SymphoniaError) -> DecodeError {
    match err {
        SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_string()),
        other => DecodeError::Failed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample(((i % 100) as i16) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_wav_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8000, 2, 400);

        let clip = decode_file(&path).unwrap();
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.frames(), 400);
    }

    #[test]
    fn garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, vec![0x5au8; 4096]).unwrap();

        let err = decode_file(&path).unwrap_err();
        assert!(err.is_unsupported(), "unexpected error: {err}");
    }

    #[test]
    fn missing_file_is_open_error() {
        let err = decode_file(Path::new("/nonexistent/loop.wav")).unwrap_err();
        assert!(matches!(err, DecodeError::Open { .. }));
    }

    #[test]
    fn clip_drops_partial_trailing_frame() {
        let clip = PcmClip::new(44100, 2, vec![0.0; 5]).unwrap();
        assert_eq!(clip.samples.len(), 4);
        assert_eq!(clip.frames(), 2);
        assert!(PcmClip::new(44100, 2, vec![0.0]).is_err());
    }

    #[test]
    fn i16_conversion_clamps() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
    }
}
