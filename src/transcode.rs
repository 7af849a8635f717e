//! Audio file -> WAV conversion.
//!
//! The external transcoder is preferred. The built-in decoder is only tried
//! when the tool is not on the search path; a tool that is present but fails
//! is a hard failure.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;

use crate::audio::decode::{decode_file, f32_to_i16, DecodeError, PcmClip};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub src: PathBuf,
    pub dst: PathBuf,
}

impl ConversionRequest {
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("{tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },
    #[error("fallback decoder not available: {0}")]
    FallbackUnavailable(#[source] DecodeError),
    #[error("fallback conversion failed: {0}")]
    FallbackFailed(String),
}

impl TranscodeError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            TranscodeError::SourceNotFound(_) => 1,
            TranscodeError::ToolFailed { .. } => 2,
            TranscodeError::FallbackUnavailable(_) => 3,
            TranscodeError::FallbackFailed(_) => 4,
        }
    }
}

/// How a successful conversion was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    ExternalTool(PathBuf),
    Fallback,
}

pub struct Transcoder {
    tool: String,
    search_path: Option<OsString>,
}

impl Transcoder {
    /// Look `tool` up on `PATH`.
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            search_path: env::var_os("PATH"),
        }
    }

    /// Replace the search path (`PATH` syntax); `None` means no tool is ever found.
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn locate_tool(&self) -> Option<PathBuf> {
        find_in_path(&self.tool, self.search_path.as_deref())
    }

    pub async fn convert(&self, req: &ConversionRequest) -> Result<Method, TranscodeError> {
        if !req.src.exists() {
            return Err(TranscodeError::SourceNotFound(req.src.clone()));
        }
        let dst_existed = req.dst.exists();

        let result = match self.locate_tool() {
            Some(tool) => match run_tool(&tool, req).await {
                Ok(()) => Ok(Method::ExternalTool(tool)),
                Err(e) => Err(e),
            },
            None => {
                println!(
                    "{} not found; attempting built-in decoder fallback",
                    self.tool
                );
                let owned = req.clone();
                tokio::task::spawn_blocking(move || convert_fallback(&owned))
                    .await
                    .map_err(|e| TranscodeError::FallbackFailed(e.to_string()))
                    .and_then(|r| r)
                    .map(|_| Method::Fallback)
            }
        };

        // 只清理本次新建的输出文件，不动原来就存在的
        if result.is_err() && !dst_existed && req.dst.exists() {
            match std::fs::remove_file(&req.dst) {
                Ok(()) => log::info!("Removed partial output {}", req.dst.display()),
                Err(e) => {
                    log::warn!("Failed to remove partial output {}: {}", req.dst.display(), e)
                }
            }
        }
        result
    }
}

async fn run_tool(tool: &Path, req: &ConversionRequest) -> Result<(), TranscodeError> {
    log::info!(
        "Executing {} -y -i {} {}",
        tool.display(),
        req.src.display(),
        req.dst.display()
    );

    let status = Command::new(tool)
        .arg("-y")
        .arg("-i")
        .arg(&req.src)
        .arg(&req.dst)
        .status()
        .await
        .map_err(|e| TranscodeError::ToolFailed {
            tool: tool.display().to_string(),
            reason: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(TranscodeError::ToolFailed {
            tool: tool.display().to_string(),
            reason: status.to_string(),
        })
    }
}

fn convert_fallback(req: &ConversionRequest) -> Result<(), TranscodeError> {
    let clip = decode_file(&req.src).map_err(|e| {
        if e.is_unsupported() {
            TranscodeError::FallbackUnavailable(e)
        } else {
            TranscodeError::FallbackFailed(e.to_string())
        }
    })?;
    write_wav(&req.dst, &clip).map_err(|e| TranscodeError::FallbackFailed(e.to_string()))
}

/// Write `clip` as 16-bit PCM WAV.
pub fn write_wav(path: &Path, clip: &PcmClip) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: clip.channels,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in &clip.samples {
        writer.write_sample(f32_to_i16(sample))?;
    }
    writer.finalize()
}

/// Resolve `tool` against a `PATH`-style list. A tool given as a path is checked directly.
pub fn find_in_path(tool: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let as_path = Path::new(tool);
    if as_path.components().count() > 1 {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }

    for dir in env::split_paths(search_path?) {
        let full = dir.join(tool);
        if is_executable(&full) {
            return Some(full);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{tool}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
