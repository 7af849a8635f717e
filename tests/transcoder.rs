use std::path::Path;

use loopbox::transcode::{ConversionRequest, Method, TranscodeError, Transcoder};

fn write_tone(path: &Path) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..3200i32 {
        writer.write_sample(((i % 64) * 256 - 8192) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// A transcoder that only searches `dir` for the tool.
fn transcoder_in(dir: &Path) -> Transcoder {
    Transcoder::new("ffmpeg").with_search_path(Some(dir.as_os_str().to_owned()))
}

#[cfg(unix)]
fn install_fake_tool(dir: &Path, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    let tool = dir.join("ffmpeg");
    std::fs::write(&tool, script).unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn missing_source_exits_1_without_output() {
    let work = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let req = ConversionRequest::new(work.path().join("loop.flac"), work.path().join("loop.wav"));

    let err = transcoder_in(bin.path()).convert(&req).await.unwrap_err();
    assert!(matches!(err, TranscodeError::SourceNotFound(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(!req.dst.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn failing_tool_exits_2_and_skips_fallback() {
    let work = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    // $1=-y $2=-i $3=src $4=dst
    install_fake_tool(bin.path(), "#!/bin/sh\necho partial > \"$4\"\nexit 3\n");

    // 源文件本身可以被内置解码器处理，但工具存在时不应该回退
    let req = ConversionRequest::new(work.path().join("loop.wav.in"), work.path().join("loop.wav"));
    write_tone(&req.src);

    let err = transcoder_in(bin.path()).convert(&req).await.unwrap_err();
    assert!(matches!(err, TranscodeError::ToolFailed { .. }), "got {err:?}");
    assert_eq!(err.exit_code(), 2);
    assert!(!req.dst.exists(), "partial output should be removed");
}

#[cfg(unix)]
#[tokio::test]
async fn failing_tool_keeps_preexisting_destination() {
    let work = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    install_fake_tool(bin.path(), "#!/bin/sh\nexit 1\n");

    let req = ConversionRequest::new(work.path().join("in.flac"), work.path().join("out.wav"));
    std::fs::write(&req.src, b"flac").unwrap();
    std::fs::write(&req.dst, b"keep me").unwrap();

    let err = transcoder_in(bin.path()).convert(&req).await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert_eq!(std::fs::read(&req.dst).unwrap(), b"keep me");
}

#[cfg(unix)]
#[tokio::test]
async fn working_tool_is_preferred() {
    let work = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    install_fake_tool(bin.path(), "#!/bin/sh\ncp \"$3\" \"$4\"\n");

    let req = ConversionRequest::new(work.path().join("in.flac"), work.path().join("out.wav"));
    std::fs::write(&req.src, b"not really flac").unwrap();

    let method = transcoder_in(bin.path()).convert(&req).await.unwrap();
    assert_eq!(method, Method::ExternalTool(bin.path().join("ffmpeg")));
    assert_eq!(std::fs::read(&req.dst).unwrap(), b"not really flac");
}

#[tokio::test]
async fn fallback_converts_when_tool_absent() {
    let work = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let req = ConversionRequest::new(work.path().join("in.wav"), work.path().join("out.wav"));
    write_tone(&req.src);

    let method = transcoder_in(bin.path()).convert(&req).await.unwrap();
    assert_eq!(method, Method::Fallback);

    let reader = hound::WavReader::open(&req.dst).unwrap();
    assert_eq!(reader.spec().sample_rate, 16000);
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(reader.len(), 3200);
}

#[tokio::test]
async fn undecodable_source_exits_3() {
    let work = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let req = ConversionRequest::new(work.path().join("in.bin"), work.path().join("out.wav"));
    std::fs::write(&req.src, vec![0x5au8; 4096]).unwrap();

    let err = transcoder_in(bin.path()).convert(&req).await.unwrap_err();
    assert!(matches!(err, TranscodeError::FallbackUnavailable(_)), "got {err:?}");
    assert_eq!(err.exit_code(), 3);
    assert!(!req.dst.exists());
}

#[tokio::test]
async fn unwritable_destination_exits_4() {
    let work = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let req = ConversionRequest::new(
        work.path().join("in.wav"),
        work.path().join("missing-dir").join("out.wav"),
    );
    write_tone(&req.src);

    let err = transcoder_in(bin.path()).convert(&req).await.unwrap_err();
    assert!(matches!(err, TranscodeError::FallbackFailed(_)), "got {err:?}");
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn no_search_path_uses_fallback() {
    let work = tempfile::tempdir().unwrap();
    let req = ConversionRequest::new(work.path().join("in.wav"), work.path().join("out.wav"));
    write_tone(&req.src);

    let transcoder = Transcoder::new("ffmpeg").with_search_path(None);
    assert_eq!(transcoder.locate_tool(), None);
    assert_eq!(transcoder.convert(&req).await.unwrap(), Method::Fallback);
}
