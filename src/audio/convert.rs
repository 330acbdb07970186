use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::assemble::AssembledAudio;
use crate::error::{Result, TtsError};

/// Encodes a lossless file into the distribution codec.
///
/// The input is never removed, whether or not encoding succeeds.
pub trait Transcoder: Send + Sync {
    /// Encode `input` at `bitrate` and return the path of the encoded file.
    fn transcode(&self, input: &Path, bitrate: &str) -> Result<PathBuf>;

    /// Encode an assembled waveform.
    ///
    /// Default implementation calls `transcode()` on the waveform's WAV file.
    fn convert(&self, assembled: &AssembledAudio, bitrate: &str) -> Result<PathBuf> {
        self.transcode(&assembled.path, bitrate)
    }
}

/// MP3 encoding through an external `ffmpeg` process.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    bin: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, input: &Path, bitrate: &str) -> Result<PathBuf> {
        let output_path = input.with_extension("mp3");

        let output = Command::new(&self.bin)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-codec:a", "libmp3lame", "-b:a", bitrate])
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                TtsError::Conversion(format!("failed to run {}: {e}", self.bin.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TtsError::Conversion(format!(
                "{} exited with code {:?}: {}",
                self.bin.display(),
                output.status.code(),
                stderr.trim()
            )));
        }

        log::debug!("Encoded {} -> {}", input.display(), output_path.display());
        Ok(output_path)
    }
}
