//! # voiceclone-rs
//!
//! Turns arbitrary-length text into one synthesized recording by driving a
//! zero-shot voice-cloning engine that only accepts bounded inputs.
//!
//! ## Pipeline
//!
//! - **Segmentation**: text is classified (Chinese or not) and cut into
//!   ordered, length-bounded segments at language-appropriate boundaries
//! - **Dispatch**: segments are synthesized one at a time through a single
//!   engine handle; no two engine calls are ever in flight
//! - **Assembly**: per-segment audio is concatenated and written as WAV, then
//!   transcoded to MP3
//! - **Tracking**: jobs move `pending → processing → completed | failed` in an
//!   in-memory registry that callers poll
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use voiceclone_rs::{
//!     audio::FfmpegTranscoder, config::ServiceConfig, service::SynthesisService,
//!     VoiceSelection,
//! };
//!
//! let config = ServiceConfig::from_env()?;
//! let transcoder = Arc::new(FfmpegTranscoder::new(&config.ffmpeg_bin));
//! let service = SynthesisService::start(config, Box::new(my_engine), transcoder)?;
//!
//! let voice = VoiceSelection::new("女声", "促销");
//! let receipt = service.submit("全友家居年货节，家具买一万送8999元。", voice)?;
//! let snapshot = service.status(&receipt.task_id)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod records;
pub mod registry;
pub mod service;
pub mod text;
pub mod voices;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;

pub use error::{ErrorKind, Result, TtsError};
pub use voices::{VoiceReference, VoiceSelection};

/// A mono block of audio.
///
/// Contains raw f32 audio samples and the sample rate they were produced at.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Reference voice used to condition zero-shot synthesis.
#[derive(Debug, Clone)]
pub struct VoicePrompt {
    /// Transcript of `audio`
    pub text: String,
    pub audio: AudioBuffer,
}

/// Error type returned across the engine seam.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Results yielded by one engine call, in the order the engine produces them.
pub type EngineOutput<'a> =
    Box<dyn Iterator<Item = std::result::Result<AudioBuffer, EngineError>> + 'a>;

/// Common interface for zero-shot voice-cloning engines.
///
/// Engines are stateful and not reentrant: callers must never have two
/// `infer` calls in flight on the same engine, which is why the pipeline
/// takes `&mut self` behind a single lock.
pub trait SynthesisEngine: Send {
    /// Synthesize `text` in the voice described by `prompt`.
    fn infer<'a>(
        &'a mut self,
        text: &'a str,
        prompt: &'a VoicePrompt,
    ) -> std::result::Result<EngineOutput<'a>, EngineError>;

    /// Synthesize `text` and keep only the first result the engine yields.
    ///
    /// Default implementation calls `infer()` and takes one item from it.
    fn synthesize(
        &mut self,
        text: &str,
        prompt: &VoicePrompt,
    ) -> std::result::Result<AudioBuffer, EngineError> {
        let first = self.infer(text, prompt)?.next();
        first.unwrap_or_else(|| Err("engine produced no audio".into()))
    }
}
