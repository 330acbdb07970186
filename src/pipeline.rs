use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::audio::{self, Transcoder};
use crate::config::ServiceConfig;
use crate::error::{Result, TtsError};
use crate::text::{self, TextSegment};
use crate::voices::{VoiceLibrary, VoiceSelection};
use crate::{AudioBuffer, SynthesisEngine, VoicePrompt};

/// Files and URLs produced by one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub wav_path: PathBuf,
    pub mp3_path: PathBuf,
    pub wav_url: String,
    pub mp3_url: String,
    pub segments: usize,
    pub duration_secs: f64,
}

/// Text-to-file synthesis through one shared engine.
///
/// The engine is owned here and only reachable through a single lock, held
/// for the whole segment loop of a run. Concurrent runs therefore queue on
/// the lock and never interleave engine calls.
pub struct SynthesisPipeline {
    engine: Mutex<Box<dyn SynthesisEngine>>,
    voices: VoiceLibrary,
    transcoder: Arc<dyn Transcoder>,
    config: ServiceConfig,
}

impl SynthesisPipeline {
    pub fn new(
        config: ServiceConfig,
        engine: Box<dyn SynthesisEngine>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            engine: Mutex::new(engine),
            voices: VoiceLibrary::new(config.voice_library_dir.clone()),
            transcoder,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn voices(&self) -> &VoiceLibrary {
        &self.voices
    }

    /// Synthesize `text` in `voice` and write the WAV and MP3 outputs.
    ///
    /// Blocks for the whole run. `on_progress` receives
    /// `(completed_segments, total_segments)`, starting at zero. Files
    /// written before a failure are left where they are.
    pub fn run(
        &self,
        text: &str,
        voice: &VoiceSelection,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<PipelineOutput> {
        if text.trim().is_empty() {
            return Err(TtsError::Input("text is empty".into()));
        }

        let reference = self.voices.resolve(&voice.gender, &voice.label)?;
        let prompt = reference.load_prompt()?;

        let segments = text::segments(text, self.config.max_segment_len);
        log::info!(
            "Synthesizing {} chars as {} segment(s) with voice {}/{}",
            text.chars().count(),
            segments.len(),
            voice.gender,
            voice.label
        );

        let buffers = self.synthesize_segments(&segments, &prompt, &mut on_progress)?;

        std::fs::create_dir_all(&self.config.output_dir)?;
        let wav_name = format!("{}.wav", uuid::Uuid::new_v4());
        let wav_path = self.config.output_dir.join(&wav_name);

        let assembled = audio::assemble(buffers, &wav_path)?;
        let mp3_path = self.transcoder.convert(&assembled, &self.config.mp3_bitrate)?;
        let mp3_name = mp3_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TtsError::Conversion(format!("{} is not a file path", mp3_path.display()))
            })?;

        Ok(PipelineOutput {
            wav_url: self.config.public_url(&wav_name),
            mp3_url: self.config.public_url(&mp3_name),
            wav_path,
            mp3_path,
            segments: segments.len(),
            duration_secs: assembled.duration_secs(),
        })
    }

    fn synthesize_segments(
        &self,
        segments: &[TextSegment],
        prompt: &VoicePrompt,
        on_progress: &mut impl FnMut(usize, usize),
    ) -> Result<Vec<AudioBuffer>> {
        let total = segments.len();
        let mut buffers = Vec::with_capacity(total);

        let mut engine = self.engine.lock();
        on_progress(0, total);

        for segment in segments {
            let started = Instant::now();
            log::debug!(
                "Engine call {}/{}: {} chars",
                segment.index + 1,
                total,
                segment.content.chars().count()
            );

            let audio = engine
                .synthesize(&segment.content, prompt)
                .map_err(|e| {
                    log::error!("Engine failed on segment {}/{}: {e}", segment.index + 1, total);
                    TtsError::Engine(e.to_string())
                })?;

            log::debug!(
                "Segment {}/{} done in {:.2?}: {:.2}s at {}Hz",
                segment.index + 1,
                total,
                started.elapsed(),
                audio.duration_secs(),
                audio.sample_rate
            );
            buffers.push(audio);
            on_progress(segment.index + 1, total);
        }

        Ok(buffers)
    }
}
