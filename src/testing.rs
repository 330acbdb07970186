//! Fakes shared by the unit tests: a scripted engine, transcoders that skip
//! ffmpeg, and a one-voice library fixture.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::audio::Transcoder;
use crate::config::{ServiceConfig, ServiceConfigBuilder};
use crate::error::{Result, TtsError};
use crate::{AudioBuffer, EngineError, EngineOutput, SynthesisEngine, VoicePrompt};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Shared view of what a [`FakeEngine`] was asked to do.
#[derive(Clone, Default)]
pub(crate) struct EngineProbe {
    calls: Arc<Mutex<Vec<String>>>,
    windows: Arc<Mutex<Vec<(Instant, Instant)>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl EngineProbe {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Start and end of every engine call, in call order.
    pub(crate) fn windows(&self) -> Vec<(Instant, Instant)> {
        self.windows.lock().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Engine returning `chars * 10` samples per call, optionally slow or failing.
pub(crate) struct FakeEngine {
    probe: EngineProbe,
    delay: Duration,
    fail_on: Option<String>,
    rates: Vec<u32>,
}

impl FakeEngine {
    pub(crate) fn new(probe: EngineProbe) -> Self {
        Self {
            probe,
            delay: Duration::ZERO,
            fail_on: None,
            rates: vec![16000],
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail any call whose text contains `needle`.
    pub(crate) fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Sample rate of call `n` is `rates[n % rates.len()]`.
    pub(crate) fn with_rates(mut self, rates: Vec<u32>) -> Self {
        self.rates = rates;
        self
    }
}

impl SynthesisEngine for FakeEngine {
    fn infer<'a>(
        &'a mut self,
        text: &'a str,
        _prompt: &'a VoicePrompt,
    ) -> std::result::Result<EngineOutput<'a>, EngineError> {
        let started = Instant::now();
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let call_index = {
            let mut calls = self.probe.calls.lock();
            calls.push(text.to_string());
            calls.len() - 1
        };
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.probe.windows.lock().push((started, Instant::now()));

        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(format!("refused segment {text:?}").into());
            }
        }

        let rate = self.rates[call_index % self.rates.len()];
        let samples = vec![call_index as f32 * 0.01; text.chars().count() * 10];
        let audio = AudioBuffer::new(samples, rate);
        Ok(Box::new(std::iter::once(Ok::<_, EngineError>(audio))))
    }
}

/// Stands in for ffmpeg by copying the WAV to an `.mp3` sibling.
pub(crate) struct CopyTranscoder;

impl Transcoder for CopyTranscoder {
    fn transcode(&self, input: &Path, _bitrate: &str) -> Result<PathBuf> {
        let output = input.with_extension("mp3");
        std::fs::copy(input, &output)?;
        Ok(output)
    }
}

pub(crate) struct FailingTranscoder;

impl Transcoder for FailingTranscoder {
    fn transcode(&self, _input: &Path, _bitrate: &str) -> Result<PathBuf> {
        Err(TtsError::Conversion("encoder exited with code Some(1)".into()))
    }
}

/// Add `{gender}/{label}.wav` and its transcript under `root/voices`.
pub(crate) fn add_voice(root: &Path, gender: &str, label: &str) {
    let dir = root.join("voices").join(gender);
    std::fs::create_dir_all(&dir).unwrap();
    AudioBuffer::new(vec![0.0; 1600], 16000)
        .write_wav(&dir.join(format!("{label}.wav")))
        .unwrap();
    std::fs::write(dir.join(format!("{label}.txt")), "全友家居年货节，一站式购齐。").unwrap();
}

pub(crate) fn test_config(root: &Path) -> ServiceConfig {
    ServiceConfigBuilder::default()
        .output_dir(root.join("output"))
        .voice_library_dir(root.join("voices"))
        .records_path(root.join("output").join("saved_audios.json"))
        .max_segment_len(20usize)
        .queue_capacity(8usize)
        .build()
        .unwrap()
}
