use std::path::{Path, PathBuf};

use crate::error::{Result, TtsError};
use crate::AudioBuffer;

/// The single waveform built from all of a job's segments, as written to disk.
#[derive(Debug, Clone)]
pub struct AssembledAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Lossless WAV holding `samples`
    pub path: PathBuf,
}

impl AssembledAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Concatenate `buffers` along the time axis, preserving their order.
///
/// A single buffer is handed back as-is. Buffers with differing sample rates
/// are rejected rather than resampled.
pub fn concat(mut buffers: Vec<AudioBuffer>) -> Result<AudioBuffer> {
    if buffers.len() == 1 {
        if let Some(only) = buffers.pop() {
            return Ok(only);
        }
    }

    let sample_rate = match buffers.first() {
        Some(first) => first.sample_rate,
        None => return Err(TtsError::Consistency("no audio segments to assemble".into())),
    };

    if let Some((idx, odd)) = buffers
        .iter()
        .enumerate()
        .find(|(_, b)| b.sample_rate != sample_rate)
    {
        return Err(TtsError::Consistency(format!(
            "segment 0 is {sample_rate} Hz but segment {idx} is {} Hz",
            odd.sample_rate
        )));
    }

    let total: usize = buffers.iter().map(|b| b.samples.len()).sum();
    let mut samples = Vec::with_capacity(total);
    for buffer in buffers {
        samples.extend_from_slice(&buffer.samples);
    }

    Ok(AudioBuffer::new(samples, sample_rate))
}

/// Concatenate `buffers` and write the result as WAV at `path`.
pub fn assemble(buffers: Vec<AudioBuffer>, path: &Path) -> Result<AssembledAudio> {
    let count = buffers.len();
    let joined = concat(buffers)?;
    joined.write_wav(path)?;

    log::info!(
        "Assembled {} segment(s) into {:.2}s of audio at {}",
        count,
        joined.duration_secs(),
        path.display()
    );

    Ok(AssembledAudio {
        samples: joined.samples,
        sample_rate: joined.sample_rate,
        path: path.to_path_buf(),
    })
}
