//! Audio assembly and distribution encoding.
//!
//! Segment buffers are concatenated into one waveform ([`assemble`]), written
//! as a lossless WAV and then handed to a [`Transcoder`] for MP3 output.

pub mod assemble;
pub mod convert;

use std::path::Path;

pub use assemble::{assemble, concat, AssembledAudio};
pub use convert::{FfmpegTranscoder, Transcoder};

use crate::error::Result;
use crate::AudioBuffer;

/// Read a WAV file into a mono [`AudioBuffer`].
///
/// Integer PCM is scaled to `[-1.0, 1.0)`; multi-channel audio is averaged
/// down to one channel.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}
