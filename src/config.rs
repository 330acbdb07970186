use std::path::PathBuf;

use derive_builder::Builder;

use crate::error::{Result, TtsError};

/// Settings for a [`SynthesisService`](crate::service::SynthesisService).
///
/// Every field has a default, so a builder only needs the values that differ:
///
/// ```rust
/// use voiceclone_rs::config::ServiceConfigBuilder;
///
/// let config = ServiceConfigBuilder::default()
///     .output_dir("/var/lib/voiceclone/output")
///     .max_segment_len(80usize)
///     .build()?;
/// assert_eq!(config.mp3_bitrate, "192k");
/// # Ok::<(), voiceclone_rs::config::ServiceConfigBuilderError>(())
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(default, setter(into))]
pub struct ServiceConfig {
    /// Directory receiving the per-job `.wav` and `.mp3` files.
    pub output_dir: PathBuf,
    /// Voice library root, laid out as `{gender}/{label}.wav` + `{label}.txt`.
    pub voice_library_dir: PathBuf,
    /// JSON file holding confirmed audio records.
    pub records_path: PathBuf,
    /// Upper bound, in characters, of a single engine input.
    pub max_segment_len: usize,
    /// Bitrate handed to the transcoder, e.g. `"192k"`.
    pub mp3_bitrate: String,
    /// Jobs that may wait in the queue before `submit` is refused.
    pub queue_capacity: usize,
    /// Prefix joined with an output file name to form its public URL.
    pub public_url_prefix: String,
    /// Prefix joined with a task id to form its status URL.
    pub status_url_prefix: String,
    /// Transcoder binary.
    pub ffmpeg_bin: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            voice_library_dir: PathBuf::from("prompt_voice"),
            records_path: PathBuf::from("output").join("saved_audios.json"),
            max_segment_len: 100,
            mp3_bitrate: "192k".to_string(),
            queue_capacity: 64,
            public_url_prefix: "/output".to_string(),
            status_url_prefix: "/task_status".to_string(),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by any `VOICECLONE_*` environment variables that are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_var("VOICECLONE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("VOICECLONE_VOICE_DIR") {
            config.voice_library_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("VOICECLONE_RECORDS_PATH") {
            config.records_path = PathBuf::from(v);
        }
        if let Some(v) = env_var("VOICECLONE_MAX_SEGMENT_LEN") {
            config.max_segment_len = parse_usize("VOICECLONE_MAX_SEGMENT_LEN", &v)?;
        }
        if let Some(v) = env_var("VOICECLONE_MP3_BITRATE") {
            config.mp3_bitrate = v;
        }
        if let Some(v) = env_var("VOICECLONE_QUEUE_CAPACITY") {
            config.queue_capacity = parse_usize("VOICECLONE_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = env_var("VOICECLONE_PUBLIC_URL_PREFIX") {
            config.public_url_prefix = v;
        }
        if let Some(v) = env_var("VOICECLONE_STATUS_URL_PREFIX") {
            config.status_url_prefix = v;
        }
        if let Some(v) = env_var("VOICECLONE_FFMPEG") {
            config.ffmpeg_bin = PathBuf::from(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_segment_len == 0 {
            return Err(TtsError::Config("max_segment_len must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(TtsError::Config("queue_capacity must be at least 1".into()));
        }
        if self.mp3_bitrate.trim().is_empty() {
            return Err(TtsError::Config("mp3_bitrate must not be empty".into()));
        }
        Ok(())
    }

    /// Public URL of a file written to `output_dir`.
    pub fn public_url(&self, file_name: &str) -> String {
        join_url(&self.public_url_prefix, file_name)
    }

    /// Polling URL of a task.
    pub fn status_url(&self, task_id: &str) -> String {
        join_url(&self.status_url_prefix, task_id)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| TtsError::Config(format!("{key} must be an integer, got {value:?}")))
}

fn join_url(prefix: &str, tail: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), tail)
}
