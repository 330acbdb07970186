use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::read_wav;
use crate::error::{Result, TtsError};
use crate::VoicePrompt;

/// A caller's choice of voice, before it is checked against the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSelection {
    pub gender: String,
    pub label: String,
}

impl VoiceSelection {
    pub fn new(gender: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            gender: gender.into(),
            label: label.into(),
        }
    }
}

/// A resolved library voice: the prompt recording and its transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceReference {
    pub gender: String,
    pub label: String,
    pub prompt_audio_path: PathBuf,
    pub prompt_text: String,
}

impl VoiceReference {
    /// Decode the prompt recording into the form the engine is conditioned on.
    pub fn load_prompt(&self) -> Result<VoicePrompt> {
        let audio = read_wav(&self.prompt_audio_path)?;
        log::debug!(
            "Loaded prompt {}/{} ({:.2}s at {}Hz)",
            self.gender,
            self.label,
            audio.duration_secs(),
            audio.sample_rate
        );
        Ok(VoicePrompt {
            text: self.prompt_text.clone(),
            audio,
        })
    }
}

/// On-disk library of prompt voices.
///
/// # Directory Layout
///
/// ```text
/// prompt_voice/
/// ├── 女声/
/// │   ├── 促销.wav     # prompt recording
/// │   └── 促销.txt     # its transcript
/// └── 男声/
///     ├── 新闻.wav
///     └── 新闻.txt
/// ```
///
/// A label is only usable when both files exist.
#[derive(Debug, Clone)]
pub struct VoiceLibrary {
    root: PathBuf,
}

impl VoiceLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up the prompt files for `gender` / `label`.
    pub fn resolve(&self, gender: &str, label: &str) -> Result<VoiceReference> {
        check_name("gender", gender)?;
        check_name("voice label", label)?;

        let dir = self.root.join(gender);
        let audio_path = dir.join(format!("{label}.wav"));
        if !audio_path.is_file() {
            return Err(TtsError::NotFound(format!(
                "Voice '{gender}/{label}' (missing {})",
                audio_path.display()
            )));
        }

        let text_path = dir.join(format!("{label}.txt"));
        if !text_path.is_file() {
            return Err(TtsError::NotFound(format!(
                "Transcript for voice '{gender}/{label}' (missing {})",
                text_path.display()
            )));
        }

        let prompt_text = std::fs::read_to_string(&text_path)?.trim().to_string();
        if prompt_text.is_empty() {
            log::warn!("Transcript {} is empty", text_path.display());
        }

        Ok(VoiceReference {
            gender: gender.to_string(),
            label: label.to_string(),
            prompt_audio_path: audio_path,
            prompt_text,
        })
    }

    /// Map every gender directory to the labels that have both prompt files.
    pub fn list_available(&self) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let mut voices = BTreeMap::new();
        if !self.root.is_dir() {
            log::warn!("Voice library {} does not exist", self.root.display());
            return Ok(voices);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(gender) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let mut labels = BTreeSet::new();
            for file in std::fs::read_dir(&path)? {
                let file = file?.path();
                if file.extension().and_then(|e| e.to_str()) != Some("wav") {
                    continue;
                }
                let Some(label) = file.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if file.with_extension("txt").is_file() {
                    labels.insert(label.to_string());
                } else {
                    log::debug!("Skipping {}: no transcript", file.display());
                }
            }

            if !labels.is_empty() {
                voices.insert(gender.to_string(), labels);
            }
        }

        Ok(voices)
    }
}

/// Names are single path components, so lookups stay inside the library.
fn check_name(what: &str, name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TtsError::Input(format!("invalid {what}: {name:?}"))),
    }
}
