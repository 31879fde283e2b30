//! Patch — the voice stack and tempo the UI edits, as JSON.

use serde::{Deserialize, Serialize};

use crate::dsp::descriptor::SoundDescriptor;
use crate::dsp::synthesizer::Tempo;
use crate::error::PatchError;

/// Everything needed to render one loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patch {
    pub tempo: Tempo,
    pub voices: Vec<SoundDescriptor>,
}

impl Default for Patch {
    /// One kick on every beat at 120 BPM.
    fn default() -> Self {
        Patch {
            tempo: Tempo::default(),
            voices: vec![SoundDescriptor::default()],
        }
    }
}

impl Patch {
    pub fn new(tempo: Tempo, voices: Vec<SoundDescriptor>) -> Self {
        Patch { tempo, voices }
    }

    /// Missing fields take their defaults, so `{}` is the default patch.
    pub fn from_json(json: &str) -> Result<Self, PatchError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
