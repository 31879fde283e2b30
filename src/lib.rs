pub mod dsp;
pub mod engine;
pub mod error;
pub mod patch;
pub mod playback;

use wasm_bindgen::prelude::*;

pub use dsp::descriptor::{Modifier, SoundDescriptor, SweepRange};
pub use dsp::envelope::{Adsr, Envelope};
pub use dsp::oscillator::Waveform;
pub use dsp::synthesizer::{PcmBuffer, PcmFormat, Synthesizer, Tempo};
pub use engine::{AudioEngine, EngineConfig};
pub use error::{EngineError, EnqueueError, PatchError, PlaybackError, SynthError};
pub use patch::Patch;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the kickloop-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn engine_at(sample_rate: u32) -> Result<AudioEngine, SynthError> {
    AudioEngine::new(EngineConfig {
        sample_rate,
        ..EngineConfig::default()
    })
}

/// Decode a patch and render one cycle of it.
pub fn render_patch(patch_json: &str, sample_rate: u32) -> Result<PcmBuffer, EngineError> {
    let patch = Patch::from_json(patch_json)?;
    Ok(engine_at(sample_rate)?.render_patch(&patch)?)
}

/// WASM-exposed: render a JSON patch to a WAV byte array.
#[wasm_bindgen]
pub fn render_patch_wav(patch_json: &str, sample_rate: u32) -> Result<Vec<u8>, JsValue> {
    let buffer = render_patch(patch_json, sample_rate).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    dsp::renderer::encode_wav(&buffer).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render a JSON patch to interleaved stereo i16 samples
/// for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_patch_samples(patch_json: &str, sample_rate: u32) -> Result<Vec<i16>, JsValue> {
    let buffer = render_patch(patch_json, sample_rate).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(buffer.into_samples())
}

/// WASM-exposed: the patch a fresh editor starts from.
#[wasm_bindgen]
pub fn default_patch() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&Patch::default()).map_err(|e| JsValue::from_str(&format!("{e}")))
}
