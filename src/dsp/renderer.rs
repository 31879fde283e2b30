//! WAV renderer — wraps PCM buffers in a canonical 44-byte RIFF header.

use crate::error::SynthError;

use super::descriptor::SoundDescriptor;
use super::synthesizer::{PcmBuffer, PcmFormat, Synthesizer, Tempo};

/// Size of the canonical PCM WAV header.
pub const WAV_HEADER_LEN: usize = 44;
/// Largest data chunk whose RIFF chunk size (`data + 36`) fits in 32 bits.
pub const MAX_WAV_DATA_BYTES: u32 = u32::MAX - 36;

/// Render `voices` for one cycle straight to WAV bytes.
pub fn render_wav(
    synth: &Synthesizer,
    voices: &[SoundDescriptor],
    tempo: &Tempo,
) -> Result<Vec<u8>, SynthError> {
    let buffer = synth.render(voices, tempo)?;
    encode_wav(&buffer)
}

/// Encode a buffer as a complete WAV file image. Buffers larger than
/// [`MAX_WAV_DATA_BYTES`] cannot be described by the header.
pub fn encode_wav(buffer: &PcmBuffer) -> Result<Vec<u8>, SynthError> {
    let data_size = wav_data_size(buffer.byte_len())?;
    let mut buf = Vec::with_capacity(WAV_HEADER_LEN + buffer.byte_len());
    buf.extend_from_slice(&wav_header(data_size, &buffer.format()));
    for &sample in buffer.samples() {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    Ok(buf)
}

/// `bytes` as a data chunk size, if the container can hold it.
pub fn wav_data_size(bytes: usize) -> Result<u32, SynthError> {
    u32::try_from(bytes)
        .ok()
        .filter(|&size| size <= MAX_WAV_DATA_BYTES)
        .ok_or(SynthError::WavTooLarge { bytes })
}

/// Header for `data_bytes` of sample data in `format`.
pub fn wav_header(data_bytes: u32, format: &PcmFormat) -> [u8; WAV_HEADER_LEN] {
    let bytes_per_sample = format.bytes_per_sample();
    let byte_rate = format.sample_rate * format.channels as u32 * bytes_per_sample as u32;
    let block_align = format.channels * bytes_per_sample;
    let chunk_size = data_bytes.saturating_add(36);

    let mut header = [0u8; WAV_HEADER_LEN];
    let mut put = |offset: usize, bytes: &[u8]| {
        header[offset..offset + bytes.len()].copy_from_slice(bytes);
    };

    // RIFF header
    put(0, b"RIFF");
    put(4, &chunk_size.to_le_bytes());
    put(8, b"WAVE");

    // fmt chunk
    put(12, b"fmt ");
    put(16, &16u32.to_le_bytes());
    put(20, &1u16.to_le_bytes()); // PCM
    put(22, &format.channels.to_le_bytes());
    put(24, &format.sample_rate.to_le_bytes());
    put(28, &byte_rate.to_le_bytes());
    put(32, &block_align.to_le_bytes());
    put(34, &format.bits_per_sample.to_le_bytes());

    // data chunk
    put(36, b"data");
    put(40, &data_bytes.to_le_bytes());

    header
}
