//! Audio output using cpal.
//!
//! The stream callback locks the submission queue and copies straight out
//! of the queued buffers; no intermediate ring buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SupportedStreamConfigRange};

use crate::dsp::synthesizer::PcmFormat;
use crate::error::PlaybackError;

use super::device::OutputBackend;
use super::queue::QueueHandle;

/// The host's default output device.
pub struct CpalOutput {
    name: String,
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    pub fn new() -> Self {
        CpalOutput {
            name: "cpal".to_string(),
            stream: None,
        }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable(e: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::DeviceUnavailable(e.to_string())
}

/// Pick a config range that can play `format` natively, preferring i16.
fn pick_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    format: &PcmFormat,
) -> Option<SupportedStreamConfigRange> {
    let matching: Vec<_> = ranges
        .filter(|r| r.channels() == format.channels)
        .filter(|r| {
            r.min_sample_rate().0 <= format.sample_rate && format.sample_rate <= r.max_sample_rate().0
        })
        .collect();
    [SampleFormat::I16, SampleFormat::F32]
        .into_iter()
        .find_map(|wanted| matching.iter().find(|r| r.sample_format() == wanted).cloned())
}

impl OutputBackend for CpalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, format: PcmFormat, queue: QueueHandle) -> Result<(), PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| unavailable("no default output device"))?;
        if let Ok(name) = device.name() {
            self.name = name;
        }

        let ranges = device.supported_output_configs().map_err(unavailable)?;
        let supported = pick_config(ranges, &format)
            .ok_or_else(|| {
                unavailable(format!(
                    "{} does not support {} Hz/{} ch i16 or f32 output",
                    self.name, format.sample_rate, format.channels
                ))
            })?
            .with_sample_rate(cpal::SampleRate(format.sample_rate));
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let err_fn = |err| log::error!("Audio stream error: {err}");
        let stream = match sample_format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| queue.fill(data),
                err_fn,
                None,
            ),
            SampleFormat::F32 => {
                let mut scratch: Vec<i16> = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0);
                        queue.fill(&mut scratch);
                        for (out, s) in data.iter_mut().zip(&scratch) {
                            *out = s.to_float_sample();
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => return Err(unavailable(format!("unsupported sample format {other:?}"))),
        }
        .map_err(unavailable)?;

        stream.play().map_err(unavailable)?;
        log::debug!("cpal stream started on {} ({sample_format:?})", self.name);
        self.stream = Some(stream);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause stream on {}: {e}", self.name);
            }
            // Dropping the stream joins the callback; the queue is free after this.
            drop(stream);
            log::debug!("cpal stream stopped on {}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    fn picked(ranges: Vec<SupportedStreamConfigRange>) -> Option<(u16, SampleFormat)> {
        pick_config(ranges.into_iter(), &PcmFormat::default()).map(|r| (r.channels(), r.sample_format()))
    }

    #[test]
    fn prefers_i16_over_f32() {
        let ranges = vec![
            range(2, 8000, 96000, SampleFormat::F32),
            range(2, 8000, 96000, SampleFormat::I16),
        ];
        assert_eq!(picked(ranges), Some((2, SampleFormat::I16)));
    }

    #[test]
    fn falls_back_to_f32() {
        let ranges = vec![
            range(2, 8000, 96000, SampleFormat::U16),
            range(2, 44100, 44100, SampleFormat::F32),
        ];
        assert_eq!(picked(ranges), Some((2, SampleFormat::F32)));
    }

    #[test]
    fn rate_and_channels_must_match() {
        let ranges = vec![
            range(2, 48000, 96000, SampleFormat::I16),
            range(1, 8000, 96000, SampleFormat::I16),
            range(2, 8000, 22050, SampleFormat::F32),
        ];
        assert_eq!(picked(ranges), None);

        // An i16 range that misses the rate loses to an f32 range that covers it.
        let ranges = vec![
            range(2, 48000, 48000, SampleFormat::I16),
            range(2, 8000, 192000, SampleFormat::F32),
        ];
        assert_eq!(picked(ranges), Some((2, SampleFormat::F32)));
    }

    #[test]
    fn nothing_offered() {
        assert_eq!(picked(Vec::new()), None);
    }
}
