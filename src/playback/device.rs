//! Playback device — owns the submission queue and the output backend.
//!
//! The caller enqueues buffers and asks for loops to stop; the backend
//! pulls audio from the queue on its own thread and completions come back
//! over a channel. Nothing here blocks the caller except the explicit
//! `recv_*` helpers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};

use crate::dsp::synthesizer::{BITS_PER_SAMPLE, PcmBuffer, PcmFormat};
use crate::error::{EnqueueError, PlaybackError};

use super::queue::{Completion, QueueHandle, Repeat, SubmissionId, SubmissionQueue};

/// Something that pulls interleaved i16 audio out of a [`QueueHandle`].
pub trait OutputBackend {
    fn name(&self) -> &str;

    /// Begin rendering `format` audio from `queue`.
    fn start(&mut self, format: PcmFormat, queue: QueueHandle) -> Result<(), PlaybackError>;

    /// Stop rendering. Once this returns the backend no longer reads the
    /// queue. Must be safe to call more than once.
    fn shutdown(&mut self);
}

/// An open output device.
pub struct PlaybackDevice {
    format: PcmFormat,
    queue: QueueHandle,
    completions: Receiver<Completion>,
    backend: Box<dyn OutputBackend>,
}

impl PlaybackDevice {
    /// Open `backend` for `format`. Only 16-bit PCM is accepted.
    pub fn open(format: PcmFormat, mut backend: Box<dyn OutputBackend>) -> Result<Self, PlaybackError> {
        if format.bits_per_sample != BITS_PER_SAMPLE {
            return Err(PlaybackError::DeviceUnavailable(format!(
                "{} bytes per sample is not supported",
                format.bytes_per_sample()
            )));
        }
        format
            .validate()
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

        let (sender, completions) = unbounded();
        let queue = QueueHandle::new(SubmissionQueue::new(sender));
        backend.start(format, queue.clone())?;
        log::info!(
            "Opened {} output: {} Hz, {} channels",
            backend.name(),
            format.sample_rate,
            format.channels
        );

        Ok(PlaybackDevice {
            format,
            queue,
            completions,
            backend,
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Queue `buffer` to play `repeat` times. On rejection the buffer comes
    /// back inside the error, untouched.
    pub fn enqueue(&self, buffer: PcmBuffer, repeat: Repeat) -> Result<SubmissionId, EnqueueError> {
        if let Err(reason) = self.check(&buffer, repeat) {
            log::warn!("Rejected submission: {reason}");
            return Err(EnqueueError { reason, buffer });
        }
        let samples = buffer.sample_count();
        let id = self.queue.lock().push(buffer, repeat);
        log::debug!("Enqueued {id}: {samples} samples, {repeat:?}");
        Ok(id)
    }

    /// Ask an infinite submission to end. The completion arrives later.
    pub fn stop(&self, id: SubmissionId) -> Result<(), PlaybackError> {
        self.queue.lock().request_stop(id)?;
        log::debug!("Stop requested for {id}");
        Ok(())
    }

    /// Overwrite a looping submission's samples while it plays.
    pub fn overwrite(&self, id: SubmissionId, samples: &[i16]) -> Result<(), PlaybackError> {
        self.queue.lock().overwrite(id, samples)
    }

    /// True until the completion for `id` has been sent.
    pub fn is_pending(&self, id: SubmissionId) -> bool {
        self.queue.lock().contains(id)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn try_completion(&self) -> Option<Completion> {
        self.completions.try_recv().ok()
    }

    /// Wait up to `timeout` for the next completion.
    pub fn recv_completion_timeout(&self, timeout: Duration) -> Option<Completion> {
        self.completions.recv_timeout(timeout).ok()
    }

    /// Stop the backend and hand back every buffer still owned by the
    /// device: completions not yet collected, then pending submissions
    /// marked `Discarded`.
    pub fn close(mut self) -> Vec<Completion> {
        self.backend.shutdown();
        self.queue.lock().discard_all();
        let returned: Vec<Completion> = self.completions.try_iter().collect();
        log::info!(
            "Closed {} output, returned {} buffers",
            self.backend.name(),
            returned.len()
        );
        returned
    }

    fn check(&self, buffer: &PcmBuffer, repeat: Repeat) -> Result<(), PlaybackError> {
        if repeat == Repeat::Times(0) {
            return Err(PlaybackError::InvalidRepeatCount);
        }
        if buffer.sample_rate() != self.format.sample_rate || buffer.channels() != self.format.channels {
            return Err(PlaybackError::InvalidBuffer(format!(
                "{} Hz/{} ch buffer on a {} Hz/{} ch device",
                buffer.sample_rate(),
                buffer.channels(),
                self.format.sample_rate,
                self.format.channels
            )));
        }
        if buffer.sample_count() == 0 {
            return Err(PlaybackError::InvalidBuffer("empty buffer".to_string()));
        }
        if buffer.sample_count() % self.format.channels as usize != 0 {
            return Err(PlaybackError::InvalidBuffer(format!(
                "{} samples is not a whole number of frames",
                buffer.sample_count()
            )));
        }
        Ok(())
    }
}

impl Drop for PlaybackDevice {
    fn drop(&mut self) {
        self.backend.shutdown();
    }
}

// ── Manual Backend ──────────────────────────────────────────

/// Backend driven by explicit [`ManualClock::advance`] calls instead of
/// audio hardware. Used for offline rendering and tests.
pub struct ManualOutput {
    slot: Arc<Mutex<Option<QueueHandle>>>,
}

/// Drives a [`ManualOutput`], possibly from another thread.
#[derive(Clone)]
pub struct ManualClock {
    slot: Arc<Mutex<Option<QueueHandle>>>,
}

impl ManualOutput {
    pub fn new() -> (Self, ManualClock) {
        let slot = Arc::new(Mutex::new(None));
        (
            ManualOutput { slot: slot.clone() },
            ManualClock { slot },
        )
    }
}

impl OutputBackend for ManualOutput {
    fn name(&self) -> &str {
        "manual"
    }

    fn start(&mut self, _format: PcmFormat, queue: QueueHandle) -> Result<(), PlaybackError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(queue);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl ManualClock {
    /// Render the next `samples` interleaved samples. Silence once the
    /// device is closed.
    pub fn advance(&self, samples: usize) -> Vec<i16> {
        let mut out = vec![0i16; samples];
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(queue) = slot.as_ref() {
            queue.fill(&mut out);
        }
        out
    }

    pub fn is_running(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::queue::CompletionStatus;

    struct NoDevice;

    impl OutputBackend for NoDevice {
        fn name(&self) -> &str {
            "none"
        }

        fn start(&mut self, _format: PcmFormat, _queue: QueueHandle) -> Result<(), PlaybackError> {
            Err(PlaybackError::DeviceUnavailable("no hardware".to_string()))
        }

        fn shutdown(&mut self) {}
    }

    fn open() -> (PlaybackDevice, ManualClock) {
        let (backend, clock) = ManualOutput::new();
        let device = PlaybackDevice::open(PcmFormat::default(), Box::new(backend)).unwrap();
        (device, clock)
    }

    fn stereo(samples: &[i16]) -> PcmBuffer {
        PcmBuffer::new(samples.to_vec(), 44100, 2)
    }

    #[test]
    fn open_failure_is_device_unavailable() {
        let err = PlaybackDevice::open(PcmFormat::default(), Box::new(NoDevice)).err();
        assert!(matches!(err, Some(PlaybackError::DeviceUnavailable(_))));
    }

    #[test]
    fn open_rejects_non_16_bit() {
        let (backend, clock) = ManualOutput::new();
        let format = PcmFormat {
            bits_per_sample: 8,
            ..PcmFormat::default()
        };
        let err = PlaybackDevice::open(format, Box::new(backend)).err();
        assert!(matches!(err, Some(PlaybackError::DeviceUnavailable(_))));
        assert!(!clock.is_running());
    }

    #[test]
    fn mismatched_buffer_comes_back() {
        let (device, _clock) = open();
        let mono = PcmBuffer::new(vec![1, 2, 3], 44100, 1);
        let err = device.enqueue(mono.clone(), Repeat::Times(1)).unwrap_err();
        assert!(matches!(err.reason, PlaybackError::InvalidBuffer(_)));
        assert_eq!(err.buffer, mono);

        let slow = PcmBuffer::new(vec![1, 2], 22050, 2);
        assert!(device.enqueue(slow, Repeat::Times(1)).is_err());
        let ragged = stereo(&[1, 2, 3]);
        assert!(device.enqueue(ragged, Repeat::Times(1)).is_err());
        let empty = stereo(&[]);
        assert!(device.enqueue(empty, Repeat::Times(1)).is_err());
        let err = device.enqueue(stereo(&[1, 2]), Repeat::Times(0)).unwrap_err();
        assert_eq!(err.reason, PlaybackError::InvalidRepeatCount);
        assert_eq!(device.pending_count(), 0);
    }

    #[test]
    fn repeat_three_yields_one_completion() {
        let (device, clock) = open();
        let id = device.enqueue(stereo(&[1, 2, 3, 4]), Repeat::Times(3)).unwrap();
        for _ in 0..3 {
            assert!(device.try_completion().is_none());
            clock.advance(4);
        }
        let done = device.try_completion().unwrap();
        assert_eq!(done.id, id);
        assert_eq!(done.status, CompletionStatus::Finished);
        assert!(device.try_completion().is_none());
        assert!(!device.is_pending(id));
    }

    #[test]
    fn completion_arrives_from_render_thread() {
        let (device, clock) = open();
        let id = device.enqueue(stereo(&[1, 2]), Repeat::Infinite).unwrap();
        device.stop(id).unwrap();
        assert!(device.is_pending(id), "Stop is not synchronous");

        let render = std::thread::spawn(move || clock.advance(64));
        let done = device
            .recv_completion_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(done.id, id);
        assert_eq!(done.status, CompletionStatus::Stopped);
        assert_eq!(render.join().unwrap(), vec![0i16; 64]);
    }

    #[test]
    fn close_returns_pending_buffers() {
        let (device, clock) = open();
        let a = device.enqueue(stereo(&[1, 2]), Repeat::Times(1)).unwrap();
        let b = device.enqueue(stereo(&[3, 4]), Repeat::Infinite).unwrap();
        clock.advance(2);

        let returned = device.close();
        let ids: Vec<_> = returned.iter().map(|c| (c.id, c.status)).collect();
        assert_eq!(
            ids,
            vec![(a, CompletionStatus::Finished), (b, CompletionStatus::Discarded)]
        );
        assert!(!clock.is_running());
        assert_eq!(clock.advance(4), vec![0; 4]);
    }
}
