//! Loop controller — at most one continuously looping buffer per device.
//!
//! Replacing or stopping a loop only *requests* the old submission to end.
//! Its buffer stays with the device until the completion comes back
//! through [`LoopController::observe`], and only then is it released.

use crate::dsp::synthesizer::PcmBuffer;
use crate::error::{EnqueueError, PlaybackError};

use super::device::PlaybackDevice;
use super::queue::{Completion, Repeat, SubmissionId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopState {
    #[default]
    Idle,
    Looping(SubmissionId),
    /// Stop requested, completion not yet seen.
    Stopping(SubmissionId),
}

#[derive(Debug, Default)]
pub struct LoopController {
    state: LoopState,
    /// Loops that were asked to stop and whose buffers are still on the device.
    retiring: Vec<SubmissionId>,
}

impl LoopController {
    pub fn new() -> Self {
        LoopController::default()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The submission currently looping, if any.
    pub fn current(&self) -> Option<SubmissionId> {
        match self.state {
            LoopState::Looping(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_looping(&self) -> bool {
        self.current().is_some()
    }

    pub fn retiring(&self) -> &[SubmissionId] {
        &self.retiring
    }

    /// Loop `buffer` forever, replacing any current loop.
    ///
    /// The old loop is stopped first; the device's FIFO order guarantees
    /// the new buffer starts only after the old submission has completed.
    pub fn start_loop(
        &mut self,
        device: &PlaybackDevice,
        buffer: PcmBuffer,
    ) -> Result<SubmissionId, EnqueueError> {
        if let LoopState::Looping(old) = self.state {
            self.retire(device, old);
            self.state = LoopState::Stopping(old);
        }
        let id = device.enqueue(buffer, Repeat::Infinite)?;
        log::info!("Loop {id} started");
        self.state = LoopState::Looping(id);
        Ok(id)
    }

    /// Replace the playing loop's samples in place.
    pub fn update_loop(&self, device: &PlaybackDevice, samples: &[i16]) -> Result<(), PlaybackError> {
        let id = self.current().ok_or(PlaybackError::NotLooping)?;
        device.overwrite(id, samples)?;
        log::debug!("Loop {id} updated in place");
        Ok(())
    }

    /// Request the current loop to stop. The state becomes `Idle` once its
    /// completion is observed.
    pub fn stop_loop(&mut self, device: &PlaybackDevice) -> Result<(), PlaybackError> {
        let id = self.current().ok_or(PlaybackError::NotLooping)?;
        self.retire(device, id);
        self.state = LoopState::Stopping(id);
        log::info!("Loop {id} stopping");
        Ok(())
    }

    /// Route a completion. Loop completions are consumed here and their
    /// buffers released; anything else is handed back to the caller.
    pub fn observe(&mut self, completion: Completion) -> Option<Completion> {
        let id = completion.id;
        if let Some(pos) = self.retiring.iter().position(|&r| r == id) {
            self.retiring.swap_remove(pos);
        } else if self.state != LoopState::Looping(id) {
            return Some(completion);
        }

        if matches!(self.state, LoopState::Looping(cur) | LoopState::Stopping(cur) if cur == id) {
            self.state = LoopState::Idle;
        }
        log::debug!(
            "Released loop buffer {id} ({:?}, {} samples)",
            completion.status,
            completion.buffer.sample_count()
        );
        None
    }

    /// Forget everything after the device has been closed and all buffers
    /// were returned.
    pub fn reset(&mut self) {
        self.state = LoopState::Idle;
        self.retiring.clear();
    }

    fn retire(&mut self, device: &PlaybackDevice, id: SubmissionId) {
        match device.stop(id) {
            Ok(()) => self.retiring.push(id),
            // Already completed; its buffer is in the completion channel.
            Err(e) => log::debug!("Loop {id} already ending: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::synthesizer::PcmFormat;
    use crate::playback::device::{ManualClock, ManualOutput};
    use crate::playback::queue::CompletionStatus;

    fn open() -> (PlaybackDevice, ManualClock) {
        let (backend, clock) = ManualOutput::new();
        let device = PlaybackDevice::open(PcmFormat::default(), Box::new(backend)).unwrap();
        (device, clock)
    }

    fn stereo(fill: i16) -> PcmBuffer {
        PcmBuffer::new(vec![fill; 8], 44100, 2)
    }

    fn drain(ctl: &mut LoopController, device: &PlaybackDevice) -> Vec<Completion> {
        std::iter::from_fn(|| device.try_completion())
            .filter_map(|c| ctl.observe(c))
            .collect()
    }

    #[test]
    fn start_and_stop() {
        let (device, clock) = open();
        let mut ctl = LoopController::new();
        assert_eq!(ctl.state(), LoopState::Idle);

        let id = ctl.start_loop(&device, stereo(3)).unwrap();
        assert_eq!(ctl.state(), LoopState::Looping(id));
        assert_eq!(clock.advance(20), vec![3; 20]);

        ctl.stop_loop(&device).unwrap();
        assert_eq!(ctl.state(), LoopState::Stopping(id));
        assert!(device.is_pending(id), "Buffer stays on the device until completion");
        assert!(drain(&mut ctl, &device).is_empty());
        assert_eq!(ctl.state(), LoopState::Stopping(id));

        clock.advance(4);
        assert!(drain(&mut ctl, &device).is_empty());
        assert_eq!(ctl.state(), LoopState::Idle);
        assert!(ctl.retiring().is_empty());
    }

    #[test]
    fn replacing_waits_for_old_completion() {
        let (device, clock) = open();
        let mut ctl = LoopController::new();
        let first = ctl.start_loop(&device, stereo(1)).unwrap();
        clock.advance(4);
        let second = ctl.start_loop(&device, stereo(2)).unwrap();

        assert_eq!(ctl.retiring(), &[first]);
        assert!(device.is_pending(first));
        assert_eq!(ctl.current(), Some(second));

        // Old loop ends, new loop takes over in the same callback.
        assert_eq!(clock.advance(4), vec![2; 4]);
        let done = device.try_completion().unwrap();
        assert_eq!((done.id, done.status), (first, CompletionStatus::Stopped));
        assert_eq!(done.buffer.samples(), &[1; 8]);
        assert!(ctl.observe(done).is_none());
        assert!(ctl.retiring().is_empty());
        assert_eq!(ctl.state(), LoopState::Looping(second));
    }

    #[test]
    fn repeated_cycles_return_every_buffer_intact() {
        let (device, clock) = open();
        let mut ctl = LoopController::new();
        let mut started = Vec::new();
        for round in 0..20i16 {
            started.push((ctl.start_loop(&device, stereo(round)).unwrap(), round));
            if round % 3 == 0 {
                ctl.stop_loop(&device).unwrap();
            }
            if round % 2 == 0 {
                clock.advance(5);
            }
        }
        if ctl.is_looping() {
            ctl.stop_loop(&device).unwrap();
        }
        clock.advance(5);

        let mut returned = Vec::new();
        while let Some(c) = device.try_completion() {
            returned.push((c.id, c.buffer.samples()[0]));
            assert!(ctl.observe(c).is_none());
        }
        assert_eq!(returned, started, "One completion per loop, in order, untouched");
        assert_eq!(ctl.state(), LoopState::Idle);
        assert_eq!(device.pending_count(), 0);
    }

    #[test]
    fn update_requires_loop() {
        let (device, clock) = open();
        let mut ctl = LoopController::new();
        assert_eq!(ctl.update_loop(&device, &[0; 8]), Err(PlaybackError::NotLooping));
        assert_eq!(ctl.stop_loop(&device), Err(PlaybackError::NotLooping));

        ctl.start_loop(&device, stereo(1)).unwrap();
        clock.advance(2);
        ctl.update_loop(&device, &[9; 8]).unwrap();
        assert_eq!(clock.advance(8), vec![9; 8]);
    }

    #[test]
    fn foreign_completions_pass_through() {
        let (device, clock) = open();
        let mut ctl = LoopController::new();
        let once = device.enqueue(stereo(4), Repeat::Times(1)).unwrap();
        clock.advance(8);
        let passed = drain(&mut ctl, &device);
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].id, once);
    }

    #[test]
    fn discarded_loop_goes_idle() {
        let (device, _clock) = open();
        let mut ctl = LoopController::new();
        let id = ctl.start_loop(&device, stereo(1)).unwrap();
        for c in device.close() {
            assert_eq!(c.id, id);
            assert!(ctl.observe(c).is_none());
        }
        assert_eq!(ctl.state(), LoopState::Idle);
    }
}
