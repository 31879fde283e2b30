//! Submission queue shared between the caller and the render callback.
//!
//! The queue owns every submitted buffer until that submission completes,
//! at which point the buffer travels back to the engine inside a
//! [`Completion`] message. Submissions play and complete strictly in the
//! order they were pushed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Sender;

use crate::dsp::synthesizer::PcmBuffer;
use crate::error::PlaybackError;

/// Identifies one enqueued buffer on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(u64);

impl SubmissionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How many times a submission plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Times(u32),
    /// Loops until stopped.
    Infinite,
}

impl Repeat {
    pub fn is_infinite(self) -> bool {
        matches!(self, Repeat::Infinite)
    }
}

/// Why a submission left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// All requested passes were played.
    Finished,
    /// An infinite submission was stopped.
    Stopped,
    /// The device was closed before the submission finished.
    Discarded,
}

/// Completion notice. Carries the buffer back to its owner.
#[derive(Debug)]
pub struct Completion {
    pub id: SubmissionId,
    pub status: CompletionStatus,
    pub buffer: PcmBuffer,
}

#[derive(Debug)]
struct Submission {
    id: SubmissionId,
    buffer: PcmBuffer,
    repeat: Repeat,
    passes: u32,
    cursor: usize,
    stop_requested: bool,
}

/// FIFO of pending submissions plus the completion channel.
#[derive(Debug)]
pub struct SubmissionQueue {
    pending: VecDeque<Submission>,
    next_id: u64,
    completions: Sender<Completion>,
}

impl SubmissionQueue {
    pub fn new(completions: Sender<Completion>) -> Self {
        SubmissionQueue {
            pending: VecDeque::new(),
            next_id: 1,
            completions,
        }
    }

    /// Take ownership of `buffer`. The caller has already validated it.
    pub fn push(&mut self, buffer: PcmBuffer, repeat: Repeat) -> SubmissionId {
        let id = SubmissionId(self.next_id);
        self.next_id += 1;
        self.pending.push_back(Submission {
            id,
            buffer,
            repeat,
            passes: 0,
            cursor: 0,
            stop_requested: false,
        });
        id
    }

    /// Mark an infinite submission to end. It completes the next time the
    /// render callback reaches it.
    pub fn request_stop(&mut self, id: SubmissionId) -> Result<(), PlaybackError> {
        let sub = self
            .find_mut(id)
            .ok_or(PlaybackError::UnknownSubmission(id.get()))?;
        if !sub.repeat.is_infinite() {
            return Err(PlaybackError::NotInfinite(id.get()));
        }
        sub.stop_requested = true;
        Ok(())
    }

    /// Replace the contents of a pending infinite submission in place.
    /// Playback continues from the same position.
    pub fn overwrite(&mut self, id: SubmissionId, samples: &[i16]) -> Result<(), PlaybackError> {
        let sub = self
            .find_mut(id)
            .ok_or(PlaybackError::UnknownSubmission(id.get()))?;
        if !sub.repeat.is_infinite() || sub.stop_requested {
            return Err(PlaybackError::NotLooping);
        }
        let target = sub.buffer.samples_mut();
        if target.len() != samples.len() {
            return Err(PlaybackError::InvalidBuffer(format!(
                "{} samples do not fit a {}-sample loop",
                samples.len(),
                target.len()
            )));
        }
        target.copy_from_slice(samples);
        Ok(())
    }

    pub fn contains(&self, id: SubmissionId) -> bool {
        self.pending.iter().any(|s| s.id == id)
    }

    /// Complete passes played so far by a pending submission.
    pub fn passes(&self, id: SubmissionId) -> Option<u32> {
        self.pending.iter().find(|s| s.id == id).map(|s| s.passes)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Render callback body: copy queued audio into `out`, completing
    /// submissions as they run out. Anything not covered is silence.
    pub fn fill(&mut self, out: &mut [i16]) {
        let mut written = 0;
        while written < out.len() {
            let Some(front) = self.pending.front_mut() else {
                break;
            };
            if front.stop_requested {
                self.complete_front(CompletionStatus::Stopped);
                continue;
            }

            let len = front.buffer.sample_count();
            if len == 0 {
                self.complete_front(CompletionStatus::Finished);
                continue;
            }

            let start = front.cursor;
            let n = (out.len() - written).min(len - start);
            out[written..written + n].copy_from_slice(&front.buffer.samples()[start..start + n]);
            front.cursor += n;
            written += n;

            if front.cursor == len {
                front.cursor = 0;
                front.passes = front.passes.saturating_add(1);
                if let Repeat::Times(times) = front.repeat {
                    if front.passes >= times {
                        self.complete_front(CompletionStatus::Finished);
                    }
                }
            }
        }
        out[written..].fill(0);
    }

    /// Hand every pending buffer back as `Discarded`, in queue order.
    pub fn discard_all(&mut self) {
        while !self.pending.is_empty() {
            self.complete_front(CompletionStatus::Discarded);
        }
    }

    fn find_mut(&mut self, id: SubmissionId) -> Option<&mut Submission> {
        self.pending.iter_mut().find(|s| s.id == id)
    }

    fn complete_front(&mut self, status: CompletionStatus) {
        if let Some(sub) = self.pending.pop_front() {
            log::debug!(
                "Submission {} complete ({status:?}) after {} passes",
                sub.id,
                sub.passes
            );
            // The receiver only goes away with the device; nothing to return to.
            let _ = self.completions.send(Completion {
                id: sub.id,
                status,
                buffer: sub.buffer,
            });
        }
    }
}

/// Cloneable handle to the queue, given to whichever thread renders audio.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    inner: Arc<Mutex<SubmissionQueue>>,
}

impl QueueHandle {
    pub fn new(queue: SubmissionQueue) -> Self {
        QueueHandle {
            inner: Arc::new(Mutex::new(queue)),
        }
    }

    /// Lock the queue. A panic on another thread does not leave the queue
    /// itself inconsistent, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, SubmissionQueue> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fill(&self, out: &mut [i16]) {
        self.lock().fill(out);
    }
}
