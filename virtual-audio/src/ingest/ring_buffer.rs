//! Read-ahead ring buffer between the network thread and the audio callback.
//!
//! Playback starts only once `pull_len * read_ahead` samples are buffered.
//! When a pull finds less than it needs the buffer falls back to waiting,
//! trading a longer gap for fewer intermittent glitches.

use crate::events::{EventSender, MixerEvent};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, RingBuffer};

pub const DEFAULT_READ_AHEAD: usize = 8;

/// Initial capacity in samples; grows with the frame size
pub const DEFAULT_CAPACITY: usize = 1024 * 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    WaitingForBufferFill,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullResult {
    /// The destination holds real samples
    Filled,
    /// Still filling the read-ahead; the destination is silent
    Buffering,
    /// Ran dry while playing; the destination is silent
    Underrun,
}

/// Copy of the buffer state, taken under the lock and logged outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSnapshot {
    pub state: BufferState,
    pub buffered: usize,
    pub capacity: usize,
    pub underruns: u64,
    pub overflows: u64,
}

struct Inner {
    ring: HeapRb<f32>,
    state: BufferState,
    last_pull_len: usize,
    underruns: u64,
    overflows: u64,
}

impl Inner {
    fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            state: self.state,
            buffered: self.ring.occupied_len(),
            capacity: self.ring.capacity().get(),
            underruns: self.underruns,
            overflows: self.overflows,
        }
    }
}

pub struct FrameIngestRingBuffer {
    inner: Mutex<Inner>,
    read_ahead: usize,
    events: Option<EventSender>,
}

impl FrameIngestRingBuffer {
    pub fn new(capacity: usize, read_ahead: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: HeapRb::new(capacity.max(1)),
                state: BufferState::WaitingForBufferFill,
                last_pull_len: 0,
                underruns: 0,
                overflows: 0,
            }),
            read_ahead: read_ahead.max(1),
            events: None,
        }
    }

    /// Reports underruns, readiness and growth through `events`.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn read_ahead(&self) -> usize {
        self.read_ahead
    }

    pub fn state(&self) -> BufferState {
        self.inner.lock().state
    }

    pub fn buffered(&self) -> usize {
        self.inner.lock().ring.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().ring.capacity().get()
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        self.inner.lock().snapshot()
    }

    fn post(&self, event: MixerEvent) {
        if let Some(events) = &self.events {
            events.post(event);
        }
    }

    /// Appends samples from the producer side.
    ///
    /// The buffer is replaced by a larger one, keeping its contents, when it
    /// could not hold `read_ahead` blocks of the current push or pull size.
    /// On overflow the oldest samples are dropped.
    pub fn push(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let (grown, overflowed) = {
            let mut inner = self.inner.lock();
            let required = samples.len().max(inner.last_pull_len) * self.read_ahead;
            let old_capacity = inner.ring.capacity().get();

            let grown = if old_capacity < required {
                let mut ring = HeapRb::new(required);
                let (head, tail) = inner.ring.as_slices();
                ring.push_slice(head);
                ring.push_slice(tail);
                inner.ring = ring;
                Some((old_capacity, required))
            } else {
                None
            };

            let written = inner.ring.push_slice(samples);
            let overflowed = written < samples.len();
            if overflowed {
                inner.ring.push_slice_overwrite(&samples[written..]);
                inner.overflows += 1;
            }
            (grown, overflowed)
        };

        if let Some((old_capacity, new_capacity)) = grown {
            log::debug!(
                "Ingest buffer grown from {} to {} samples",
                old_capacity,
                new_capacity
            );
            self.post(MixerEvent::BufferGrown {
                old_capacity,
                new_capacity,
            });
        }
        if overflowed {
            log::debug!("Ingest buffer overflow, dropped the oldest samples");
        }
    }

    /// Fills `destination` from the consumer side. Anything other than
    /// [`PullResult::Filled`] leaves `destination` zeroed.
    pub fn pull(&self, destination: &mut [f32]) -> PullResult {
        let len = destination.len();
        let (result, became_ready, snapshot) = {
            let mut inner = self.inner.lock();
            inner.last_pull_len = len;

            let mut became_ready = false;
            if inner.state == BufferState::WaitingForBufferFill {
                if inner.ring.occupied_len() >= len * self.read_ahead {
                    inner.state = BufferState::Ready;
                    became_ready = true;
                } else {
                    destination.iter_mut().for_each(|s| *s = 0.0);
                    return PullResult::Buffering;
                }
            }

            let result = if inner.ring.occupied_len() >= len {
                inner.ring.pop_slice(destination);
                PullResult::Filled
            } else {
                inner.state = BufferState::WaitingForBufferFill;
                inner.underruns += 1;
                destination.iter_mut().for_each(|s| *s = 0.0);
                PullResult::Underrun
            };
            (result, became_ready, inner.snapshot())
        };

        if became_ready {
            log::debug!("Ingest buffer ready with {} samples", snapshot.buffered);
            self.post(MixerEvent::BufferReady {
                buffered: snapshot.buffered,
            });
        }
        if result == PullResult::Underrun {
            log::warn!(
                "Audio buffer underrun: requested {} | buffered {} | capacity {}",
                len,
                snapshot.buffered,
                snapshot.capacity
            );
            self.post(MixerEvent::BufferUnderrun {
                buffered: snapshot.buffered,
                capacity: snapshot.capacity,
            });
        }
        result
    }

    /// Drops buffered samples and waits for a fresh read-ahead.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let buffered = inner.ring.occupied_len();
        inner.ring.skip(buffered);
        inner.state = BufferState::WaitingForBufferFill;
    }
}
