//! Event types and the lock-free stream monitor.

use crate::source::SourceId;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Discrete conditions reported by the mixer and the receive pipeline.
///
/// Events are posted with `try_send` on a bounded channel, so producers on
/// the audio thread never block; when the queue is full new events are lost.
#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    VirtualAudioStateChanged {
        enabled: bool,
    },
    ObjectBasedModeChanged {
        enabled: bool,
        max_channels: usize,
    },
    ObjectChannelAssigned {
        source_id: SourceId,
        channel: usize,
    },
    ObjectChannelsExhausted {
        source_id: SourceId,
        max_channels: usize,
    },
    InvalidForcedChannel {
        source_id: SourceId,
        channel: usize,
        listener_count: usize,
    },
    BufferUnderrun {
        buffered: usize,
        capacity: usize,
    },
    BufferReady {
        buffered: usize,
    },
    BufferGrown {
        old_capacity: usize,
        new_capacity: usize,
    },
    FormatChanged {
        sample_rate: u32,
        channels: usize,
        virtual_speakers: usize,
    },
    ReceiverStatusChanged {
        error: bool,
    },
}

impl MixerEvent {
    pub fn source_id(&self) -> Option<SourceId> {
        match self {
            Self::ObjectChannelAssigned { source_id, .. }
            | Self::ObjectChannelsExhausted { source_id, .. }
            | Self::InvalidForcedChannel { source_id, .. } => Some(*source_id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::BufferUnderrun { .. }
                | Self::InvalidForcedChannel { .. }
                | Self::ReceiverStatusChanged { error: true }
        )
    }

    pub fn is_receive_event(&self) -> bool {
        matches!(
            self,
            Self::BufferUnderrun { .. }
                | Self::BufferReady { .. }
                | Self::BufferGrown { .. }
                | Self::FormatChanged { .. }
                | Self::ReceiverStatusChanged { .. }
        )
    }
}

/// Non-blocking producer half of an event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<MixerEvent>,
}

impl EventSender {
    /// Queues an event, dropping it if the queue is full or closed.
    pub fn post(&self, event: MixerEvent) {
        if let Err(TrySendError::Full(event)) = self.sender.try_send(event) {
            log::debug!("Event queue full, dropping {:?}", event);
        }
    }
}

/// Creates a bounded event queue.
pub fn event_channel(capacity: usize) -> (EventSender, Receiver<MixerEvent>) {
    let (sender, receiver) = bounded(capacity.max(1));
    (EventSender { sender }, receiver)
}

/// Maximum number of channels whose levels are published
pub const MONITOR_CHANNELS: usize = 64;

/// Latest output state, published from the audio thread without locking.
///
/// Readers may observe levels from two consecutive ticks mixed together;
/// `sequence` increases once per publish so callers can detect staleness.
#[derive(Debug)]
pub struct StreamMonitor {
    sequence: AtomicU64,
    channels: AtomicUsize,
    levels: [AtomicU32; MONITOR_CHANNELS],
}

impl Default for StreamMonitor {
    fn default() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            channels: AtomicUsize::new(0),
            levels: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }
}

impl StreamMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the channel count and per-channel peak levels of one tick.
    pub fn publish(&self, levels: &[f32]) {
        let count = levels.len().min(MONITOR_CHANNELS);
        for (slot, level) in self.levels.iter().zip(levels) {
            slot.store(level.to_bits(), Ordering::Relaxed);
        }
        for slot in &self.levels[count..] {
            slot.store(0, Ordering::Relaxed);
        }
        self.channels.store(levels.len(), Ordering::Relaxed);
        self.sequence.fetch_add(1, Ordering::Release);
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.load(Ordering::Relaxed)
    }

    pub fn level(&self, channel: usize) -> f32 {
        self.levels
            .get(channel)
            .map(|l| f32::from_bits(l.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Copies the published levels into `out`.
    pub fn levels_into(&self, out: &mut Vec<f32>) {
        out.clear();
        let count = self.channel_count().min(MONITOR_CHANNELS);
        out.extend((0..count).map(|c| self.level(c)));
    }
}
