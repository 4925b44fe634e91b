//! Shared output buffer the sources mix into.
//!
//! The buffer is planar: channel `c` owns
//! `[c * samples_per_channel, (c + 1) * samples_per_channel)`. In spatial mode
//! a channel is a listener, in object-based mode it is an object slot.

use crate::dsp;
use crate::math::Vec3;

/// Monotonic identifier of one device callback.
///
/// The shared buffer is cleared the first time each tick is seen, so every
/// entry point of the same callback must pass the same tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DspTick(pub u64);

impl DspTick {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug)]
pub struct MixBuffer {
    samples: Vec<f32>,
    channels: usize,
    samples_per_channel: usize,
    last_cleared: Option<DspTick>,
    levels: Vec<f32>,
    object_positions: Vec<Vec3>,
    object_gains: Vec<f32>,
}

impl MixBuffer {
    /// Reserves room for `max_channels` channels of `samples_per_channel`.
    pub fn new(max_channels: usize, samples_per_channel: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_channels * samples_per_channel),
            channels: 0,
            samples_per_channel,
            last_cleared: None,
            levels: Vec::with_capacity(max_channels),
            object_positions: Vec::with_capacity(max_channels),
            object_gains: Vec::with_capacity(max_channels),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    /// Grows storage so `channels` fit without reallocating later.
    pub fn reserve_channels(&mut self, channels: usize) {
        let len = channels * self.samples_per_channel;
        self.samples.reserve(len.saturating_sub(self.samples.len()));
        self.levels.reserve(channels.saturating_sub(self.levels.len()));
        self.object_positions
            .reserve(channels.saturating_sub(self.object_positions.len()));
        self.object_gains
            .reserve(channels.saturating_sub(self.object_gains.len()));
    }

    /// Sets the channel count. Returns true if the layout changed, in which
    /// case the buffer is zeroed.
    pub fn configure(&mut self, channels: usize) -> bool {
        if channels == self.channels {
            return false;
        }
        let len = channels * self.samples_per_channel;
        if len > self.samples.capacity() {
            log::warn!(
                "Mix buffer grows past its reserved {} samples to {} ({} channels)",
                self.samples.capacity(),
                len,
                channels
            );
        }
        log::debug!(
            "Mix buffer reconfigured from {} to {} channels",
            self.channels,
            channels
        );
        self.channels = channels;
        self.samples.clear();
        self.samples.resize(len, 0.0);
        self.levels.clear();
        self.levels.resize(channels, 0.0);
        self.object_positions.clear();
        self.object_positions.resize(channels, Vec3::ZERO);
        self.object_gains.clear();
        self.object_gains.resize(channels, 0.0);
        true
    }

    /// Clears the buffer the first time `tick` is seen. Returns true when a
    /// clear happened.
    pub fn begin_tick(&mut self, tick: DspTick) -> bool {
        if self.last_cleared.is_some_and(|last| last >= tick) {
            return false;
        }
        self.last_cleared = Some(tick);
        self.clear();
        true
    }

    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = (channel * self.samples_per_channel).min(self.samples.len());
        let end = (start + self.samples_per_channel).min(self.samples.len());
        &self.samples[start..end]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        let start = (channel * self.samples_per_channel).min(self.samples.len());
        let end = (start + self.samples_per_channel).min(self.samples.len());
        &mut self.samples[start..end]
    }

    /// Recomputes per-channel peak levels.
    pub fn update_levels(&mut self) {
        let spc = self.samples_per_channel;
        for (level, chunk) in self.levels.iter_mut().zip(self.samples.chunks(spc.max(1))) {
            *level = dsp::peak_level(chunk);
        }
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn levels_mut(&mut self) -> &mut [f32] {
        &mut self.levels
    }

    pub(crate) fn object_metadata_mut(&mut self) -> (&mut [Vec3], &mut [f32]) {
        (&mut self.object_positions, &mut self.object_gains)
    }

    /// Read-only view of a spatial mix.
    pub fn mixed(&self) -> MixedAudio<'_> {
        MixedAudio {
            buffer: &self.samples,
            channels: self.channels,
            samples_per_channel: self.samples_per_channel,
            levels: &self.levels,
        }
    }

    /// Read-only view of object-based output.
    pub fn objects(&self, has_sources: bool) -> ObjectAudio<'_> {
        ObjectAudio {
            buffer: &self.samples,
            samples_per_channel: self.samples_per_channel,
            positions: &self.object_positions,
            gains: &self.object_gains,
            levels: &self.levels,
            has_sources,
        }
    }
}

/// One tick of mixed listener channels.
#[derive(Debug, Clone, Copy)]
pub struct MixedAudio<'a> {
    /// Planar samples, `channels * samples_per_channel` long
    pub buffer: &'a [f32],
    pub channels: usize,
    pub samples_per_channel: usize,
    /// Peak level per channel
    pub levels: &'a [f32],
}

impl<'a> MixedAudio<'a> {
    pub fn channel(&self, channel: usize) -> &'a [f32] {
        let start = channel * self.samples_per_channel;
        self.buffer
            .get(start..start + self.samples_per_channel)
            .unwrap_or(&[])
    }
}

/// One tick of object-based output with its side metadata.
#[derive(Debug, Clone, Copy)]
pub struct ObjectAudio<'a> {
    pub buffer: &'a [f32],
    pub samples_per_channel: usize,
    /// Position of the source on each channel, zero for unused channels
    pub positions: &'a [Vec3],
    /// Gain of the source on each channel, zero for unused channels
    pub gains: &'a [f32],
    pub levels: &'a [f32],
    /// False when no source is registered
    pub has_sources: bool,
}

impl<'a> ObjectAudio<'a> {
    pub fn channels(&self) -> usize {
        self.positions.len()
    }

    pub fn channel(&self, channel: usize) -> &'a [f32] {
        let start = channel * self.samples_per_channel;
        self.buffer
            .get(start..start + self.samples_per_channel)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_sizes_regions() {
        let mut buffer = MixBuffer::new(4, 8);
        assert!(buffer.configure(3));
        assert!(!buffer.configure(3));
        assert_eq!(buffer.as_slice().len(), 24);
        assert_eq!(buffer.channel(2).len(), 8);
        assert_eq!(buffer.levels().len(), 3);
    }

    #[test]
    fn test_clears_once_per_tick() {
        let mut buffer = MixBuffer::new(2, 4);
        buffer.configure(2);
        assert!(buffer.begin_tick(DspTick(1)));
        buffer.channel_mut(1)[0] = 0.5;

        assert!(!buffer.begin_tick(DspTick(1)));
        assert_eq!(buffer.channel(1)[0], 0.5);

        assert!(buffer.begin_tick(DspTick(2)));
        assert_eq!(buffer.channel(1)[0], 0.0);
    }

    #[test]
    fn test_channel_regions_do_not_overlap() {
        let mut buffer = MixBuffer::new(3, 4);
        buffer.configure(3);
        buffer.channel_mut(1).iter_mut().for_each(|s| *s = 1.0);
        assert!(buffer.channel(0).iter().all(|s| *s == 0.0));
        assert!(buffer.channel(2).iter().all(|s| *s == 0.0));
        assert!(buffer.channel(1).iter().all(|s| *s == 1.0));
    }

    #[test]
    fn test_levels_and_views() {
        let mut buffer = MixBuffer::new(2, 2);
        buffer.configure(2);
        buffer.channel_mut(0).copy_from_slice(&[0.1, -0.7]);
        buffer.update_levels();
        assert_eq!(buffer.levels(), &[0.7, 0.0]);

        let mixed = buffer.mixed();
        assert_eq!(mixed.channel(0), &[0.1, -0.7]);
        assert!(mixed.channel(5).is_empty());
    }
}
