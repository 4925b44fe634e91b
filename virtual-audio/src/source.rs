//! Registered audio sources and their per-listener weights.

use crate::config::AudioSourceSettings;
use std::collections::BTreeMap;
use std::fmt;

/// Weights below this are snapped to zero while smoothing
pub const WEIGHT_EPSILON: f32 = 0.001;

/// Unique identifier for a registered audio source.
///
/// Ids increase monotonically and are never reused within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

/// Outcome of object channel assignment for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    Assigned { source_id: SourceId, channel: usize },
    /// No free channel; reported once until the source gets a channel
    Exhausted { source_id: SourceId },
}

/// Target weights per output channel plus their smoothed counterpart.
///
/// Both vectors are reserved up front so resizing within that capacity never
/// allocates.
#[derive(Debug, Clone, Default)]
pub struct WeightSet {
    current: Vec<f32>,
    smoothed: Vec<f32>,
}

impl WeightSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            current: Vec::with_capacity(capacity),
            smoothed: Vec::with_capacity(capacity),
        }
    }

    /// Makes room for `channels` weights without touching current values.
    pub fn reserve(&mut self, channels: usize) {
        self.current.reserve(channels.saturating_sub(self.current.len()));
        self.smoothed.reserve(channels.saturating_sub(self.smoothed.len()));
    }

    /// Resizes and zeroes the target weights when the channel count changed.
    /// Returns true if a resize happened.
    pub fn check_len(&mut self, count: usize) -> bool {
        if self.current.len() == count {
            return false;
        }
        if count > self.current.capacity() {
            log::warn!(
                "Weight storage grows beyond its reserved {} channels to {}",
                self.current.capacity(),
                count
            );
        }
        self.current.clear();
        self.current.resize(count, 0.0);
        true
    }

    pub fn current(&self) -> &[f32] {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut [f32] {
        &mut self.current
    }

    pub fn smoothed(&self) -> &[f32] {
        &self.smoothed
    }

    /// Routes everything to `index`.
    pub fn set_one_hot(&mut self, index: usize) {
        for (i, w) in self.current.iter_mut().enumerate() {
            *w = if i == index { 1.0 } else { 0.0 };
        }
    }

    /// Moves smoothed weights towards the targets by `factor` (clamped to
    /// `[0, 1]`). On a length change the targets are adopted directly.
    pub fn update_smoothing(&mut self, factor: f32) {
        if self.smoothed.len() != self.current.len() {
            self.smoothed.clear();
            self.smoothed.extend_from_slice(&self.current);
        }

        let t = factor.clamp(0.0, 1.0);
        for (s, c) in self.smoothed.iter_mut().zip(&self.current) {
            *s += (c - *s) * t;
            if *s < WEIGHT_EPSILON {
                *s = 0.0;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioSourceData {
    pub id: SourceId,
    pub settings: AudioSourceSettings,
    pub weights: WeightSet,
    /// Exclusive output channel in object-based mode
    pub object_based_channel: Option<usize>,
    exhaustion_reported: bool,
    forced_channel_reported: bool,
}

impl AudioSourceData {
    fn new(id: SourceId, settings: AudioSourceSettings, weight_capacity: usize) -> Self {
        Self {
            id,
            settings,
            weights: WeightSet::with_capacity(weight_capacity),
            object_based_channel: None,
            exhaustion_reported: false,
            forced_channel_reported: false,
        }
    }

    /// Marks an invalid forced channel as reported. Returns true the first
    /// time so callers can log once.
    pub fn report_invalid_forced_channel(&mut self) -> bool {
        !std::mem::replace(&mut self.forced_channel_reported, true)
    }
}

#[derive(Debug)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceId, AudioSourceData>,
    next_id: u64,
    weight_capacity: usize,
    used_channels: Vec<bool>,
}

impl SourceRegistry {
    /// `weight_capacity` is reserved per source for its weight vectors;
    /// `channel_capacity` bounds object-based channel bookkeeping.
    pub fn new(weight_capacity: usize, channel_capacity: usize) -> Self {
        Self {
            sources: BTreeMap::new(),
            next_id: 0,
            weight_capacity,
            used_channels: Vec::with_capacity(channel_capacity),
        }
    }

    /// Grows object channel bookkeeping to hold `channels` entries.
    pub fn reserve_channels(&mut self, channels: usize) {
        self.used_channels
            .reserve(channels.saturating_sub(self.used_channels.len()));
    }

    /// Object channels the bookkeeping holds without reallocating.
    pub fn channel_capacity(&self) -> usize {
        self.used_channels.capacity()
    }

    pub fn register(&mut self, settings: AudioSourceSettings) -> SourceId {
        let id = SourceId(self.next_id);
        self.next_id += 1;
        self.sources
            .insert(id, AudioSourceData::new(id, settings, self.weight_capacity));
        log::debug!("Registered audio source {}", id);
        id
    }

    pub fn unregister(&mut self, id: SourceId) -> Option<AudioSourceData> {
        let removed = self.sources.remove(&id);
        match &removed {
            Some(data) => {
                if let Some(channel) = data.object_based_channel {
                    log::debug!("Source {} released object channel {}", id, channel);
                }
            }
            None => log::warn!("Tried to unregister unknown source {}", id),
        }
        removed
    }

    /// Replaces the settings of a source. Returns false for unknown ids.
    pub fn update_settings(&mut self, id: SourceId, settings: AudioSourceSettings) -> bool {
        match self.sources.get_mut(&id) {
            Some(data) => {
                if data.settings.force_to_channel != settings.force_to_channel {
                    data.forced_channel_reported = false;
                }
                data.settings = settings;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: SourceId) -> Option<&AudioSourceData> {
        self.sources.get(&id)
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut AudioSourceData> {
        self.sources.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioSourceData> {
        self.sources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AudioSourceData> {
        self.sources.values_mut()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }

    /// Whether `channel` is held by some source in object-based mode.
    pub fn is_channel_used(&self, channel: usize) -> bool {
        self.used_channels.get(channel).copied().unwrap_or(false)
    }

    /// Gives every unassigned source the lowest free channel below
    /// `max_channels`, in registration order. Assignments at or above
    /// `max_channels` are dropped first.
    ///
    /// `on_change` sees every new assignment, and each source that finds no
    /// free channel once. Returns the number of newly assigned sources.
    pub fn assign_object_channels(
        &mut self,
        max_channels: usize,
        mut on_change: impl FnMut(ChannelAssignment),
    ) -> usize {
        self.used_channels.clear();
        self.used_channels.resize(max_channels, false);

        for data in self.sources.values_mut() {
            match data.object_based_channel {
                Some(channel) if channel < max_channels => self.used_channels[channel] = true,
                Some(channel) => {
                    log::debug!(
                        "Source {} loses object channel {} (limit is now {})",
                        data.id,
                        channel,
                        max_channels
                    );
                    data.object_based_channel = None;
                }
                None => {}
            }
        }

        let mut assigned = 0;
        for data in self.sources.values_mut() {
            if data.object_based_channel.is_some() {
                continue;
            }
            match self.used_channels.iter().position(|used| !used) {
                Some(channel) => {
                    self.used_channels[channel] = true;
                    data.object_based_channel = Some(channel);
                    data.exhaustion_reported = false;
                    assigned += 1;
                    on_change(ChannelAssignment::Assigned {
                        source_id: data.id,
                        channel,
                    });
                }
                None => {
                    if !data.exhaustion_reported {
                        data.exhaustion_reported = true;
                        on_change(ChannelAssignment::Exhausted { source_id: data.id });
                    }
                }
            }
        }
        assigned
    }
}
