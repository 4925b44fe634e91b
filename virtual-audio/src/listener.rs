//! Virtual listeners: speaker positions around the listening origin.
//!
//! A listener's index in the registry is its output channel number, so
//! removal shifts every later listener down by one channel.

use crate::math::{Pose, SphericalCoordinate, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualListener {
    /// Position relative to the origin pose, before rotation
    pub raw_position: Vec3,
    pub volume: f32,
    /// Position relative to the origin, refreshed by
    /// [`ListenerRegistry::refresh_spherical`]
    pub spherical: SphericalCoordinate,
}

impl VirtualListener {
    pub fn new(raw_position: Vec3, volume: f32) -> Self {
        Self {
            raw_position,
            volume,
            spherical: SphericalCoordinate::from_position(raw_position),
        }
    }

    pub fn is_active(&self) -> bool {
        self.volume > 0.0
    }
}

#[derive(Debug)]
pub struct ListenerRegistry {
    listeners: Vec<VirtualListener>,
    origin: Pose,
    dirty: bool,
}

impl ListenerRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            listeners: Vec::with_capacity(capacity),
            origin: Pose::identity(),
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn listeners(&self) -> &[VirtualListener] {
        &self.listeners
    }

    pub fn get(&self, index: usize) -> Option<&VirtualListener> {
        self.listeners.get(index)
    }

    pub fn origin(&self) -> Pose {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Pose) {
        if self.origin != origin {
            self.origin = origin;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Appends a listener and returns its channel index.
    pub fn add(&mut self, raw_position: Vec3, volume: f32) -> usize {
        self.listeners
            .push(VirtualListener::new(raw_position, volume.clamp(0.0, 1.0)));
        self.dirty = true;
        self.listeners.len() - 1
    }

    /// Removes the listener at `index`. Out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Option<VirtualListener> {
        if index >= self.listeners.len() {
            log::warn!(
                "Cannot remove listener {}: only {} listeners registered",
                index,
                self.listeners.len()
            );
            return None;
        }
        self.dirty = true;
        Some(self.listeners.remove(index))
    }

    pub fn clear(&mut self) {
        if !self.listeners.is_empty() {
            self.listeners.clear();
            self.dirty = true;
        }
    }

    /// Moves a listener. Returns true if anything changed.
    pub fn update_position(&mut self, channel: usize, raw_position: Vec3) -> bool {
        match self.listeners.get_mut(channel) {
            Some(listener) if listener.raw_position != raw_position => {
                listener.raw_position = raw_position;
                self.dirty = true;
                true
            }
            Some(_) => false,
            None => {
                log::warn!("Listener channel {} does not exist", channel);
                false
            }
        }
    }

    /// Changes a listener's volume. Returns true if anything changed.
    pub fn update_volume(&mut self, channel: usize, volume: f32) -> bool {
        let volume = volume.clamp(0.0, 1.0);
        match self.listeners.get_mut(channel) {
            Some(listener) if listener.volume != volume => {
                listener.volume = volume;
                self.dirty = true;
                true
            }
            Some(_) => false,
            None => {
                log::warn!("Listener channel {} does not exist", channel);
                false
            }
        }
    }

    /// Listener position with the origin pose applied.
    pub fn transformed_position(&self, channel: usize) -> Option<Vec3> {
        self.listeners
            .get(channel)
            .map(|l| self.origin.transform_point(l.raw_position))
    }

    /// Writes every transformed position into `out`, replacing its contents.
    pub fn transformed_positions_into(&self, out: &mut Vec<Vec3>) {
        out.clear();
        out.extend(
            self.listeners
                .iter()
                .map(|l| self.origin.transform_point(l.raw_position)),
        );
    }

    pub fn positions(&self) -> Vec<Vec3> {
        let mut out = Vec::with_capacity(self.listeners.len());
        self.transformed_positions_into(&mut out);
        out
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.listeners.iter().map(|l| l.volume).collect()
    }

    /// Mean distance of the transformed listeners from the origin position.
    pub fn average_distance(&self) -> f32 {
        if self.listeners.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .listeners
            .iter()
            .map(|l| (self.origin.rotation * l.raw_position).length())
            .sum();
        sum / self.listeners.len() as f32
    }

    /// Recomputes spherical coordinates if anything moved since the last
    /// call. Returns true when a recomputation happened.
    pub fn refresh_spherical(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.dirty = false;

        let rotation = self.origin.rotation;
        for listener in &mut self.listeners {
            listener.spherical = SphericalCoordinate::from_position(rotation * listener.raw_position);
        }
        true
    }
}
