use crate::error::{Result, VirtualAudioError};

/// Configuration descriptor for a [`MixerContext`](crate::MixerContext).
///
/// The capacity fields size every buffer the audio thread touches, so they
/// are fixed for the lifetime of a context.
#[derive(Debug, Clone)]
pub struct MixerDesc {
    /// Sample rate of the audio device driving the mix
    pub sample_rate: u32,
    /// Frames per DSP tick (one device callback)
    pub dsp_buffer_size: usize,
    /// Upper bound on virtual listeners; weight storage is reserved for this many
    pub max_listeners: usize,
    /// Initial channel count used in object-based mode
    pub max_object_based_channels: usize,
    /// How fast smoothed weights chase their targets, per second
    pub smoothing_rate: f32,
    /// Bound of the event queue; events beyond it are dropped
    pub event_capacity: usize,
}

impl Default for MixerDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            dsp_buffer_size: 1024,
            max_listeners: 64,
            max_object_based_channels: 16,
            smoothing_rate: 4.0,
            event_capacity: 256,
        }
    }
}

impl MixerDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn dsp_buffer_size(mut self, size: usize) -> Self {
        self.dsp_buffer_size = size;
        self
    }

    pub fn max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    pub fn max_object_based_channels(mut self, max: usize) -> Self {
        self.max_object_based_channels = max;
        self
    }

    pub fn smoothing_rate(mut self, rate: f32) -> Self {
        self.smoothing_rate = rate;
        self
    }

    /// Duration of one DSP tick in seconds.
    pub fn dsp_tick_duration(&self) -> f32 {
        self.dsp_buffer_size as f32 / self.sample_rate as f32
    }

    /// Largest channel count the shared output buffer must hold.
    pub fn max_output_channels(&self) -> usize {
        self.max_listeners.max(self.max_object_based_channels)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VirtualAudioError::Configuration(
                "Sample rate must be greater than zero".into(),
            ));
        }
        if self.dsp_buffer_size == 0 {
            return Err(VirtualAudioError::Configuration(
                "DSP buffer size must be greater than zero".into(),
            ));
        }
        if self.max_listeners == 0 {
            return Err(VirtualAudioError::Configuration(
                "At least one listener slot is required".into(),
            ));
        }
        if !self.smoothing_rate.is_finite() || self.smoothing_rate < 0.0 {
            return Err(VirtualAudioError::Configuration(format!(
                "Invalid smoothing rate: {}",
                self.smoothing_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desc_is_valid() {
        let desc = MixerDesc::default();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.max_output_channels(), 64);
    }

    #[test]
    fn test_builder_and_tick_duration() {
        let desc = MixerDesc::new().sample_rate(48000).dsp_buffer_size(480);
        assert!((desc.dsp_tick_duration() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_desc() {
        assert!(MixerDesc::new().sample_rate(0).validate().is_err());
        assert!(MixerDesc::new().dsp_buffer_size(0).validate().is_err());
        assert!(MixerDesc::new().max_listeners(0).validate().is_err());
        assert!(MixerDesc::new().smoothing_rate(f32::NAN).validate().is_err());
    }
}
