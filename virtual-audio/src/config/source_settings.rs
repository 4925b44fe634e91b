use crate::curve::Curve;
use crate::math::Vec3;

/// How volume falls off with distance from the listening origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolloffMode {
    /// `1 / (1 + 2 ln(d / min))`, unity inside `min_distance`
    #[default]
    Logarithmic,
    /// Linear from unity at `min_distance` to silence at `max_distance`
    Linear,
    /// Custom curve evaluated at `d / max_distance`
    Custom,
}

/// Per-source parameters written by the update tick and read by the mixer.
#[derive(Debug, Clone)]
pub struct AudioSourceSettings {
    /// World position of the source
    pub position: Vec3,
    /// 0 plays evenly on every listener, 1 is fully panned
    pub spatial_blend: f32,
    /// Volume multiplier (0.0 = silent, 1.0 = full volume)
    pub volume: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rolloff_mode: RolloffMode,
    /// Used when `rolloff_mode` is [`RolloffMode::Custom`]
    pub custom_rolloff_curve: Option<Curve>,
    /// Scales `spatial_blend` by distance
    pub spatial_blend_curve: Curve,
    /// Routes the source to a single listener channel, bypassing panning
    pub force_to_channel: Option<usize>,
}

impl Default for AudioSourceSettings {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            spatial_blend: 1.0,
            volume: 1.0,
            min_distance: 1.0,
            max_distance: 500.0,
            rolloff_mode: RolloffMode::Logarithmic,
            custom_rolloff_curve: None,
            spatial_blend_curve: Curve::constant(1.0),
            force_to_channel: None,
        }
    }
}

impl AudioSourceSettings {
    /// Fully spatial source at `position`
    pub fn spatial(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Source that plays evenly on every listener
    pub fn non_spatial() -> Self {
        Self {
            spatial_blend: 0.0,
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_spatial_blend(mut self, blend: f32) -> Self {
        self.spatial_blend = blend;
        self
    }

    pub fn with_rolloff(mut self, mode: RolloffMode, min_distance: f32, max_distance: f32) -> Self {
        self.rolloff_mode = mode;
        self.min_distance = min_distance;
        self.max_distance = max_distance;
        self
    }

    pub fn with_custom_rolloff(mut self, curve: Curve, max_distance: f32) -> Self {
        self.rolloff_mode = RolloffMode::Custom;
        self.custom_rolloff_curve = Some(curve);
        self.max_distance = max_distance;
        self
    }

    pub fn with_spatial_blend_curve(mut self, curve: Curve) -> Self {
        self.spatial_blend_curve = curve;
        self
    }

    pub fn forced_to_channel(mut self, channel: usize) -> Self {
        self.force_to_channel = Some(channel);
        self
    }

    /// Returns true if any amount of panning applies
    pub fn is_spatial(&self) -> bool {
        self.spatial_blend > 0.0
    }
}
