//! Built-in speaker layouts.

use super::setup::SpeakerConfig;
use crate::math::Vec3;

/// Standard layouts that can be loaded as virtual listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerLayout {
    Quad,
    /// FL, FR, C, LFE, RL, RR. The LFE sits at the origin with zero volume.
    FivePointOne,
    /// FL, FR, C, LFE, SL, SR, RL, RR
    SevenPointOne,
    /// 32 speakers evenly spaced on a ring, starting straight ahead
    Array32,
}

impl SpeakerLayout {
    pub fn channel_count(&self) -> usize {
        match self {
            Self::Quad => 4,
            Self::FivePointOne => 6,
            Self::SevenPointOne => 8,
            Self::Array32 => 32,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "quad" => Some(Self::Quad),
            "5.1" | "5point1" => Some(Self::FivePointOne),
            "7.1" | "7point1" => Some(Self::SevenPointOne),
            "32" | "array32" => Some(Self::Array32),
            _ => None,
        }
    }

    /// Speaker positions at `distance` from the origin.
    pub fn speakers(&self, distance: f32) -> Vec<SpeakerConfig> {
        let d = distance;
        let at = |x: f32, z: f32| SpeakerConfig::new(Vec3::new(x, 0.0, z), 1.0);
        let lfe = SpeakerConfig::new(Vec3::ZERO, 0.0);

        match self {
            Self::Quad => vec![at(-d, d), at(d, d), at(-d, -d), at(d, -d)],
            Self::FivePointOne => vec![at(-d, d), at(d, d), at(0.0, d), lfe, at(-d, -d), at(d, -d)],
            Self::SevenPointOne => vec![
                at(-d, d),
                at(d, d),
                at(0.0, d),
                lfe,
                at(-d, 0.0),
                at(d, 0.0),
                at(-d, -d),
                at(d, -d),
            ],
            Self::Array32 => (0..32)
                .map(|i| {
                    let angle = i as f32 * std::f32::consts::TAU / 32.0;
                    at(angle.sin() * d, angle.cos() * d)
                })
                .collect(),
        }
    }
}

/// Ring of `count` speakers at `height`, starting at `start_angle_deg`
/// measured from +X towards +Z.
pub fn circle_group(
    radius: f32,
    start_angle_deg: f32,
    height: f32,
    count: usize,
    volume: f32,
) -> Vec<SpeakerConfig> {
    let start = start_angle_deg.to_radians();
    (0..count)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / count as f32 + start;
            SpeakerConfig::new(
                Vec3::new(angle.cos() * radius, height, angle.sin() * radius),
                volume,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_layout_sizes() {
        for layout in [
            SpeakerLayout::Quad,
            SpeakerLayout::FivePointOne,
            SpeakerLayout::SevenPointOne,
            SpeakerLayout::Array32,
        ] {
            assert_eq!(layout.speakers(2.0).len(), layout.channel_count());
        }
    }

    #[test]
    fn test_lfe_is_silent() {
        let speakers = SpeakerLayout::FivePointOne.speakers(1.0);
        assert_eq!(speakers[3].volume, 0.0);
        assert_eq!(speakers[2].position.z, 1.0);
    }

    #[test]
    fn test_array32_first_speaker_is_front() {
        let speakers = SpeakerLayout::Array32.speakers(3.0);
        assert_relative_eq!(speakers[0].position.z, 3.0);
        assert_relative_eq!(speakers[8].position.x, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_circle_group() {
        let ring = circle_group(2.0, 90.0, 1.5, 4, 0.8);
        assert_eq!(ring.len(), 4);
        assert_relative_eq!(ring[0].position.z, 2.0, epsilon = 1e-5);
        assert_relative_eq!(ring[0].position.x, 0.0, epsilon = 1e-5);
        assert!(ring.iter().all(|s| s.position.y == 1.5 && s.volume == 0.8));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(SpeakerLayout::from_name("Quad"), Some(SpeakerLayout::Quad));
        assert_eq!(SpeakerLayout::from_name("7.1"), Some(SpeakerLayout::SevenPointOne));
        assert_eq!(SpeakerLayout::from_name("stereo"), None);
    }
}
