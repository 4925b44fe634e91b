//! Virtual speakers for received streams with more channels than the device.
//!
//! Each received channel is treated as a speaker placed around the listener
//! and panned onto the device channels with fixed weights.

use crate::config::SpeakerLayout;
use crate::dsp;
use crate::listener::VirtualListener;
use crate::math::{SphericalCoordinate, Vec3};
use crate::panning::azimuth_panning;

/// Default distance of virtual speakers from the listener
pub const DEFAULT_SPEAKER_DISTANCE: f32 = 1.0;

/// Layout used to place `channels` received channels, if one is known.
pub fn layout_for_channels(channels: usize) -> Option<SpeakerLayout> {
    match channels {
        4 => Some(SpeakerLayout::Quad),
        6 => Some(SpeakerLayout::FivePointOne),
        8 => Some(SpeakerLayout::SevenPointOne),
        _ => None,
    }
}

/// Positions of the physical device channels as seen from the listener.
fn device_listeners(channels: usize) -> Vec<VirtualListener> {
    match channels {
        1 => vec![VirtualListener::new(Vec3::Z, 1.0)],
        2 => vec![
            VirtualListener::new(Vec3::NEG_X, 1.0),
            VirtualListener::new(Vec3::X, 1.0),
        ],
        n => (0..n)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::TAU / n as f32;
                VirtualListener::new(Vec3::new(angle.sin(), 0.0, angle.cos()), 1.0)
            })
            .collect(),
    }
}

/// Static mixing matrix from virtual speakers to device channels.
#[derive(Debug, Clone)]
pub struct VirtualSpeakerRenderer {
    input_channels: usize,
    output_channels: usize,
    /// `input_channels * output_channels`, row per virtual speaker
    weights: Vec<f32>,
}

impl VirtualSpeakerRenderer {
    /// Speakers at the origin are spread evenly over every device channel.
    pub fn new(positions: &[Vec3], gains: &[f32], output_channels: usize) -> Self {
        let listeners = device_listeners(output_channels);
        let mut weights = vec![0.0; positions.len() * output_channels];

        for (i, (position, row)) in positions
            .iter()
            .zip(weights.chunks_exact_mut(output_channels.max(1)))
            .enumerate()
        {
            let gain = gains.get(i).copied().unwrap_or(1.0);
            let centered = if position.length() < 1e-4 { 1.0 } else { 0.0 };
            let azimuth = SphericalCoordinate::from_position(*position).azimuth;
            azimuth_panning(&listeners, azimuth, centered, 1.0, row);
            row.iter_mut().for_each(|w| *w *= gain);
        }

        Self {
            input_channels: positions.len(),
            output_channels,
            weights,
        }
    }

    /// Renderer for a standard layout at `distance`, all speakers at unity gain.
    pub fn for_layout(layout: SpeakerLayout, distance: f32, output_channels: usize) -> Self {
        let positions: Vec<Vec3> = layout
            .speakers(distance)
            .iter()
            .map(|s| s.position.into())
            .collect();
        Self::new(&positions, &[], output_channels)
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn weight(&self, input: usize, output: usize) -> f32 {
        self.weights
            .get(input * self.output_channels + output)
            .copied()
            .unwrap_or(0.0)
    }

    /// Renders interleaved speaker frames onto interleaved device frames.
    pub fn render(&self, input: &[f32], output: &mut [f32]) {
        output.iter_mut().for_each(|s| *s = 0.0);
        if self.input_channels == 0 || self.output_channels == 0 {
            return;
        }
        for (in_frame, out_frame) in input
            .chunks_exact(self.input_channels)
            .zip(output.chunks_exact_mut(self.output_channels))
        {
            for (sample, row) in in_frame.iter().zip(self.weights.chunks_exact(self.output_channels)) {
                for (out, weight) in out_frame.iter_mut().zip(row) {
                    *out = dsp::mix_sample(*out, sample * weight);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_supported_layouts() {
        assert_eq!(layout_for_channels(4), Some(SpeakerLayout::Quad));
        assert_eq!(layout_for_channels(6), Some(SpeakerLayout::FivePointOne));
        assert_eq!(layout_for_channels(8), Some(SpeakerLayout::SevenPointOne));
        assert_eq!(layout_for_channels(3), None);
    }

    #[test]
    fn test_quad_to_stereo_sides() {
        let renderer = VirtualSpeakerRenderer::for_layout(SpeakerLayout::Quad, 1.0, 2);
        assert_eq!(renderer.input_channels(), 4);

        // Front left and rear left lean to the left device channel
        assert!(renderer.weight(0, 0) > renderer.weight(0, 1));
        assert!(renderer.weight(2, 0) > renderer.weight(2, 1));
        assert!(renderer.weight(1, 1) > renderer.weight(1, 0));
    }

    #[test]
    fn test_centre_speaker_spreads_evenly() {
        let renderer = VirtualSpeakerRenderer::for_layout(SpeakerLayout::FivePointOne, 1.0, 2);
        // LFE sits at the origin
        assert_relative_eq!(renderer.weight(3, 0), renderer.weight(3, 1), epsilon = 1e-5);
        assert!(renderer.weight(3, 0) > 0.0);
    }

    #[test]
    fn test_render_mono_device() {
        let renderer = VirtualSpeakerRenderer::new(&[Vec3::Z, Vec3::NEG_Z], &[1.0, 0.0], 1);
        let mut out = vec![1.0; 2];
        renderer.render(&[0.5, 0.9, -0.25, 0.9], &mut out);
        assert_relative_eq!(out[0], 0.5, epsilon = 1e-5);
        assert_relative_eq!(out[1], -0.25, epsilon = 1e-5);
    }
}
