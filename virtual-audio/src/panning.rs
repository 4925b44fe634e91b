//! Source-to-listener weight computation.
//!
//! Panning works in the horizontal plane: the two listeners that bracket the
//! source's azimuth share its signal, then distance and spatial blend shape
//! the result and the weights are normalized to constant power.

use crate::config::{AudioSourceSettings, RolloffMode};
use crate::listener::VirtualListener;
use crate::math::{SphericalCoordinate, Vec3, approximately, clamp01, inverse_lerp, lerp};

/// Headroom constant used when normalizing weights: -6 dB, doubled.
pub fn normalization_headroom() -> f32 {
    10f32.powf(-6.0 / 20.0) * 2.0
}

/// Scene-wide values shared by every source in one weight pass.
#[derive(Debug, Clone, Copy)]
pub struct WeightParams {
    /// Origin position; source azimuths are measured from here
    pub origin: Vec3,
    /// Reference point for distance attenuation, in world space
    pub listener_position: Vec3,
    /// Mean distance of the listeners from the origin
    pub average_listener_distance: f32,
    /// Attenuate by the full distance to `listener_position` instead of the
    /// distance beyond the speaker ring
    pub use_origin_for_attenuation: bool,
    /// Blend nearby sources evenly over all listeners
    pub centered: bool,
}

/// Distance attenuation for the source's rolloff mode.
pub fn distance_attenuation(distance: f32, settings: &AudioSourceSettings) -> f32 {
    match settings.rolloff_mode {
        RolloffMode::Logarithmic => crate::dsp::log_attenuation(distance, settings.min_distance),
        RolloffMode::Linear => clamp01(lerp(
            1.0,
            0.0,
            inverse_lerp(settings.min_distance, settings.max_distance, distance),
        )),
        RolloffMode::Custom => match &settings.custom_rolloff_curve {
            Some(curve) => {
                let t = if settings.max_distance > 0.0 {
                    distance / settings.max_distance
                } else {
                    0.0
                };
                curve.evaluate(t)
            }
            None => 1.0,
        },
    }
}

/// Effective spatial blend after applying the source's blend curve.
pub fn spatial_blend(settings: &AudioSourceSettings, attenuation: f32) -> f32 {
    let t = clamp01(lerp(settings.min_distance, settings.max_distance, attenuation));
    settings.spatial_blend * settings.spatial_blend_curve.evaluate(t)
}

/// How strongly a source spreads evenly over all listeners. Grows
/// quadratically as the source moves inside the speaker ring.
pub fn center_blend(average_listener_distance: f32, source_distance: f32) -> f32 {
    let t = inverse_lerp(average_listener_distance, 1.0, source_distance);
    t * t
}

/// Writes normalized panning weights for a source at `source_azimuth`.
///
/// `weights` must have one slot per listener. Listeners with zero volume
/// never receive signal. With a single active listener the centre blend is
/// forced to 1; with none every weight is zero.
pub fn azimuth_panning(
    listeners: &[VirtualListener],
    source_azimuth: f32,
    center_blend: f32,
    spatial_blend: f32,
    weights: &mut [f32],
) {
    weights.iter_mut().for_each(|w| *w = 0.0);

    let active = listeners.iter().filter(|l| l.is_active()).count();
    if active == 0 {
        return;
    }
    let center_blend = if active == 1 { 1.0 } else { center_blend };

    // Listener on the source's azimuth, nearest listener to its left and
    // nearest to its right
    let mut coincident: Option<usize> = None;
    let mut left: Option<(usize, f32)> = None;
    let mut right: Option<(usize, f32)> = None;
    for (i, listener) in listeners.iter().enumerate() {
        if !listener.is_active() {
            continue;
        }
        let diff = listener.spherical.azimuth_difference_from(source_azimuth);
        if approximately(diff, 0.0) {
            coincident.get_or_insert(i);
            continue;
        }
        if diff < 0.0 && left.is_none_or(|(_, angle)| diff > angle) {
            left = Some((i, diff));
        }
        if diff > 0.0 && right.is_none_or(|(_, angle)| diff < angle) {
            right = Some((i, diff));
        }
    }

    let span = match (left, right) {
        (Some((_, l)), Some((_, r))) => r - l,
        _ => 0.0,
    };
    // A coincident listener takes full weight and its neighbours share the
    // span between them; one-sided neighbours get nothing
    let side_weight = |angle: f32| {
        if coincident.is_some() && span <= 0.0 {
            0.0
        } else {
            1.0 - inverse_lerp(0.0, span, angle.abs())
        }
    };

    let mut sum_squares = 0.0;
    for (i, (listener, weight)) in listeners.iter().zip(weights.iter_mut()).enumerate() {
        let mut w = match (coincident, left, right) {
            (Some(index), _, _) if index == i => 1.0,
            (_, Some((index, angle)), _) if index == i => side_weight(angle),
            (_, _, Some((index, angle))) if index == i => side_weight(angle),
            _ => 0.0,
        };

        w = lerp(w, 1.0 / active as f32, center_blend);
        w = lerp(w, 1.0, 1.0 - spatial_blend);
        w *= listener.volume;

        if w > 0.0 {
            sum_squares += w * w;
        }
        *weight = w;
    }

    if sum_squares <= 0.0 {
        return;
    }
    let a = normalization_headroom();
    let k = a * sum_squares.sqrt();
    for w in weights.iter_mut().filter(|w| **w != 0.0) {
        *w = (*w * a) / k;
    }
}

/// Full weight computation for one source: panning, blend shaping,
/// normalization, then distance attenuation and source volume.
pub fn compute_source_weights(
    listeners: &[VirtualListener],
    settings: &AudioSourceSettings,
    params: &WeightParams,
    weights: &mut [f32],
) {
    let distance = settings.position.distance(params.listener_position);
    let used_distance = if params.use_origin_for_attenuation {
        distance
    } else {
        (distance - params.average_listener_distance).max(0.0)
    };

    let attenuation = distance_attenuation(used_distance, settings);
    let blend = spatial_blend(settings, attenuation);
    let center = if params.centered {
        center_blend(params.average_listener_distance, distance)
    } else {
        0.0
    };

    let source = SphericalCoordinate::from_position(settings.position - params.origin);
    azimuth_panning(listeners, source.azimuth, center, blend, weights);

    let gain = attenuation * settings.volume;
    weights.iter_mut().for_each(|w| *w *= gain);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;
    use approx::assert_relative_eq;

    fn listeners(positions: &[(f32, f32)]) -> Vec<VirtualListener> {
        positions
            .iter()
            .map(|&(x, z)| VirtualListener::new(Vec3::new(x, 0.0, z), 1.0))
            .collect()
    }

    fn params(average: f32) -> WeightParams {
        WeightParams {
            origin: Vec3::ZERO,
            listener_position: Vec3::ZERO,
            average_listener_distance: average,
            use_origin_for_attenuation: false,
            centered: false,
        }
    }

    #[test]
    fn test_stereo_front_back_panning() {
        let ls = listeners(&[(0.0, 1.0), (0.0, -1.0)]);
        let settings = AudioSourceSettings::spatial(Vec3::new(0.0, 0.0, 1.0))
            .with_rolloff(RolloffMode::Linear, 0.0, 10.0);
        let mut weights = [0.0; 2];
        compute_source_weights(&ls, &settings, &params(1.0), &mut weights);
        assert_relative_eq!(weights[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(weights[1], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_quad_coincident_source() {
        let ls = listeners(&[(-1.0, 1.0), (1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]);
        let settings = AudioSourceSettings::spatial(Vec3::new(1.0, 0.0, 1.0))
            .with_rolloff(RolloffMode::Linear, 0.0, 10.0);
        let mut p = params(2.0f32.sqrt());

        // Pre-normalization 1 on the coincident listener, 0.5 on each neighbour
        let norm = 1.5f32.sqrt();
        for centered in [false, true] {
            p.centered = centered;
            let mut weights = [0.0; 4];
            compute_source_weights(&ls, &settings, &p, &mut weights);

            assert_relative_eq!(weights[1], 1.0 / norm, epsilon = 1e-4);
            assert_relative_eq!(weights[0], 0.5 / norm, epsilon = 1e-4);
            assert_relative_eq!(weights[3], 0.5 / norm, epsilon = 1e-4);
            assert_eq!(weights[2], 0.0);
        }
    }

    #[test]
    fn test_coincident_listener_without_both_neighbours() {
        // Only a listener straight behind: no span, so it stays silent
        let ls = listeners(&[(0.0, 1.0), (0.0, -1.0), (0.0, -2.0)]);
        let mut weights = [0.0; 3];
        let front = SphericalCoordinate::from_position(Vec3::Z).azimuth;
        azimuth_panning(&ls, front, 0.0, 1.0, &mut weights);
        assert_relative_eq!(weights[0], 1.0, epsilon = 1e-5);
        assert_eq!(weights[1], 0.0);
        assert_eq!(weights[2], 0.0);
    }

    #[test]
    fn test_source_between_two_listeners_splits_power() {
        let ls = listeners(&[(-1.0, 1.0), (1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]);
        let settings = AudioSourceSettings::spatial(Vec3::new(0.0, 0.0, 3.0))
            .with_rolloff(RolloffMode::Linear, 0.0, 100.0);
        let mut weights = [0.0; 4];
        let mut p = params(0.0);
        p.use_origin_for_attenuation = true;
        p.listener_position = Vec3::new(0.0, 0.0, 3.0);
        compute_source_weights(&ls, &settings, &p, &mut weights);

        assert_relative_eq!(weights[0], weights[1], epsilon = 1e-5);
        assert_relative_eq!(weights[0], std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-4);
        assert_eq!(weights[2], 0.0);
        assert_eq!(weights[3], 0.0);
    }

    #[test]
    fn test_non_spatial_source_is_even() {
        let ls = listeners(&[(-1.0, 1.0), (1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]);
        let mut weights = [0.0; 4];
        azimuth_panning(&ls, 45.0, 0.0, 0.0, &mut weights);
        for w in weights {
            assert_relative_eq!(w, 0.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_single_active_listener_takes_everything() {
        let mut ls = listeners(&[(0.0, 1.0), (0.0, -1.0)]);
        ls[0].volume = 0.0;
        let mut weights = [0.0; 2];
        azimuth_panning(&ls, 0.0, 0.0, 1.0, &mut weights);
        assert_eq!(weights[0], 0.0);
        assert_relative_eq!(weights[1], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_no_active_listeners_yields_zero() {
        let mut ls = listeners(&[(0.0, 1.0)]);
        ls[0].volume = 0.0;
        let mut weights = [7.0; 1];
        azimuth_panning(&ls, 0.0, 0.0, 1.0, &mut weights);
        assert_eq!(weights[0], 0.0);
    }

    #[test]
    fn test_centered_source_spreads_evenly() {
        let ls = listeners(&[(-2.0, 2.0), (2.0, 2.0), (-2.0, -2.0), (2.0, -2.0)]);
        let average = 8.0f32.sqrt();
        // Source at the origin is fully inside the ring
        assert_relative_eq!(center_blend(average, 0.0), 1.0);

        let mut weights = [0.0; 4];
        azimuth_panning(&ls, 10.0, center_blend(average, 0.0), 1.0, &mut weights);
        for w in weights {
            assert_relative_eq!(w, 0.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_weights_never_exceed_unity() {
        let ls = listeners(&[(0.0, 2.0), (1.5, 1.0), (2.0, -1.0), (-0.5, -2.0), (-2.0, 0.3)]);
        for step in 0..72 {
            let az = step as f32 * 5.0;
            for blend in [0.0, 0.3, 1.0] {
                let mut weights = [0.0; 5];
                azimuth_panning(&ls, az, 0.2, blend, &mut weights);
                let power: f32 = weights.iter().map(|w| w * w).sum();
                assert!(weights.iter().all(|w| *w <= 1.0 + 1e-5));
                assert_relative_eq!(power, 1.0, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_distance_attenuation_modes() {
        let linear = AudioSourceSettings::default().with_rolloff(RolloffMode::Linear, 0.0, 10.0);
        assert_relative_eq!(distance_attenuation(5.0, &linear), 0.5);
        assert_eq!(distance_attenuation(20.0, &linear), 0.0);

        let log = AudioSourceSettings::default().with_rolloff(RolloffMode::Logarithmic, 1.0, 10.0);
        assert_eq!(distance_attenuation(0.5, &log), 1.0);
        assert!(distance_attenuation(5.0, &log) < 1.0);

        let custom =
            AudioSourceSettings::default().with_custom_rolloff(Curve::linear(0.0, 1.0, 1.0, 0.0), 10.0);
        assert_relative_eq!(distance_attenuation(2.5, &custom), 0.75, epsilon = 1e-5);

        let mut missing = AudioSourceSettings::default();
        missing.rolloff_mode = RolloffMode::Custom;
        assert_eq!(distance_attenuation(3.0, &missing), 1.0);
    }

    #[test]
    fn test_attenuation_and_volume_scale_weights() {
        let ls = listeners(&[(0.0, 1.0), (0.0, -1.0)]);
        let settings = AudioSourceSettings::spatial(Vec3::new(0.0, 0.0, 6.0))
            .with_volume(0.5)
            .with_rolloff(RolloffMode::Linear, 0.0, 10.0);
        let mut weights = [0.0; 2];
        compute_source_weights(&ls, &settings, &params(1.0), &mut weights);
        // 6 away, 1 beyond the ring: attenuation 0.5, volume 0.5
        assert_relative_eq!(weights[0], 0.25, epsilon = 1e-5);
    }
}
