//! Sample-level helpers used on the audio thread.
//!
//! Nothing in here allocates; every function writes into caller-provided
//! slices so it can run inside a device callback.

/// Combines two samples without the loudness build-up of plain addition.
///
/// Samples with the same sign keep the one with the larger magnitude, samples
/// with opposite signs are summed.
#[inline]
pub fn mix_sample(a: f32, b: f32) -> f32 {
    if a >= 0.0 && b >= 0.0 {
        a.max(b)
    } else if a <= 0.0 && b <= 0.0 {
        a.min(b)
    } else {
        a + b
    }
}

/// Mixes `source * gain` into `destination` with [`mix_sample`].
pub fn mix_into(destination: &mut [f32], source: &[f32], gain: f32) {
    for (dst, src) in destination.iter_mut().zip(source) {
        *dst = mix_sample(*dst, src * gain);
    }
}

/// Averages one interleaved frame over its non-silent channels.
///
/// A frame where every channel is exactly zero yields zero.
#[inline]
pub fn downmix_frame(frame: &[f32]) -> f32 {
    let mut sum = 0.0;
    let mut active = 0u32;
    for &sample in frame {
        sum += sample;
        if sample != 0.0 {
            active += 1;
        }
    }
    if active == 0 { 0.0 } else { sum / active as f32 }
}

/// Downmixes interleaved `input` to mono, overwriting `output`.
///
/// Returns the number of frames written.
pub fn mix_to_mono(input: &[f32], channels: usize, output: &mut [f32]) -> usize {
    if channels == 0 {
        return 0;
    }
    let mut written = 0;
    for (dst, frame) in output.iter_mut().zip(input.chunks_exact(channels)) {
        *dst = downmix_frame(frame);
        written += 1;
    }
    written
}

/// Downmixes interleaved `input` to mono and mixes it into `destination`
/// scaled by `gain`.
pub fn mix_downmixed_into(destination: &mut [f32], input: &[f32], channels: usize, gain: f32) {
    if channels == 0 {
        return;
    }
    for (dst, frame) in destination.iter_mut().zip(input.chunks_exact(channels)) {
        *dst = mix_sample(*dst, downmix_frame(frame) * gain);
    }
}

/// Peak absolute value, used as the VU level of a channel.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |vu, s| vu.max(s.abs()))
}

/// Per-channel peak levels of an interleaved buffer.
pub fn peak_levels_interleaved(samples: &[f32], channels: usize, levels: &mut [f32]) {
    levels.iter_mut().for_each(|l| *l = 0.0);
    if channels == 0 {
        return;
    }
    for frame in samples.chunks_exact(channels) {
        for (level, s) in levels.iter_mut().zip(frame) {
            *level = level.max(s.abs());
        }
    }
}

/// Copies planar data (`channel * samples_per_channel + i`) into an
/// interleaved buffer. Output channels without input are left silent.
pub fn planar_to_interleaved(
    planar: &[f32],
    planar_channels: usize,
    samples_per_channel: usize,
    interleaved: &mut [f32],
    interleaved_channels: usize,
) {
    if interleaved_channels == 0 {
        return;
    }
    for (i, frame) in interleaved
        .chunks_exact_mut(interleaved_channels)
        .take(samples_per_channel)
        .enumerate()
    {
        for (c, out) in frame.iter_mut().enumerate() {
            *out = if c < planar_channels {
                planar
                    .get(c * samples_per_channel + i)
                    .copied()
                    .unwrap_or(0.0)
            } else {
                0.0
            };
        }
    }
}

/// Splits an interleaved buffer into planar layout.
pub fn interleaved_to_planar(interleaved: &[f32], channels: usize, planar: &mut [f32]) {
    if channels == 0 {
        return;
    }
    let samples_per_channel = interleaved.len() / channels;
    for (i, frame) in interleaved.chunks_exact(channels).enumerate() {
        for (c, &s) in frame.iter().enumerate() {
            if let Some(dst) = planar.get_mut(c * samples_per_channel + i) {
                *dst = s;
            }
        }
    }
}

/// Logarithmic rolloff: unity inside `min_distance`, then
/// `1 / (1 + 2 ln(d / min))`.
pub fn log_attenuation(distance: f32, min_distance: f32) -> f32 {
    if distance <= min_distance {
        return 1.0;
    }
    if min_distance <= 0.0 {
        return 0.0;
    }
    1.0 / (1.0 + 2.0 * (distance / min_distance).ln())
}
