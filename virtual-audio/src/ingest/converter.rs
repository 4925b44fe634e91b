//! Sample rate and layout conversion of received frames.

use super::frame::AudioFrame;
use crate::dsp;
use crate::math::{approximately, lerp};

/// Converts a planar frame to interleaved `output_channels` at `output_rate`,
/// replacing the contents of `out`. Returns the number of output frames.
///
/// Matching rate and channel count is a plain copy. Otherwise each output
/// frame is linearly interpolated from the input, and output channels the
/// frame does not have stay silent.
pub fn convert_frame(frame: &AudioFrame, output_rate: u32, output_channels: usize, out: &mut Vec<f32>) -> usize {
    out.clear();
    let spc = frame.samples_per_channel;
    if output_channels == 0 || output_rate == 0 || spc == 0 {
        return 0;
    }
    if frame.planar.len() < frame.channel_count * spc {
        log::warn!(
            "Dropping frame with {} samples, expected {} x {}",
            frame.planar.len(),
            frame.channel_count,
            spc
        );
        return 0;
    }

    if frame.sample_rate == output_rate && frame.channel_count == output_channels {
        out.resize(spc * output_channels, 0.0);
        dsp::planar_to_interleaved(&frame.planar, frame.channel_count, spc, out, output_channels);
        return spc;
    }

    let ratio = frame.sample_rate as f32 / output_rate as f32;
    // floor(spc / ratio) without float rounding
    let frames = (spc as u64 * output_rate as u64 / frame.sample_rate.max(1) as u64) as usize;
    out.resize(frames * output_channels, 0.0);

    for (i, out_frame) in out.chunks_exact_mut(output_channels).enumerate() {
        let position = i as f32 * ratio;
        let index = (position as usize).min(spc - 1);
        let t = position - index as f32;
        let next = (index + 1).min(spc - 1);

        for (channel, sample) in out_frame.iter_mut().enumerate().take(frame.channel_count) {
            let input = frame.channel(channel);
            *sample = if approximately(t, 0.0) {
                input[index]
            } else {
                lerp(input[index], input[next], t)
            };
        }
    }
    frames
}

/// Stateful wrapper that keeps its output buffer between frames.
#[derive(Debug)]
pub struct ResamplerConverter {
    output_rate: u32,
    output: Vec<f32>,
}

impl ResamplerConverter {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate,
            output: Vec::new(),
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn set_output_rate(&mut self, rate: u32) {
        if rate != self.output_rate {
            log::info!("Converter output rate changed from {} to {} Hz", self.output_rate, rate);
            self.output_rate = rate;
        }
    }

    /// Converts `frame` and returns the interleaved result.
    pub fn convert(&mut self, frame: &AudioFrame, output_channels: usize) -> &[f32] {
        convert_frame(frame, self.output_rate, output_channels, &mut self.output);
        &self.output
    }
}
