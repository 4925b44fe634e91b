//! Frames delivered by a network transport.

use crate::error::{Result, VirtualAudioError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// One block of received planar audio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channel_count: usize,
    pub samples_per_channel: usize,
    /// Sender timestamp in 100 ns units
    pub timestamp: i64,
    /// `channel_count * samples_per_channel` samples, channel after channel
    pub planar: Vec<f32>,
    /// Optional `<VirtualSpeakers>` XML
    pub metadata: Option<String>,
}

impl AudioFrame {
    pub fn new(sample_rate: u32, channel_count: usize, samples_per_channel: usize, planar: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channel_count,
            samples_per_channel,
            timestamp: 0,
            planar,
            metadata: None,
        }
    }

    /// Builds a frame from interleaved samples.
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, interleaved: &[f32]) -> Self {
        let samples_per_channel = interleaved.len() / channel_count.max(1);
        let mut planar = vec![0.0; samples_per_channel * channel_count];
        crate::dsp::interleaved_to_planar(
            &interleaved[..samples_per_channel * channel_count],
            channel_count,
            &mut planar,
        );
        Self::new(sample_rate, channel_count, samples_per_channel, planar)
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.samples_per_channel;
        self.planar
            .get(start..start + self.samples_per_channel)
            .unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channel_count == 0 {
            return Err(VirtualAudioError::AudioFormat(format!(
                "Invalid frame format: {} Hz, {} channels",
                self.sample_rate, self.channel_count
            )));
        }
        if self.planar.len() != self.channel_count * self.samples_per_channel {
            return Err(VirtualAudioError::AudioFormat(format!(
                "Frame holds {} samples, expected {} x {}",
                self.planar.len(),
                self.channel_count,
                self.samples_per_channel
            )));
        }
        Ok(())
    }
}

/// Result of one capture call.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedFrame {
    Audio(AudioFrame),
    Metadata(String),
    StatusChange,
    Error,
    /// Nothing arrived before the timeout
    None,
}

/// Receive side of a network transport.
pub trait FrameSource: Send {
    /// Waits up to `timeout` for the next frame.
    fn capture(&mut self, timeout: Duration) -> Result<CapturedFrame>;
}

/// In-process source fed through a channel, used for loopback setups.
pub struct ChannelFrameSource {
    frames: Receiver<CapturedFrame>,
}

impl ChannelFrameSource {
    pub fn new(frames: Receiver<CapturedFrame>) -> Self {
        Self { frames }
    }
}

impl FrameSource for ChannelFrameSource {
    fn capture(&mut self, timeout: Duration) -> Result<CapturedFrame> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Ok(CapturedFrame::None),
            Err(RecvTimeoutError::Disconnected) => Err(VirtualAudioError::Transport(
                "Frame channel disconnected".into(),
            )),
        }
    }
}
