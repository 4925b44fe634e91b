//! Sends the mix of a [`MixerContext`] to a network sink once per tick.

use crate::adm::AdmOscSender;
use crate::context::MixerContext;
use crate::dsp;
use crate::error::{Result, VirtualAudioError};
use crate::ingest::{AudioFrame, CapturedFrame};
use crate::math::Vec3;
use crate::metadata::{object_metadata_xml, speaker_metadata_xml};
use crate::mixer::DspTick;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;

/// One planar block handed to a transport.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingAudioFrame<'a> {
    pub sample_rate: u32,
    pub channel_count: usize,
    pub samples_per_channel: usize,
    /// Byte distance between the starts of two channels
    pub channel_stride_bytes: usize,
    pub data: &'a [f32],
    pub metadata: Option<&'a str>,
}

/// Send side of a network transport.
pub trait FrameSink: Send {
    fn send_audio(&mut self, frame: &OutgoingAudioFrame<'_>) -> Result<()>;
}

/// In-process transport feeding a [`ChannelFrameSource`](crate::ingest::ChannelFrameSource).
///
/// Frames are dropped with a warning when the receiving side falls behind.
pub struct ChannelFrameSink {
    frames: Sender<CapturedFrame>,
    dropped: u64,
}

impl ChannelFrameSink {
    pub fn new(frames: Sender<CapturedFrame>) -> Self {
        Self { frames, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl FrameSink for ChannelFrameSink {
    fn send_audio(&mut self, frame: &OutgoingAudioFrame<'_>) -> Result<()> {
        let mut audio = AudioFrame::new(
            frame.sample_rate,
            frame.channel_count,
            frame.samples_per_channel,
            frame.data.to_vec(),
        );
        audio.metadata = frame.metadata.map(str::to_owned);

        match self.frames.try_send(CapturedFrame::Audio(audio)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::warn!("Receiver is behind, dropped frame ({} total)", self.dropped);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(VirtualAudioError::Transport("Receiver disconnected".into()))
            }
        }
    }
}

pub struct AudioSender<S: FrameSink> {
    context: Arc<MixerContext>,
    sink: S,
    adm: Option<AdmOscSender>,
    planar: Vec<f32>,
    positions: Vec<Vec3>,
    gains: Vec<f32>,
    speaker_metadata: Option<String>,
    /// Channel and sample count the speaker metadata was generated for
    metadata_shape: Option<(usize, usize)>,
}

impl<S: FrameSink> AudioSender<S> {
    pub fn new(context: Arc<MixerContext>, sink: S) -> Self {
        Self {
            context,
            sink,
            adm: None,
            planar: Vec::new(),
            positions: Vec::new(),
            gains: Vec::new(),
            speaker_metadata: None,
            metadata_shape: None,
        }
    }

    /// Also sends object positions over ADM-OSC in object-based mode.
    pub fn with_adm(mut self, adm: AdmOscSender) -> Self {
        self.adm = Some(adm);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Forces the speaker metadata to be rebuilt on the next tick, e.g.
    /// after listeners moved.
    pub fn invalidate_metadata(&mut self) {
        self.metadata_shape = None;
    }

    /// Sends the output of `tick` in the context's current mode.
    pub fn send_tick(&mut self, tick: DspTick) -> Result<()> {
        if self.context.is_object_based() {
            self.send_objects(tick)
        } else {
            self.send_virtual(tick)
        }
    }

    fn send_virtual(&mut self, tick: DspTick) -> Result<()> {
        let planar = &mut self.planar;
        let (channels, spc) = self.context.with_mixed_audio(tick, |mixed| {
            planar.clear();
            planar.extend_from_slice(mixed.buffer);
            (mixed.channels, mixed.samples_per_channel)
        });
        if channels == 0 {
            return Ok(());
        }

        if self.metadata_shape != Some((channels, spc)) {
            let positions = self.context.listener_positions().unwrap_or_default();
            let volumes = self.context.listener_volumes().unwrap_or_default();
            self.speaker_metadata = Some(speaker_metadata_xml(&positions, &volumes)?);
            self.metadata_shape = Some((channels, spc));
            log::debug!("Regenerated speaker metadata for {} channels", channels);
        }

        self.sink.send_audio(&OutgoingAudioFrame {
            sample_rate: self.context.desc().sample_rate,
            channel_count: channels,
            samples_per_channel: spc,
            channel_stride_bytes: spc * std::mem::size_of::<f32>(),
            data: &self.planar,
            metadata: self.speaker_metadata.as_deref(),
        })
    }

    fn send_objects(&mut self, tick: DspTick) -> Result<()> {
        let (planar, positions, gains) = (&mut self.planar, &mut self.positions, &mut self.gains);
        let (channels, spc) = self.context.with_object_audio(tick, |objects| {
            planar.clear();
            planar.extend_from_slice(objects.buffer);
            positions.clear();
            positions.extend_from_slice(objects.positions);
            gains.clear();
            gains.extend_from_slice(objects.gains);
            (objects.channels(), objects.samples_per_channel)
        });
        if channels == 0 {
            return Ok(());
        }

        let metadata = object_metadata_xml(&self.positions, &self.gains)?;
        self.metadata_shape = None;

        self.sink.send_audio(&OutgoingAudioFrame {
            sample_rate: self.context.desc().sample_rate,
            channel_count: channels,
            samples_per_channel: spc,
            channel_stride_bytes: spc * std::mem::size_of::<f32>(),
            data: &self.planar,
            metadata: Some(&metadata),
        })?;

        if let Some(adm) = &self.adm {
            if let Err(e) = adm.send_positions(&self.positions) {
                log::warn!("ADM-OSC send failed: {}", e);
            }
        }
        Ok(())
    }

    /// Sends an interleaved device buffer as is, without metadata.
    pub fn send_passthrough(&mut self, interleaved: &[f32], channels: usize) -> Result<()> {
        if channels == 0 || interleaved.is_empty() {
            return Ok(());
        }
        let spc = interleaved.len() / channels;
        self.planar.clear();
        self.planar.resize(spc * channels, 0.0);
        dsp::interleaved_to_planar(&interleaved[..spc * channels], channels, &mut self.planar);

        self.sink.send_audio(&OutgoingAudioFrame {
            sample_rate: self.context.desc().sample_rate,
            channel_count: channels,
            samples_per_channel: spc,
            channel_stride_bytes: spc * std::mem::size_of::<f32>(),
            data: &self.planar,
            metadata: None,
        })
    }
}
