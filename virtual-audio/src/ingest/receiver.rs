//! Receive pipeline: frame source -> converter -> ring buffer -> playback.
//!
//! [`AudioReceiver`] runs on the network thread. [`ReceiverPlayback`] runs in
//! the audio callback and is the only consumer of the ring buffer.
//!
//! Lock order: `fan_out -> ring buffer`.

use super::converter::ResamplerConverter;
use super::frame::{AudioFrame, CapturedFrame, FrameSource};
use super::ring_buffer::{DEFAULT_CAPACITY, DEFAULT_READ_AHEAD, FrameIngestRingBuffer, PullResult};
use super::speakers::{DEFAULT_SPEAKER_DISTANCE, VirtualSpeakerRenderer, layout_for_channels};
use crate::error::{Result, VirtualAudioError};
use crate::events::{EventSender, MixerEvent};
use crate::metadata::{SpeakerMetadata, parse_speaker_metadata};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Format the local device plays at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub read_ahead: usize,
    pub initial_capacity: usize,
    /// Distance of the virtual speakers used for surround streams
    pub virtual_speaker_distance: f32,
    /// How long one capture call may block
    pub capture_timeout: Duration,
    /// Largest device block, in frames, the fan-out scratch is sized for
    pub max_block_frames: usize,
}

pub const DEFAULT_MAX_BLOCK_FRAMES: usize = 4096;

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            read_ahead: DEFAULT_READ_AHEAD,
            initial_capacity: DEFAULT_CAPACITY,
            virtual_speaker_distance: DEFAULT_SPEAKER_DISTANCE,
            capture_timeout: Duration::from_millis(5000),
            max_block_frames: DEFAULT_MAX_BLOCK_FRAMES,
        }
    }
}

/// Virtual speaker rendering for the audio callback.
struct FanOut {
    /// Set while the stream is rendered through virtual speakers
    renderer: Option<VirtualSpeakerRenderer>,
    /// Speaker frames pulled from the ring, sized on format change
    scratch: Vec<f32>,
}

/// State shared between the network thread and the audio callback.
pub struct ReceiverShared {
    ring: FrameIngestRingBuffer,
    fan_out: Mutex<FanOut>,
}

impl ReceiverShared {
    pub fn ring(&self) -> &FrameIngestRingBuffer {
        &self.ring
    }

    pub fn virtual_speaker_count(&self) -> usize {
        self.fan_out
            .lock()
            .renderer
            .as_ref()
            .map_or(0, VirtualSpeakerRenderer::input_channels)
    }
}

pub struct AudioReceiver {
    device: OutputFormat,
    settings: ReceiverSettings,
    shared: Arc<ReceiverShared>,
    converter: ResamplerConverter,
    /// Rate and channel count of the stream as last seen
    received: Option<(u32, usize)>,
    stream_channels: usize,
    metadata: Option<SpeakerMetadata>,
    events: EventSender,
}

impl AudioReceiver {
    pub fn new(device: OutputFormat, settings: ReceiverSettings, events: EventSender) -> Self {
        let ring = FrameIngestRingBuffer::new(settings.initial_capacity, settings.read_ahead)
            .with_events(events.clone());
        Self {
            device,
            shared: Arc::new(ReceiverShared {
                ring,
                fan_out: Mutex::new(FanOut {
                    renderer: None,
                    scratch: Vec::new(),
                }),
            }),
            converter: ResamplerConverter::new(device.sample_rate),
            received: None,
            stream_channels: device.channels,
            metadata: None,
            settings,
            events,
        }
    }

    /// Consumer half for the audio callback.
    pub fn playback(&self) -> ReceiverPlayback {
        ReceiverPlayback {
            shared: Arc::clone(&self.shared),
            device_channels: self.device.channels,
        }
    }

    pub fn shared(&self) -> &Arc<ReceiverShared> {
        &self.shared
    }

    /// Speaker hints from the last metadata received.
    pub fn metadata(&self) -> Option<&SpeakerMetadata> {
        self.metadata.as_ref()
    }

    /// Call when the device format changes; the stream layout is re-derived
    /// from the next frame.
    pub fn set_output_format(&mut self, device: OutputFormat) {
        if device != self.device {
            log::info!(
                "Output format changed to {} Hz, {} channels",
                device.sample_rate,
                device.channels
            );
            self.device = device;
            self.converter.set_output_rate(device.sample_rate);
            self.received = None;
        }
    }

    pub fn handle_metadata(&mut self, xml: &str) {
        match parse_speaker_metadata(xml) {
            Ok(metadata) => self.metadata = Some(metadata),
            Err(e) => log::warn!("Ignoring frame metadata: {}", e),
        }
    }

    /// Converts one frame and queues it for playback.
    pub fn handle_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        frame.validate()?;
        if let Some(xml) = &frame.metadata {
            self.handle_metadata(xml);
        }

        if self.received != Some((frame.sample_rate, frame.channel_count)) {
            self.on_format_changed(frame.sample_rate, frame.channel_count);
        }

        let samples = self.converter.convert(frame, self.stream_channels);
        self.shared.ring.push(samples);
        Ok(())
    }

    fn on_format_changed(&mut self, sample_rate: u32, channels: usize) {
        if sample_rate != self.device.sample_rate {
            log::warn!(
                "Audio sample rate does not match. Expected {} but received {}",
                self.device.sample_rate,
                sample_rate
            );
        }

        let renderer = if channels == self.device.channels {
            None
        } else {
            log::warn!(
                "Audio channel count does not match. Expected {} but received {}",
                self.device.channels,
                channels
            );
            self.virtual_speakers(channels)
        };

        self.stream_channels = renderer
            .as_ref()
            .map_or(self.device.channels, VirtualSpeakerRenderer::input_channels);
        let virtual_speakers = renderer.as_ref().map_or(0, |r| r.input_channels());
        {
            let mut fan_out = self.shared.fan_out.lock();
            let needed = virtual_speakers * self.settings.max_block_frames;
            if fan_out.scratch.len() < needed {
                fan_out.scratch.resize(needed, 0.0);
            }
            fan_out.renderer = renderer;
            self.shared.ring.reset();
        }

        self.received = Some((sample_rate, channels));
        self.events.post(MixerEvent::FormatChanged {
            sample_rate,
            channels,
            virtual_speakers,
        });
    }

    /// Speaker placement for a stream with `channels` channels: positions from
    /// metadata when they match, otherwise a standard layout.
    fn virtual_speakers(&self, channels: usize) -> Option<VirtualSpeakerRenderer> {
        if let Some(metadata) = &self.metadata {
            if !metadata.object_based && metadata.speakers.len() == channels {
                log::info!("Using {} virtual speakers from stream metadata", channels);
                return Some(VirtualSpeakerRenderer::new(
                    &metadata.positions(),
                    &metadata.gains(),
                    self.device.channels,
                ));
            }
        }

        match layout_for_channels(channels) {
            Some(layout) => {
                log::info!("Using {:?} virtual speakers", layout);
                Some(VirtualSpeakerRenderer::for_layout(
                    layout,
                    self.settings.virtual_speaker_distance,
                    self.device.channels,
                ))
            }
            None => {
                log::warn!(
                    "No virtual speakers for {} channels, converting directly",
                    channels
                );
                None
            }
        }
    }

    /// Handles one capture result.
    pub fn process(&mut self, captured: CapturedFrame) {
        match captured {
            CapturedFrame::Audio(frame) => {
                if let Err(e) = self.handle_frame(&frame) {
                    log::warn!("Dropping audio frame: {}", e);
                }
            }
            CapturedFrame::Metadata(xml) => self.handle_metadata(&xml),
            CapturedFrame::StatusChange => {
                log::debug!("Receiver status changed");
                self.events
                    .post(MixerEvent::ReceiverStatusChanged { error: false });
            }
            CapturedFrame::Error => {
                log::warn!("Receiver reported an error");
                self.events
                    .post(MixerEvent::ReceiverStatusChanged { error: true });
            }
            CapturedFrame::None => {}
        }
    }
}

/// Audio callback half of the receiver.
pub struct ReceiverPlayback {
    shared: Arc<ReceiverShared>,
    device_channels: usize,
}

impl ReceiverPlayback {
    pub fn device_channels(&self) -> usize {
        self.device_channels
    }

    /// Fills interleaved device frames. Silent while buffering or after an
    /// underrun.
    pub fn fill(&mut self, output: &mut [f32]) -> PullResult {
        let mut guard = self.shared.fan_out.lock();
        let fan_out = &mut *guard;
        let Some(renderer) = fan_out.renderer.as_ref() else {
            return self.shared.ring.pull(output);
        };

        let frames = output.len() / self.device_channels.max(1);
        let needed = frames * renderer.input_channels();
        if fan_out.scratch.len() < needed {
            log::warn!(
                "Device block of {} frames exceeds the reserved fan-out buffer, growing it",
                frames
            );
            fan_out.scratch.resize(needed, 0.0);
        }
        let scratch = &mut fan_out.scratch[..needed];
        let result = self.shared.ring.pull(scratch);
        renderer.render(scratch, output);
        result
    }
}

/// Cooperative stop flag for the receive loop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Handle of a running receive thread. Dropping it stops the thread.
pub struct ReceiveHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl ReceiveHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Cancels the loop and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Receive thread panicked");
            }
        }
    }
}

impl Drop for ReceiveHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Runs `source` into `receiver` on a dedicated thread until cancelled. The
/// source and receiver are dropped when the loop exits.
pub fn spawn_receive_thread<S>(mut source: S, mut receiver: AudioReceiver) -> Result<ReceiveHandle>
where
    S: FrameSource + 'static,
{
    let token = CancellationToken::new();
    let loop_token = token.clone();
    let timeout = receiver.settings.capture_timeout;

    let thread = std::thread::Builder::new()
        .name("virtual-audio-receive".into())
        .spawn(move || {
            log::info!("Receive loop started");
            while !loop_token.is_cancelled() {
                match source.capture(timeout) {
                    Ok(captured) => receiver.process(captured),
                    Err(e) => {
                        log::error!("Capture failed: {}", e);
                        std::thread::sleep(RETRY_DELAY);
                    }
                }
            }
            log::info!("Receive loop stopped");
        })
        .map_err(|e| VirtualAudioError::Transport(format!("Failed to spawn receive thread: {}", e)))?;

    Ok(ReceiveHandle {
        token,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use crate::ingest::frame::ChannelFrameSource;
    use crate::metadata::speaker_metadata_xml;
    use crate::math::Vec3;

    fn stereo_device() -> OutputFormat {
        OutputFormat {
            sample_rate: 48000,
            channels: 2,
        }
    }

    fn settings() -> ReceiverSettings {
        ReceiverSettings {
            read_ahead: 2,
            initial_capacity: 64,
            capture_timeout: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_matching_stream_plays_through() {
        let (events, _rx) = event_channel(16);
        let mut receiver = AudioReceiver::new(stereo_device(), settings(), events);
        let mut playback = receiver.playback();

        let frame = AudioFrame::new(48000, 2, 4, vec![0.1, 0.2, 0.3, 0.4, -0.1, -0.2, -0.3, -0.4]);
        receiver.handle_frame(&frame).unwrap();
        receiver.handle_frame(&frame).unwrap();

        let mut out = vec![0.0; 8];
        assert_eq!(playback.fill(&mut out), PullResult::Filled);
        assert_eq!(out, vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3, 0.4, -0.4]);
        assert_eq!(receiver.shared().virtual_speaker_count(), 0);
    }

    #[test]
    fn test_surround_stream_uses_virtual_speakers() {
        let (events, rx) = event_channel(16);
        let mut receiver = AudioReceiver::new(stereo_device(), settings(), events);
        let mut playback = receiver.playback();

        // Quad with signal only on the front left speaker
        let mut planar = vec![0.0; 4 * 8];
        planar[..8].iter_mut().for_each(|s| *s = 0.5);
        let frame = AudioFrame::new(48000, 4, 8, planar);
        receiver.handle_frame(&frame).unwrap();
        receiver.handle_frame(&frame).unwrap();
        assert_eq!(receiver.shared().virtual_speaker_count(), 4);

        let mut out = vec![0.0; 16];
        assert_eq!(playback.fill(&mut out), PullResult::Filled);
        assert!(out[0] > out[1]);
        assert!(out[1] > 0.0);

        assert!(rx.try_iter().any(|e| e
            == MixerEvent::FormatChanged {
                sample_rate: 48000,
                channels: 4,
                virtual_speakers: 4
            }));
    }

    #[test]
    fn test_fan_out_scratch_is_reserved_before_playback() {
        let (events, _rx) = event_channel(16);
        let mut receiver = AudioReceiver::new(
            stereo_device(),
            ReceiverSettings {
                max_block_frames: 64,
                ..settings()
            },
            events,
        );
        let mut playback = receiver.playback();

        let frame = AudioFrame::new(48000, 4, 16, vec![0.25; 4 * 16]);
        for _ in 0..4 {
            receiver.handle_frame(&frame).unwrap();
        }
        let reserved = receiver.shared().fan_out.lock().scratch.capacity();
        assert!(reserved >= 4 * 64);

        let mut out = vec![0.0; 16 * 2];
        assert_eq!(playback.fill(&mut out), PullResult::Filled);
        assert_eq!(playback.fill(&mut out), PullResult::Filled);
        assert_eq!(receiver.shared().fan_out.lock().scratch.capacity(), reserved);
    }

    #[test]
    fn test_metadata_positions_win_over_layout() {
        let (events, _rx) = event_channel(16);
        let mut receiver = AudioReceiver::new(stereo_device(), settings(), events);
        let positions = [Vec3::X, Vec3::X, Vec3::X, Vec3::X, Vec3::X];
        let xml = speaker_metadata_xml(&positions, &[]).unwrap();

        let frame = AudioFrame::new(48000, 5, 2, vec![0.25; 10]).with_metadata(xml);
        receiver.handle_frame(&frame).unwrap();
        assert_eq!(receiver.shared().virtual_speaker_count(), 5);
        assert_eq!(receiver.metadata().map(|m| m.speakers.len()), Some(5));
    }

    #[test]
    fn test_unsupported_channel_count_converts_directly() {
        let (events, _rx) = event_channel(16);
        let mut receiver = AudioReceiver::new(stereo_device(), settings(), events);
        let frame = AudioFrame::new(48000, 3, 2, vec![0.5; 6]);
        receiver.handle_frame(&frame).unwrap();
        assert_eq!(receiver.shared().virtual_speaker_count(), 0);
        assert_eq!(receiver.shared().ring().buffered(), 4);
    }

    #[test]
    fn test_invalid_frame_is_rejected() {
        let (events, _rx) = event_channel(16);
        let mut receiver = AudioReceiver::new(stereo_device(), settings(), events);
        let frame = AudioFrame::new(48000, 2, 4, vec![0.0; 3]);
        assert!(receiver.handle_frame(&frame).is_err());
        assert_eq!(receiver.shared().ring().buffered(), 0);
    }

    #[test]
    fn test_receive_thread_stops_on_cancel() {
        let (events, rx) = event_channel(16);
        let receiver = AudioReceiver::new(stereo_device(), settings(), events);
        let shared = Arc::clone(receiver.shared());

        let (tx, frames) = crossbeam_channel::unbounded();
        let handle = spawn_receive_thread(ChannelFrameSource::new(frames), receiver).unwrap();

        tx.send(CapturedFrame::Audio(AudioFrame::new(48000, 2, 2, vec![0.5; 4])))
            .unwrap();
        tx.send(CapturedFrame::Error).unwrap();

        let status = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let status = if matches!(status, MixerEvent::FormatChanged { .. }) {
            rx.recv_timeout(Duration::from_secs(5)).unwrap()
        } else {
            status
        };
        assert_eq!(status, MixerEvent::ReceiverStatusChanged { error: true });
        assert_eq!(shared.ring().buffered(), 4);

        handle.stop();
    }
}
