//! The mixer context: listeners, sources and the shared output buffer.
//!
//! A context is shared between three kinds of callers:
//!
//! - the update tick (main loop) mutates listeners and source settings and
//!   recomputes target weights with [`MixerContext::update_weights`]
//! - the audio callback mixes each source with [`MixerContext::mix_source`]
//! - the sender reads the result with [`MixerContext::with_mixed_audio`] or
//!   [`MixerContext::with_object_audio`]
//!
//! # Lock order
//!
//! Every entry point acquires a subset of these locks, always in this order:
//! `listeners -> sources -> output -> test_tone`. Mode flags are atomics and
//! may be read under any lock.

use crate::config::{AudioSourceSettings, MixerDesc, SpeakerConfig, VirtualAudioSetupConfig};
use crate::dsp;
use crate::error::{Result, VirtualAudioError};
use crate::events::{EventSender, MixerEvent, StreamMonitor, event_channel};
use crate::listener::ListenerRegistry;
use crate::math::{Pose, SphericalCoordinate, Vec3};
use crate::mixer::{DspTick, MixBuffer, MixedAudio, ObjectAudio};
use crate::panning::{WeightParams, compute_source_weights};
use crate::source::{ChannelAssignment, SourceId, SourceRegistry, WEIGHT_EPSILON, WeightSet};
use crate::test_tone::TestTone;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct TestToneState {
    tone: TestTone,
    scratch: Vec<f32>,
    weights: WeightSet,
}

pub struct MixerContext {
    desc: MixerDesc,

    listeners: Mutex<ListenerRegistry>,
    sources: Mutex<SourceRegistry>,
    output: Mutex<MixBuffer>,
    test_tone: Mutex<TestToneState>,

    // Mirrors the listener registry length so the audio thread can size the
    // output without taking the listener lock
    listener_count: AtomicUsize,
    use_virtual_audio: AtomicBool,
    object_based: AtomicBool,
    max_object_channels: AtomicUsize,
    centered: AtomicBool,
    use_origin_for_attenuation: AtomicBool,
    mute: AtomicBool,
    test_mode: AtomicBool,
    test_channel: AtomicUsize,

    events: EventSender,
    event_receiver: Receiver<MixerEvent>,
    monitor: StreamMonitor,
}

impl MixerContext {
    pub fn new(desc: MixerDesc) -> Result<Self> {
        desc.validate()?;

        let channel_capacity = desc.max_output_channels();
        let (events, event_receiver) = event_channel(desc.event_capacity);

        log::info!(
            "Creating mixer context: {} Hz, {} frames per tick, up to {} listeners",
            desc.sample_rate,
            desc.dsp_buffer_size,
            desc.max_listeners
        );

        Ok(Self {
            listeners: Mutex::new(ListenerRegistry::with_capacity(desc.max_listeners)),
            sources: Mutex::new(SourceRegistry::new(channel_capacity, channel_capacity)),
            output: Mutex::new(MixBuffer::new(channel_capacity, desc.dsp_buffer_size)),
            test_tone: Mutex::new(TestToneState {
                tone: TestTone::new(desc.sample_rate),
                scratch: vec![0.0; desc.dsp_buffer_size],
                weights: WeightSet::with_capacity(channel_capacity),
            }),
            listener_count: AtomicUsize::new(0),
            use_virtual_audio: AtomicBool::new(true),
            object_based: AtomicBool::new(false),
            max_object_channels: AtomicUsize::new(desc.max_object_based_channels),
            centered: AtomicBool::new(false),
            use_origin_for_attenuation: AtomicBool::new(false),
            mute: AtomicBool::new(false),
            test_mode: AtomicBool::new(false),
            test_channel: AtomicUsize::new(0),
            events,
            event_receiver,
            monitor: StreamMonitor::new(),
            desc,
        })
    }

    pub fn desc(&self) -> &MixerDesc {
        &self.desc
    }

    // ---- listeners ----

    /// Adds a listener and returns its channel index.
    pub fn add_listener(&self, position: Vec3, volume: f32) -> Result<usize> {
        let mut listeners = self.listeners.lock();
        if listeners.len() >= self.desc.max_listeners {
            return Err(VirtualAudioError::Configuration(format!(
                "Listener limit of {} reached",
                self.desc.max_listeners
            )));
        }
        let index = listeners.add(position, volume);
        self.listener_count.store(listeners.len(), Ordering::Release);
        Ok(index)
    }

    /// Removes the listener at `index`; later listeners shift down one channel.
    pub fn remove_listener(&self, index: usize) -> bool {
        let mut listeners = self.listeners.lock();
        let removed = listeners.remove(index).is_some();
        self.listener_count.store(listeners.len(), Ordering::Release);
        removed
    }

    pub fn update_listener_position(&self, channel: usize, position: Vec3) -> bool {
        self.listeners.lock().update_position(channel, position)
    }

    pub fn update_listener_volume(&self, channel: usize, volume: f32) -> bool {
        self.listeners.lock().update_volume(channel, volume)
    }

    pub fn clear_listeners(&self) {
        let mut listeners = self.listeners.lock();
        listeners.clear();
        self.listener_count.store(0, Ordering::Release);
    }

    pub fn listener_count(&self) -> usize {
        self.listener_count.load(Ordering::Acquire)
    }

    /// Transformed listener positions, or `None` while virtual audio is off.
    pub fn listener_positions(&self) -> Option<Vec<Vec3>> {
        if !self.is_virtual_audio_enabled() {
            return None;
        }
        Some(self.listeners.lock().positions())
    }

    /// Listener volumes, or `None` while virtual audio is off.
    pub fn listener_volumes(&self) -> Option<Vec<f32>> {
        if !self.is_virtual_audio_enabled() {
            return None;
        }
        Some(self.listeners.lock().volumes())
    }

    pub fn listener_spherical(&self, channel: usize) -> Option<SphericalCoordinate> {
        self.listeners.lock().get(channel).map(|l| l.spherical)
    }

    pub fn set_audio_origin(&self, origin: Pose) {
        self.listeners.lock().set_origin(origin);
    }

    pub fn audio_origin(&self) -> Pose {
        self.listeners.lock().origin()
    }

    // ---- sources ----

    pub fn register_source(&self, settings: AudioSourceSettings) -> SourceId {
        self.sources.lock().register(settings)
    }

    pub fn unregister_source(&self, id: SourceId) -> bool {
        self.sources.lock().unregister(id).is_some()
    }

    pub fn update_source_settings(&self, id: SourceId, settings: AudioSourceSettings) -> bool {
        self.sources.lock().update_settings(id, settings)
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    /// Target weights last computed for a source.
    pub fn source_weights(&self, id: SourceId) -> Option<Vec<f32>> {
        self.sources
            .lock()
            .get(id)
            .map(|s| s.weights.current().to_vec())
    }

    /// Weights actually applied during the last mix of a source.
    pub fn source_smoothed_weights(&self, id: SourceId) -> Option<Vec<f32>> {
        self.sources
            .lock()
            .get(id)
            .map(|s| s.weights.smoothed().to_vec())
    }

    pub fn object_based_channel(&self, id: SourceId) -> Option<usize> {
        self.sources
            .lock()
            .get(id)
            .and_then(|s| s.object_based_channel)
    }

    // ---- mode toggles ----

    pub fn set_virtual_audio_enabled(&self, enabled: bool) {
        if self.use_virtual_audio.swap(enabled, Ordering::AcqRel) != enabled {
            log::info!("Virtual audio {}", if enabled { "enabled" } else { "disabled" });
            self.events.post(MixerEvent::VirtualAudioStateChanged { enabled });
        }
    }

    pub fn is_virtual_audio_enabled(&self) -> bool {
        self.use_virtual_audio.load(Ordering::Acquire)
    }

    /// Switches object-based mode and its channel limit.
    pub fn set_object_based(&self, enabled: bool, max_channels: usize) {
        self.set_max_object_based_channels(max_channels);
        if self.object_based.swap(enabled, Ordering::AcqRel) != enabled {
            log::info!(
                "Object-based audio {} ({} channels)",
                if enabled { "enabled" } else { "disabled" },
                self.max_object_based_channels()
            );
            self.events.post(MixerEvent::ObjectBasedModeChanged {
                enabled,
                max_channels: self.max_object_based_channels(),
            });
        }
    }

    pub fn is_object_based(&self) -> bool {
        self.object_based.load(Ordering::Acquire)
    }

    /// Sets the object channel limit. Zero is raised to one.
    pub fn set_max_object_based_channels(&self, max_channels: usize) {
        let max_channels = max_channels.max(1);
        if self.max_object_channels.load(Ordering::Acquire) == max_channels {
            return;
        }
        // Grow storage here so the audio thread never has to
        self.sources.lock().reserve_channels(max_channels);
        self.output.lock().reserve_channels(max_channels);
        self.test_tone.lock().weights.reserve(max_channels);
        self.max_object_channels.store(max_channels, Ordering::Release);
        log::debug!("Max object-based channels set to {}", max_channels);
    }

    pub fn max_object_based_channels(&self) -> usize {
        self.max_object_channels.load(Ordering::Acquire)
    }

    pub fn set_centered_audio(&self, centered: bool) {
        self.centered.store(centered, Ordering::Release);
    }

    pub fn is_centered_audio(&self) -> bool {
        self.centered.load(Ordering::Acquire)
    }

    pub fn set_use_origin_for_attenuation(&self, enabled: bool) {
        self.use_origin_for_attenuation.store(enabled, Ordering::Release);
    }

    /// Silences the source buffers after mixing; the mix itself is kept.
    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Acquire)
    }

    /// Replaces the output with the metronome tone on the test channel.
    pub fn set_test_mode(&self, enabled: bool) {
        if self.test_mode.swap(enabled, Ordering::AcqRel) != enabled && enabled {
            self.test_tone.lock().tone.reset();
        }
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode.load(Ordering::Acquire)
    }

    pub fn set_test_channel(&self, channel: usize) {
        self.test_channel.store(channel, Ordering::Release);
    }

    pub fn test_channel(&self) -> usize {
        self.test_channel.load(Ordering::Acquire)
    }

    // ---- setup ----

    /// Replaces the speaker layout and mode flags. The config is validated
    /// before anything changes.
    pub fn apply_setup(&self, config: &VirtualAudioSetupConfig) -> Result<()> {
        config.validate()?;
        if config.speakers.len() > self.desc.max_listeners {
            return Err(VirtualAudioError::Configuration(format!(
                "Setup has {} speakers but the context allows {}",
                config.speakers.len(),
                self.desc.max_listeners
            )));
        }

        {
            let mut listeners = self.listeners.lock();
            listeners.clear();
            for speaker in &config.speakers {
                listeners.add(speaker.position.into(), speaker.volume);
            }
            self.listener_count.store(listeners.len(), Ordering::Release);
        }

        self.set_centered_audio(config.centered_audio_on_all_speakers);
        self.set_use_origin_for_attenuation(config.use_audio_origin_position_for_virtual_attenuation);
        self.set_object_based(config.object_based_audio, config.max_object_based_channels);
        self.set_virtual_audio_enabled(true);

        log::info!(
            "Applied virtual audio setup: {} speakers, object-based {}",
            config.speakers.len(),
            config.object_based_audio
        );
        Ok(())
    }

    /// Snapshot of the current layout and flags. OSC settings are not owned
    /// by the context and are left empty.
    pub fn setup_config(&self) -> VirtualAudioSetupConfig {
        let speakers = self
            .listeners
            .lock()
            .listeners()
            .iter()
            .map(|l| SpeakerConfig::new(l.raw_position, l.volume))
            .collect();

        VirtualAudioSetupConfig {
            object_based_audio: self.is_object_based(),
            max_object_based_channels: self.max_object_based_channels(),
            centered_audio_on_all_speakers: self.is_centered_audio(),
            use_audio_origin_position_for_virtual_attenuation: self
                .use_origin_for_attenuation
                .load(Ordering::Acquire),
            speakers,
            ..Default::default()
        }
    }

    // ---- events ----

    /// Drains pending events.
    pub fn poll_events(&self) -> Vec<MixerEvent> {
        self.event_receiver.try_iter().collect()
    }

    pub fn event_receiver(&self) -> &Receiver<MixerEvent> {
        &self.event_receiver
    }

    /// Producer handle for components that report through this context.
    pub fn event_sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn monitor(&self) -> &StreamMonitor {
        &self.monitor
    }

    // ---- update tick ----

    /// Recomputes target weights of every source. `listener_position` is the
    /// attenuation reference relative to the origin.
    pub fn update_weights(&self, listener_position: Vec3) {
        let mut listeners = self.listeners.lock();
        listeners.refresh_spherical();

        if self.is_object_based() {
            return;
        }

        let origin = listeners.origin();
        let params = WeightParams {
            origin: origin.position,
            listener_position: origin.transform_point(listener_position),
            average_listener_distance: listeners.average_distance(),
            use_origin_for_attenuation: self.use_origin_for_attenuation.load(Ordering::Acquire),
            centered: self.is_centered_audio(),
        };

        let count = listeners.len();
        let mut sources = self.sources.lock();
        for source in sources.iter_mut() {
            source.weights.check_len(count);
            compute_source_weights(
                listeners.listeners(),
                &source.settings,
                &params,
                source.weights.current_mut(),
            );
        }
    }

    // ---- audio thread ----

    fn smoothing_factor(&self) -> f32 {
        self.desc.dsp_tick_duration() * self.desc.smoothing_rate
    }

    /// Sizes the output for the current mode, assigns object channels and
    /// clears the buffer once per tick.
    fn check_setup(&self, sources: &mut SourceRegistry, output: &mut MixBuffer, tick: DspTick) {
        let object_based = self.is_object_based();
        let max_objects = self.max_object_based_channels();
        let channels = if object_based {
            max_objects
        } else {
            self.listener_count()
        };
        output.configure(channels);

        if object_based {
            sources.assign_object_channels(max_objects, |change| match change {
                ChannelAssignment::Assigned { source_id, channel } => {
                    log::debug!("Source {} assigned to object channel {}", source_id, channel);
                    self.events
                        .post(MixerEvent::ObjectChannelAssigned { source_id, channel });
                }
                ChannelAssignment::Exhausted { source_id } => {
                    log::warn!(
                        "No free object channel for source {} (limit {})",
                        source_id,
                        max_objects
                    );
                    self.events.post(MixerEvent::ObjectChannelsExhausted {
                        source_id,
                        max_channels: max_objects,
                    });
                }
            });
        }

        output.begin_tick(tick);
    }

    /// Runs the per-tick setup without mixing anything.
    pub fn prepare_tick(&self, tick: DspTick) {
        let mut sources = self.sources.lock();
        let mut output = self.output.lock();
        self.check_setup(&mut sources, &mut output, tick);
    }

    /// Mixes one source's interleaved block into the shared output.
    ///
    /// `data` holds `channels` interleaved channels; frames beyond the DSP
    /// buffer size are ignored. When muted, `data` is zeroed afterwards.
    pub fn mix_source(&self, id: SourceId, data: &mut [f32], channels: usize, tick: DspTick) {
        if self.is_virtual_audio_enabled() {
            self.mix_source_locked(id, data, channels, tick);
        }
        if self.is_muted() {
            data.iter_mut().for_each(|s| *s = 0.0);
        }
    }

    fn mix_source_locked(&self, id: SourceId, data: &[f32], channels: usize, tick: DspTick) {
        let mut sources = self.sources.lock();
        let mut output = self.output.lock();
        self.check_setup(&mut sources, &mut output, tick);

        let Some(source) = sources.get_mut(id) else {
            return;
        };

        if self.is_object_based() {
            if let Some(channel) = source.object_based_channel {
                dsp::mix_to_mono(data, channels, output.channel_mut(channel));
            }
            return;
        }

        let count = output.channels();
        source.weights.check_len(count);
        if let Some(forced) = source.settings.force_to_channel {
            if forced < count {
                source.weights.set_one_hot(forced);
            } else if source.report_invalid_forced_channel() {
                log::error!(
                    "Source {} is forced to channel {} but only {} listeners exist",
                    source.id,
                    forced,
                    count
                );
                self.events.post(MixerEvent::InvalidForcedChannel {
                    source_id: source.id,
                    channel: forced,
                    listener_count: count,
                });
            }
        }
        source.weights.update_smoothing(self.smoothing_factor());

        for (channel, &weight) in source.weights.smoothed().iter().enumerate() {
            if weight <= WEIGHT_EPSILON {
                continue;
            }
            dsp::mix_downmixed_into(output.channel_mut(channel), data, channels, weight);
        }
    }

    /// Overwrites the output with the test tone routed to the test channel.
    fn render_test_tone(&self, output: &mut MixBuffer) {
        let mut state = self.test_tone.lock();
        let state = &mut *state;
        let count = output.channels();
        let test_channel = self.test_channel();

        output.clear();
        state.tone.generate(&mut state.scratch);
        state.weights.check_len(count);
        state.weights.set_one_hot(test_channel);
        state.weights.update_smoothing(self.smoothing_factor());
        for (channel, &weight) in state.weights.smoothed().iter().enumerate() {
            dsp::mix_into(output.channel_mut(channel), &state.scratch, weight);
        }

        for (channel, level) in output.levels_mut().iter_mut().enumerate() {
            *level = if channel == test_channel { 1.0 } else { 0.0 };
        }
    }

    /// Hands the spatial mix of `tick` to `f`.
    ///
    /// The view is empty when no listener exists. Sources mixed later in the
    /// same tick are not part of it.
    pub fn with_mixed_audio<R>(&self, tick: DspTick, f: impl FnOnce(MixedAudio<'_>) -> R) -> R {
        let mut sources = self.sources.lock();
        let mut output = self.output.lock();
        self.check_setup(&mut sources, &mut output, tick);
        drop(sources);

        if output.channels() > 0 {
            if self.is_test_mode() {
                self.render_test_tone(&mut output);
            } else {
                output.update_levels();
            }
        }
        self.monitor.publish(output.levels());
        f(output.mixed())
    }

    /// Hands the object-based output of `tick` to `f`, with the position and
    /// gain of the source on each channel.
    pub fn with_object_audio<R>(&self, tick: DspTick, f: impl FnOnce(ObjectAudio<'_>) -> R) -> R {
        let mut sources = self.sources.lock();
        let mut output = self.output.lock();
        self.check_setup(&mut sources, &mut output, tick);

        let test_mode = self.is_test_mode();
        let has_sources = test_mode || !sources.is_empty();
        let max = output.channels();
        {
            let (positions, gains) = output.object_metadata_mut();
            positions.iter_mut().for_each(|p| *p = Vec3::ZERO);
            gains.iter_mut().for_each(|g| *g = 0.0);

            if test_mode {
                if let Some(gain) = gains.get_mut(self.test_channel()) {
                    *gain = 1.0;
                }
            } else {
                for source in sources.iter() {
                    let Some(channel) = source.object_based_channel else {
                        continue;
                    };
                    if channel < max {
                        positions[channel] = source.settings.position;
                        gains[channel] = source.settings.volume;
                    }
                }
            }
        }
        drop(sources);

        if test_mode {
            self.render_test_tone(&mut output);
        } else {
            output.update_levels();
        }
        self.monitor.publish(output.levels());
        f(output.objects(has_sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RolloffMode, SpeakerLayout};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    const FRAMES: usize = 64;

    fn context() -> MixerContext {
        MixerContext::new(
            MixerDesc::new()
                .sample_rate(48000)
                .dsp_buffer_size(FRAMES)
                .max_listeners(16)
                .max_object_based_channels(8),
        )
        .unwrap()
    }

    fn stereo_front_back(ctx: &MixerContext) {
        ctx.add_listener(Vec3::new(0.0, 0.0, 1.0), 1.0).unwrap();
        ctx.add_listener(Vec3::new(0.0, 0.0, -1.0), 1.0).unwrap();
    }

    fn sine(channels: usize, amplitude: f32) -> Vec<f32> {
        (0..FRAMES * channels)
            .map(|i| amplitude * ((i / channels) as f32 * 0.2).sin())
            .collect()
    }

    #[test]
    fn test_source_in_front_goes_to_front_listener() {
        let ctx = context();
        stereo_front_back(&ctx);
        let id = ctx.register_source(
            AudioSourceSettings::spatial(Vec3::new(0.0, 0.0, 1.0))
                .with_rolloff(RolloffMode::Linear, 0.0, 10.0),
        );
        ctx.update_weights(Vec3::ZERO);

        let weights = ctx.source_weights(id).unwrap();
        assert_relative_eq!(weights[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(weights[1], 0.0, epsilon = 1e-5);

        let mut data = vec![0.5; FRAMES];
        ctx.mix_source(id, &mut data, 1, DspTick(1));
        ctx.with_mixed_audio(DspTick(1), |mixed| {
            assert_eq!(mixed.channels, 2);
            assert!(mixed.channel(0).iter().all(|s| (s - 0.5).abs() < 1e-5));
            assert!(mixed.channel(1).iter().all(|s| *s == 0.0));
            assert_relative_eq!(mixed.levels[0], 0.5, epsilon = 1e-5);
        });
    }

    #[test]
    fn test_output_never_exceeds_source_volume() {
        for layout in [
            SpeakerLayout::Quad,
            SpeakerLayout::FivePointOne,
            SpeakerLayout::SevenPointOne,
        ] {
            let ctx = context();
            ctx.apply_setup(&VirtualAudioSetupConfig {
                speakers: layout.speakers(2.0),
                ..Default::default()
            })
            .unwrap();

            let volume = 0.8;
            let ids: Vec<_> = [(1.0, 0.5), (-3.0, 2.0), (0.0, -4.0)]
                .iter()
                .map(|&(x, z)| {
                    ctx.register_source(
                        AudioSourceSettings::spatial(Vec3::new(x, 0.0, z)).with_volume(volume),
                    )
                })
                .collect();
            ctx.update_weights(Vec3::ZERO);

            for (tick, id) in ids.iter().enumerate() {
                let tick = DspTick(tick as u64 + 1);
                let mut data = sine(2, 1.0);
                ctx.mix_source(*id, &mut data, 2, tick);
                ctx.with_mixed_audio(tick, |mixed| {
                    let peak = dsp::peak_level(mixed.buffer);
                    assert!(peak <= volume + 1e-4, "{:?} peaked at {}", layout, peak);
                });
            }
        }
    }

    #[test]
    fn test_object_channels_assigned_in_registration_order() {
        let ctx = context();
        ctx.set_object_based(true, 2);
        let a = ctx.register_source(AudioSourceSettings::default());
        let b = ctx.register_source(AudioSourceSettings::default());
        let c = ctx.register_source(AudioSourceSettings::default());

        ctx.prepare_tick(DspTick(1));
        assert_eq!(ctx.object_based_channel(a), Some(0));
        assert_eq!(ctx.object_based_channel(b), Some(1));
        assert_eq!(ctx.object_based_channel(c), None);
        assert!(ctx.poll_events().iter().any(|e| matches!(
            e,
            MixerEvent::ObjectChannelsExhausted { source_id, max_channels: 2 } if *source_id == c
        )));

        ctx.unregister_source(a);
        ctx.prepare_tick(DspTick(2));
        assert_eq!(ctx.object_based_channel(c), Some(0));
        assert_eq!(ctx.object_based_channel(b), Some(1));
    }

    #[test]
    fn test_raising_object_limit_reserves_channel_bookkeeping() {
        let ctx = context();
        ctx.register_source(AudioSourceSettings::default());
        ctx.set_object_based(true, 40);
        let capacity = ctx.sources.lock().channel_capacity();
        assert!(capacity >= 40);

        ctx.prepare_tick(DspTick(1));
        assert_eq!(ctx.sources.lock().channel_capacity(), capacity);
    }

    #[test]
    fn test_object_audio_carries_position_and_gain() {
        let ctx = context();
        ctx.set_object_based(true, 3);
        let position = Vec3::new(1.0, 2.0, 3.0);
        let id = ctx.register_source(AudioSourceSettings::spatial(position).with_volume(0.5));

        let mut data = vec![0.25; FRAMES * 2];
        ctx.mix_source(id, &mut data, 2, DspTick(1));
        ctx.with_object_audio(DspTick(1), |objects| {
            assert!(objects.has_sources);
            assert_eq!(objects.channels(), 3);
            assert_eq!(objects.positions[0], position);
            assert_eq!(objects.gains[0], 0.5);
            assert_eq!(objects.positions[1], Vec3::ZERO);
            assert_eq!(objects.gains[2], 0.0);
            assert!(objects.channel(0).iter().all(|s| (s - 0.25).abs() < 1e-6));
            assert!(objects.channel(1).iter().all(|s| *s == 0.0));
        });
    }

    #[test]
    fn test_forced_channel_overrides_panning() {
        let ctx = context();
        stereo_front_back(&ctx);
        let id = ctx.register_source(
            AudioSourceSettings::spatial(Vec3::new(0.0, 0.0, 1.0)).forced_to_channel(1),
        );
        ctx.update_weights(Vec3::ZERO);

        let mut data = vec![0.5; FRAMES];
        ctx.mix_source(id, &mut data, 1, DspTick(1));
        assert_eq!(ctx.source_smoothed_weights(id).unwrap(), vec![0.0, 1.0]);
        ctx.with_mixed_audio(DspTick(1), |mixed| {
            assert!(mixed.channel(0).iter().all(|s| *s == 0.0));
            assert!(mixed.channel(1).iter().all(|s| *s == 0.5));
        });
    }

    #[test]
    fn test_invalid_forced_channel_falls_back_and_reports_once() {
        let ctx = context();
        stereo_front_back(&ctx);
        let id = ctx.register_source(
            AudioSourceSettings::spatial(Vec3::new(0.0, 0.0, 1.0))
                .with_rolloff(RolloffMode::Linear, 0.0, 10.0)
                .forced_to_channel(5),
        );
        ctx.update_weights(Vec3::ZERO);

        for tick in 1..=3 {
            let mut data = vec![0.5; FRAMES];
            ctx.mix_source(id, &mut data, 1, DspTick(tick));
        }

        let smoothed = ctx.source_smoothed_weights(id).unwrap();
        assert_relative_eq!(smoothed[0], 1.0, epsilon = 1e-5);
        let reports = ctx
            .poll_events()
            .into_iter()
            .filter(|e| matches!(e, MixerEvent::InvalidForcedChannel { channel: 5, .. }))
            .count();
        assert_eq!(reports, 1);
    }

    #[test]
    fn test_mute_silences_source_but_keeps_mix() {
        let ctx = context();
        stereo_front_back(&ctx);
        let id = ctx.register_source(AudioSourceSettings::non_spatial());
        ctx.update_weights(Vec3::ZERO);
        ctx.set_mute(true);

        let mut data = vec![0.5; FRAMES];
        ctx.mix_source(id, &mut data, 1, DspTick(1));
        assert!(data.iter().all(|s| *s == 0.0));
        ctx.with_mixed_audio(DspTick(1), |mixed| {
            assert!(dsp::peak_level(mixed.buffer) > 0.0);
        });
    }

    #[test]
    fn test_disabled_virtual_audio_leaves_output_untouched() {
        let ctx = context();
        stereo_front_back(&ctx);
        let id = ctx.register_source(AudioSourceSettings::non_spatial());
        ctx.update_weights(Vec3::ZERO);
        ctx.set_virtual_audio_enabled(false);
        assert!(ctx.listener_positions().is_none());
        assert!(ctx.listener_volumes().is_none());

        let mut data = vec![0.5; FRAMES];
        ctx.mix_source(id, &mut data, 1, DspTick(1));
        assert!(data.iter().all(|s| *s == 0.5));
        ctx.with_mixed_audio(DspTick(1), |mixed| {
            assert_eq!(dsp::peak_level(mixed.buffer), 0.0);
        });
        assert!(
            ctx.poll_events()
                .contains(&MixerEvent::VirtualAudioStateChanged { enabled: false })
        );
    }

    #[test]
    fn test_zero_listeners_gives_empty_output() {
        let ctx = context();
        let id = ctx.register_source(AudioSourceSettings::default());
        ctx.update_weights(Vec3::ZERO);

        let mut data = vec![0.5; FRAMES];
        ctx.mix_source(id, &mut data, 1, DspTick(1));
        ctx.with_mixed_audio(DspTick(1), |mixed| {
            assert_eq!(mixed.channels, 0);
            assert!(mixed.buffer.is_empty());
        });
        assert_eq!(ctx.monitor().channel_count(), 0);
    }

    #[test]
    fn test_tone_only_on_test_channel() {
        let ctx = MixerContext::new(
            MixerDesc::new()
                .sample_rate(1400)
                .dsp_buffer_size(256)
                .max_listeners(4),
        )
        .unwrap();
        ctx.apply_setup(&VirtualAudioSetupConfig {
            speakers: SpeakerLayout::Quad.speakers(1.0),
            ..Default::default()
        })
        .unwrap();
        ctx.set_test_channel(2);
        ctx.set_test_mode(true);

        let mut heard = false;
        for tick in 1..=4 {
            ctx.with_mixed_audio(DspTick(tick), |mixed| {
                assert_eq!(mixed.levels, &[0.0, 0.0, 1.0, 0.0]);
                for channel in [0, 1, 3] {
                    assert!(mixed.channel(channel).iter().all(|s| *s == 0.0));
                }
                heard |= dsp::peak_level(mixed.channel(2)) > 0.0;
            });
        }
        assert!(heard);
        assert_eq!(ctx.monitor().level(2), 1.0);
    }

    #[test]
    fn test_apply_setup_is_atomic() {
        let ctx = context();
        let config = VirtualAudioSetupConfig {
            centered_audio_on_all_speakers: true,
            speakers: SpeakerLayout::Quad.speakers(1.5),
            ..Default::default()
        };
        ctx.apply_setup(&config).unwrap();
        assert_eq!(ctx.listener_count(), 4);

        let snapshot = ctx.setup_config();
        assert_eq!(snapshot.speakers, config.speakers);
        assert!(snapshot.centered_audio_on_all_speakers);

        let mut broken = config.clone();
        broken.speakers.push(SpeakerConfig::new(Vec3::ZERO, 3.0));
        assert!(ctx.apply_setup(&broken).is_err());
        assert_eq!(ctx.listener_count(), 4);
    }

    #[test]
    fn test_listener_limit() {
        let ctx = MixerContext::new(MixerDesc::new().max_listeners(1)).unwrap();
        assert_eq!(ctx.add_listener(Vec3::X, 1.0).unwrap(), 0);
        assert!(ctx.add_listener(Vec3::Z, 1.0).is_err());
        assert!(ctx.remove_listener(0));
        assert!(!ctx.remove_listener(0));
    }

    #[test]
    fn test_contexts_are_independent() {
        let a = context();
        let b = context();
        a.add_listener(Vec3::X, 1.0).unwrap();
        a.set_object_based(true, 4);
        assert_eq!(b.listener_count(), 0);
        assert!(!b.is_object_based());
    }

    #[test]
    fn test_concurrent_update_and_mix() {
        let ctx = Arc::new(context());
        ctx.apply_setup(&VirtualAudioSetupConfig {
            speakers: SpeakerLayout::Quad.speakers(1.0),
            ..Default::default()
        })
        .unwrap();
        let id = ctx.register_source(AudioSourceSettings::spatial(Vec3::new(1.0, 0.0, 1.0)));

        let audio = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                let mut data = vec![0.1; FRAMES * 2];
                for tick in 1..=200 {
                    ctx.mix_source(id, &mut data, 2, DspTick(tick));
                    ctx.with_mixed_audio(DspTick(tick), |mixed| mixed.channels);
                }
            })
        };

        for i in 0..200 {
            let angle = i as f32 * 0.1;
            ctx.update_source_settings(
                id,
                AudioSourceSettings::spatial(Vec3::new(angle.sin(), 0.0, angle.cos())),
            );
            ctx.update_listener_volume(i % 4, if i % 2 == 0 { 1.0 } else { 0.5 });
            ctx.update_weights(Vec3::ZERO);
        }
        audio.join().unwrap();
        assert_eq!(ctx.listener_count(), 4);
    }
}
