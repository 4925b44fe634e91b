mod scene;

use anyhow::{Context, Result, bail};
use clap::Parser;
use scene::OrbitScene;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use virtual_audio::ingest::{ChannelFrameSource, ReceiverPlayback, ReceiverSettings};
use virtual_audio::math::Vec3;
use virtual_audio::{
    AdmOscSender, AudioReceiver, AudioSender, ChannelFrameSink, DspTick, MixerContext, MixerDesc,
    OutputFormat, PullResult, SpeakerLayout, VirtualAudioSetupConfig, dsp, spawn_receive_thread,
};

/// Mixes orbiting tones onto virtual speakers and plays the result back
/// through an in-process receiver.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Setup JSON with speakers, mode flags and OSC settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in layout when no config is given: stereo, quad, 5.1, 7.1, 32
    #[arg(long, default_value = "stereo")]
    layout: String,

    /// Send one channel per source instead of a speaker mix
    #[arg(long)]
    object_based: bool,

    #[arg(long, default_value_t = 8)]
    max_objects: usize,

    /// Number of orbiting sources
    #[arg(long, default_value_t = 3)]
    sources: usize,

    /// Replace the mix with the routing tone on this channel
    #[arg(long)]
    test_tone: Option<usize>,

    #[arg(long)]
    mute: bool,

    /// DSP ticks to run
    #[arg(long, default_value_t = 200)]
    ticks: u64,

    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    #[arg(long, default_value_t = 1024)]
    block_size: usize,

    /// Play the received stream on the default output device
    #[cfg(feature = "device")]
    #[arg(long)]
    device: bool,

    #[arg(long)]
    debug: bool,
}

fn load_setup(args: &Args) -> Result<VirtualAudioSetupConfig> {
    if let Some(path) = &args.config {
        return VirtualAudioSetupConfig::load(path)
            .with_context(|| format!("Failed to load setup from {}", path.display()));
    }

    let speakers = match SpeakerLayout::from_name(&args.layout) {
        Some(layout) => layout.speakers(1.0),
        None if args.layout.eq_ignore_ascii_case("stereo") => vec![
            virtual_audio::config::SpeakerConfig::new(Vec3::new(-1.0, 0.0, 1.0), 1.0),
            virtual_audio::config::SpeakerConfig::new(Vec3::new(1.0, 0.0, 1.0), 1.0),
        ],
        None => bail!("Unknown layout '{}'", args.layout),
    };
    Ok(VirtualAudioSetupConfig {
        speakers,
        ..Default::default()
    })
}

/// Where received audio ends up.
enum Output {
    /// Pulled once per tick and only metered
    Meter {
        playback: ReceiverPlayback,
        buffer: Vec<f32>,
        peak: f32,
        underruns: usize,
    },
    #[cfg(feature = "device")]
    Device(virtual_audio::OutputEngine),
}

impl Output {
    fn format(args: &Args) -> Result<OutputFormat> {
        #[cfg(feature = "device")]
        {
            if args.device {
                return Ok(virtual_audio::OutputEngine::default_device_format()?);
            }
        }
        Ok(OutputFormat {
            sample_rate: args.sample_rate,
            channels: 2,
        })
    }

    fn start(args: &Args, format: OutputFormat, playback: ReceiverPlayback) -> Result<Self> {
        #[cfg(feature = "device")]
        {
            if args.device {
                let mut playback = playback;
                let mut engine = virtual_audio::OutputEngine::new(format, args.block_size)?;
                engine.set_fill_callback(move |buffer, _, channels| {
                    playback.fill(buffer);
                    buffer.len() / channels.max(1) as usize
                });
                engine.start()?;
                return Ok(Self::Device(engine));
            }
        }
        Ok(Self::Meter {
            playback,
            buffer: vec![0.0; args.block_size * format.channels],
            peak: 0.0,
            underruns: 0,
        })
    }

    fn tick(&mut self) {
        if let Self::Meter {
            playback,
            buffer,
            peak,
            underruns,
        } = self
        {
            if playback.fill(buffer) == PullResult::Underrun {
                *underruns += 1;
            }
            *peak = peak.max(dsp::peak_level(buffer));
        }
    }

    fn report(&self) {
        match self {
            Self::Meter { peak, underruns, .. } => {
                log::info!("Received peak {:.3}, {} underruns", peak, underruns);
            }
            #[cfg(feature = "device")]
            Self::Device(engine) => {
                log::info!("Device played {} frames", engine.frames_processed());
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let desc = MixerDesc::new()
        .sample_rate(args.sample_rate)
        .dsp_buffer_size(args.block_size)
        .max_object_based_channels(args.max_objects);
    let tick_duration = Duration::from_secs_f32(desc.dsp_tick_duration());
    let context = Arc::new(MixerContext::new(desc)?);

    let setup = load_setup(&args)?;
    context.apply_setup(&setup)?;
    if args.object_based {
        context.set_object_based(true, args.max_objects);
    }
    context.set_mute(args.mute);
    if let Some(channel) = args.test_tone {
        context.set_test_channel(channel);
        context.set_test_mode(true);
    }

    let (frame_tx, frame_rx) = crossbeam_channel::bounded(8);
    let mut sender = AudioSender::new(Arc::clone(&context), ChannelFrameSink::new(frame_tx));
    if let Some(osc) = setup.osc_setting.as_ref().filter(|osc| osc.enabled) {
        let adm = AdmOscSender::new(osc)?;
        adm.send_init_commands(&setup)?;
        sender = sender.with_adm(adm);
    }

    let format = Output::format(&args)?;
    let defaults = ReceiverSettings::default();
    let receiver_settings = ReceiverSettings {
        max_block_frames: defaults.max_block_frames.max(args.block_size),
        ..defaults
    };
    let receiver = AudioReceiver::new(format, receiver_settings, context.event_sender());
    let playback = receiver.playback();
    let receive = spawn_receive_thread(ChannelFrameSource::new(frame_rx), receiver)?;
    let mut output = Output::start(&args, format, playback)?;

    let mut scene = OrbitScene::new(&context, args.sources, args.sample_rate, args.block_size);
    log::info!(
        "Running {} ticks: {} listeners, {} sources, object-based {}",
        args.ticks,
        context.listener_count(),
        context.source_count(),
        context.is_object_based()
    );

    let start = Instant::now();
    for n in 1..=args.ticks {
        let tick = DspTick(n);
        scene.advance(&context, tick_duration.as_secs_f32());
        context.update_weights(Vec3::ZERO);
        scene.render(&context, tick);
        sender.send_tick(tick)?;
        output.tick();

        for event in context.poll_events() {
            if event.is_error() {
                log::warn!("{:?}", event);
            } else {
                log::debug!("{:?}", event);
            }
        }

        let deadline = tick_duration * n as u32;
        if let Some(wait) = deadline.checked_sub(start.elapsed()) {
            std::thread::sleep(wait);
        }
    }

    let mut levels = Vec::new();
    context.monitor().levels_into(&mut levels);
    log::info!("Last sent levels: {:?}", levels);
    output.report();

    receive.stop();
    Ok(())
}
