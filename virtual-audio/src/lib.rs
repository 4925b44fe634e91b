pub mod adm;
pub mod config;
pub mod context;
pub mod curve;
pub mod dsp;
#[cfg(feature = "device")]
pub mod engine;
pub mod error;
pub mod events;
pub mod ingest;
pub mod listener;
pub mod math;
pub mod metadata;
pub mod mixer;
pub mod panning;
pub mod sender;
pub mod source;
pub mod test_tone;

pub use adm::AdmOscSender;
pub use config::{AudioSourceSettings, MixerDesc, RolloffMode, SpeakerLayout, VirtualAudioSetupConfig};
pub use context::MixerContext;
pub use curve::{Curve, Keyframe};
#[cfg(feature = "device")]
pub use engine::{OutputEngine, OutputFillCallback};
pub use error::{Result, VirtualAudioError};
pub use events::{EventSender, MixerEvent, StreamMonitor};
pub use ingest::{
    AudioFrame, AudioReceiver, FrameIngestRingBuffer, FrameSource, OutputFormat, PullResult,
    ResamplerConverter, spawn_receive_thread,
};
pub use math::{Pose, SphericalCoordinate};
pub use metadata::SpeakerMetadata;
pub use mixer::{DspTick, MixedAudio, ObjectAudio};
pub use sender::{AudioSender, ChannelFrameSink, FrameSink, OutgoingAudioFrame};
pub use source::SourceId;
