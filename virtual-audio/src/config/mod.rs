pub mod layouts;
pub mod mixer_desc;
pub mod setup;
pub mod source_settings;

pub use layouts::{SpeakerLayout, circle_group};
pub use mixer_desc::MixerDesc;
pub use setup::{
    ConfigVec3, OscCommand, OscCommandFloats, OscCommandInts, OscSetting, SpeakerConfig,
    VirtualAudioSetupConfig,
};
pub use source_settings::{AudioSourceSettings, RolloffMode};
